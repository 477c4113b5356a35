//! Native-auth digest computation.
//!
//! The protocol mandates MD5 here; the digest is what rides over the wire,
//! and TLS (when negotiated) protects the exchange from the network.

use crate::irods::common::{CHALLENGE_LEN, MAX_PASSWORD_LENGTH};
use base64::Engine;
use md5::{Digest, Md5};
use rods_platform::{RodsError, RodsResult};
use zeroize::Zeroize;

/// Computes the base64 response to a native-auth challenge.
///
/// The digest input is the first 64 challenge bytes followed by the password
/// padded to 50 bytes with NUL. Zero bytes in the raw digest are replaced
/// with `0x01` before encoding, as the server expects a NUL-free buffer.
///
/// # Errors
///
/// Returns [`RodsError::AuthFailed`] when the challenge is shorter than 64
/// bytes or the password exceeds the 50-byte pad.
pub fn generate_auth_response(challenge: &[u8], password: &str) -> RodsResult<String> {
    if challenge.len() < CHALLENGE_LEN {
        return Err(RodsError::AuthFailed(format!(
            "challenge too short: {} bytes",
            challenge.len()
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(RodsError::AuthFailed(format!(
            "password longer than {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }

    let mut padded = [0u8; MAX_PASSWORD_LENGTH];
    padded[..password.len()].copy_from_slice(password.as_bytes());

    let mut hasher = Md5::new();
    hasher.update(&challenge[..CHALLENGE_LEN]);
    hasher.update(padded);
    let mut digest = hasher.finalize();

    padded.zeroize();

    for byte in digest.iter_mut() {
        if *byte == 0 {
            *byte = 1;
        }
    }

    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}
