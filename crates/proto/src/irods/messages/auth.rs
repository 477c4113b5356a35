//! Authentication messages: native challenge/response and the PAM exchange.

use crate::irods::common::{AUTH_REQUEST_AN, AUTH_RESPONSE_AN, CHALLENGE_LEN, PAM_AUTH_REQUEST_AN};
use crate::irods::message::Message;
use crate::irods::messages::{RequestMessage, ResponseMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra, XmlNode};
use base64::Engine;
use rods_platform::{RodsError, RodsResult};
use zeroize::Zeroizing;

/// Requests a native-auth challenge. Empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRequest;

impl RequestMessage for AuthRequest {
    fn int_info(&self) -> i32 {
        AUTH_REQUEST_AN
    }

    fn to_body_bytes(&self, _era: XmlEra) -> RodsResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// The server's 64-byte random challenge, base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Decoded challenge bytes.
    pub challenge: Vec<u8>,
}

impl ResponseMessage for AuthChallenge {
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "authRequestOut_PI" {
            return Err(RodsError::Malformed(format!(
                "expected authRequestOut_PI, found '{}'",
                node.name
            )));
        }
        let encoded = node.text_of("challenge")?;
        let challenge = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RodsError::Malformed(format!("challenge is not base64: {}", e)))?;
        if challenge.len() < CHALLENGE_LEN {
            return Err(RodsError::Malformed(format!(
                "challenge too short: {} bytes",
                challenge.len()
            )));
        }
        Ok(Self { challenge })
    }
}

/// The client's digest reply to a native-auth challenge.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    response: String,
    username: String,
}

impl AuthResponse {
    /// Wraps a precomputed base64 digest (see [`crate::irods::auth`]) and the
    /// proxy user it authenticates.
    pub fn new(response: &str, username: &str) -> Self {
        Self {
            response: response.to_string(),
            username: username.to_string(),
        }
    }
}

impl RequestMessage for AuthResponse {
    fn int_info(&self) -> i32 {
        AUTH_RESPONSE_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("authResponseInp_PI", era);
        w.tag("response", &self.response);
        w.tag("username", &self.username);
        Ok(w.finish())
    }
}

/// PAM exchange request; only valid on a TLS transport.
pub struct PamAuthRequest {
    user: String,
    password: Zeroizing<String>,
    ttl_hours: i32,
}

impl PamAuthRequest {
    /// Builds the PAM request for a user/password pair and a generated-
    /// password TTL in hours.
    pub fn new(user: &str, password: &str, ttl_hours: i32) -> Self {
        Self {
            user: user.to_string(),
            password: Zeroizing::new(password.to_string()),
            ttl_hours,
        }
    }
}

impl std::fmt::Debug for PamAuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamAuthRequest")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

impl RequestMessage for PamAuthRequest {
    fn int_info(&self) -> i32 {
        PAM_AUTH_REQUEST_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("pamAuthRequestInp_PI", era);
        w.tag("pamUser", &self.user);
        w.tag("pamPassword", self.password.as_str());
        w.tag_i32("timeToLive", self.ttl_hours);
        Ok(w.finish())
    }
}

/// PAM reply carrying the server-generated native password.
pub struct PamAuthResponse {
    /// Generated native-style password, valid for the requested TTL.
    pub generated_password: Zeroizing<String>,
}

impl std::fmt::Debug for PamAuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamAuthResponse")
            .field("generated_password", &"<redacted>")
            .finish()
    }
}

impl ResponseMessage for PamAuthResponse {
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "pamAuthRequestOut_PI" {
            return Err(RodsError::Malformed(format!(
                "expected pamAuthRequestOut_PI, found '{}'",
                node.name
            )));
        }
        Ok(Self {
            generated_password: Zeroizing::new(node.text_of("irodsPamPassword")?.to_string()),
        })
    }
}
