//! `RODS_SSL_SETTINGS` and `RODS_SSL_SHARED_SECRET`, sent right after the
//! TLS upgrade.

use crate::irods::account::SslConfig;
use crate::irods::message::MessageType;
use crate::irods::messages::RequestMessage;
use crate::irods::xml::{PackedStructWriter, XmlEra};
use rods_platform::RodsResult;
use zeroize::Zeroizing;

/// Announces the content-encryption parameters the client generated its
/// shared secret for.
#[derive(Debug, Clone)]
pub struct SslSettings {
    algorithm: String,
    key_size: usize,
    salt_size: usize,
    hash_rounds: usize,
}

impl SslSettings {
    /// Builds the announcement from the account's SSL configuration.
    pub fn new(config: &SslConfig) -> Self {
        Self {
            algorithm: config.algorithm.clone(),
            key_size: config.key_size,
            salt_size: config.salt_size,
            hash_rounds: config.hash_rounds,
        }
    }
}

impl RequestMessage for SslSettings {
    fn message_type(&self) -> MessageType {
        MessageType::SslSettings
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("SSLSettings_PI", era);
        w.tag("algorithm", &self.algorithm);
        w.tag("keySize", &self.key_size.to_string());
        w.tag("saltSize", &self.salt_size.to_string());
        w.tag("hashRounds", &self.hash_rounds.to_string());
        Ok(w.finish())
    }
}

/// Carries the raw shared-secret bytes. Zeroized on drop.
pub struct SslSharedSecret {
    secret: Zeroizing<Vec<u8>>,
}

impl SslSharedSecret {
    /// Wraps a freshly generated secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }
}

impl std::fmt::Debug for SslSharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslSharedSecret")
            .field("len", &self.secret.len())
            .finish()
    }
}

impl RequestMessage for SslSharedSecret {
    fn message_type(&self) -> MessageType {
        MessageType::SslSharedSecret
    }

    fn to_body_bytes(&self, _era: XmlEra) -> RodsResult<Vec<u8>> {
        // Raw bytes, not a packed struct.
        Ok(self.secret.to_vec())
    }
}
