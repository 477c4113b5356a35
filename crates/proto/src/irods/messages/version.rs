//! `RODS_VERSION` message and the parsed server version.

use crate::irods::message::{Message, MessageType};
use crate::irods::messages::ResponseMessage;
use crate::irods::xml::{XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

/// Server version as reported at the end of the handshake. Read-only once
/// received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Release string, e.g. `rods4.3.0`.
    pub release_version: String,
    /// API version token, e.g. `d`.
    pub api_version: String,
    /// Reconnection port advertised by the server (0 when unused).
    pub reconnect_port: i32,
    /// Reconnection address advertised by the server.
    pub reconnect_addr: String,
    /// Reconnection cookie.
    pub cookie: i32,
}

impl Version {
    /// Parses `rodsX.Y.Z` into `(X, Y, Z)`.
    ///
    /// Returns `None` when the release string does not follow the scheme;
    /// callers treat such servers as the oldest supported era.
    pub fn release_triplet(&self) -> Option<(u32, u32, u32)> {
        let digits = self.release_version.strip_prefix("rods")?;
        let mut parts = digits.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some((major, minor, patch))
    }

    /// Returns the XML escape era this server speaks.
    pub fn xml_era(&self) -> XmlEra {
        match self.release_triplet() {
            Some((major, minor, _)) if (major, minor) >= (4, 3) => XmlEra::Standard,
            _ => XmlEra::Legacy,
        }
    }

    /// Returns whether the server coordinates portal (parallel) transfers.
    pub fn supports_parallel_transfer(&self) -> bool {
        matches!(self.release_triplet(), Some((major, _, _)) if major >= 4)
    }
}

impl ResponseMessage for Version {
    fn expected_type() -> MessageType {
        MessageType::Version
    }

    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "Version_PI" {
            return Err(RodsError::Malformed(format!(
                "expected Version_PI, found '{}'",
                node.name
            )));
        }
        let status = node.i32_of("status")?;
        if status < 0 {
            return Err(RodsError::from_code(status));
        }
        Ok(Self {
            release_version: node.text_of("relVersion")?.to_string(),
            api_version: node.text_of("apiVersion")?.to_string(),
            reconnect_port: node.i32_of("reconnPort").unwrap_or(0),
            reconnect_addr: node
                .opt_text_of("reconnAddr")
                .unwrap_or_default()
                .to_string(),
            cookie: node.i32_of("cookie").unwrap_or(0),
        })
    }
}
