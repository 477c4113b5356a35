//! `RODS_CS_NEG` client-server negotiation: message and policy table.

use crate::irods::account::CsNegPolicy;
use crate::irods::message::{Message, MessageType};
use crate::irods::messages::{RequestMessage, ResponseMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

/// Negotiation status for a successful outcome.
pub const CS_NEG_STATUS_SUCCESS: i32 = 1;
/// Negotiation status for a failed outcome.
pub const CS_NEG_STATUS_FAILURE: i32 = 0;

/// Outcome of the negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsNegResult {
    /// Continue on plain TCP.
    UseTcp,
    /// Upgrade to TLS before authentication.
    UseSsl,
    /// The policies are incompatible; abort the connection.
    Failure,
}

impl CsNegResult {
    /// Returns the wire token for this result.
    pub fn as_token(&self) -> &'static str {
        match self {
            CsNegResult::UseTcp => "CS_NEG_USE_TCP",
            CsNegResult::UseSsl => "CS_NEG_USE_SSL",
            CsNegResult::Failure => "CS_NEG_FAILURE",
        }
    }
}

/// Computes the negotiated result and status for a (client, server) policy
/// pair.
///
/// | client \ server | require-TCP | require-SSL | don't-care |
/// |---|---|---|---|
/// | require-TCP | UseTCP | Failure | UseTCP |
/// | require-SSL | Failure | UseSSL | UseSSL |
/// | don't-care  | UseTCP | UseSSL | UseTCP |
pub fn perform_cs_negotiation(client: CsNegPolicy, server: CsNegPolicy) -> (CsNegResult, i32) {
    use CsNegPolicy::{RequireSsl, RequireTcp};
    let result = match (client, server) {
        (RequireTcp, RequireSsl) | (RequireSsl, RequireTcp) => CsNegResult::Failure,
        (RequireSsl, _) | (_, RequireSsl) => CsNegResult::UseSsl,
        _ => CsNegResult::UseTcp,
    };
    let status = if result == CsNegResult::Failure {
        CS_NEG_STATUS_FAILURE
    } else {
        CS_NEG_STATUS_SUCCESS
    };
    (result, status)
}

/// The negotiation message. The server's copy carries its policy in
/// `result`; the client answers with the computed outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsNegotiation {
    /// Negotiation status (1 success, 0 failure).
    pub status: i32,
    /// Policy or outcome token.
    pub result: String,
}

impl CsNegotiation {
    /// Builds the client's reply carrying the computed outcome.
    pub fn reply(status: i32, result: CsNegResult) -> Self {
        Self {
            status,
            result: result.as_token().to_string(),
        }
    }

    /// Parses the server's policy out of its negotiation message.
    pub fn server_policy(&self) -> RodsResult<CsNegPolicy> {
        CsNegPolicy::from_token(&self.result).ok_or_else(|| {
            RodsError::NegotiationFailed(format!("unknown server policy '{}'", self.result))
        })
    }
}

impl RequestMessage for CsNegotiation {
    fn message_type(&self) -> MessageType {
        MessageType::CsNeg
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("CS_NEG_PI", era);
        w.tag_i32("status", self.status);
        w.tag("result", &self.result);
        Ok(w.finish())
    }
}

impl ResponseMessage for CsNegotiation {
    fn expected_type() -> MessageType {
        MessageType::CsNeg
    }

    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "CS_NEG_PI" {
            return Err(RodsError::Malformed(format!(
                "expected CS_NEG_PI, found '{}'",
                node.name
            )));
        }
        Ok(Self {
            status: node.i32_of("status")?,
            result: node.text_of("result")?.to_string(),
        })
    }
}
