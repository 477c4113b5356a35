//! `RODS_CONNECT` startup pack, the first message of every session.

use crate::irods::account::Account;
use crate::irods::message::MessageType;
use crate::irods::messages::RequestMessage;
use crate::irods::xml::{PackedStructWriter, XmlEra};
use rods_platform::RodsResult;

/// Release string this client reports in the startup pack.
pub const CLIENT_RELEASE_VERSION: &str = "rods4.3.2";

/// API version token; fixed by the protocol.
pub const CLIENT_API_VERSION: &str = "d";

/// Option suffix requesting client-server negotiation.
const NEGOTIATION_OPTION: &str = "request_server_negotiation";

/// Startup pack announcing users, zone, and client software.
#[derive(Debug, Clone)]
pub struct StartupPack {
    proxy_user: String,
    proxy_zone: String,
    client_user: String,
    client_zone: String,
    application_name: String,
    negotiate: bool,
}

impl StartupPack {
    /// Builds a startup pack for the given account.
    ///
    /// When `negotiate` is set, the option field carries the negotiation
    /// request and the server answers with `RODS_CS_NEG` instead of going
    /// straight to `RODS_VERSION`.
    pub fn new(account: &Account, application_name: &str, negotiate: bool) -> Self {
        Self {
            proxy_user: account.proxy_user.clone(),
            proxy_zone: account.zone.clone(),
            client_user: account.client_user.clone(),
            client_zone: account.zone.clone(),
            application_name: application_name.to_string(),
            negotiate,
        }
    }
}

impl RequestMessage for StartupPack {
    fn message_type(&self) -> MessageType {
        MessageType::Connect
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let option = if self.negotiate {
            format!("{};{}", self.application_name, NEGOTIATION_OPTION)
        } else {
            self.application_name.clone()
        };

        let mut w = PackedStructWriter::new("StartupPack_PI", era);
        w.tag_i32("irodsProt", 1); // 1 selects the XML protocol
        w.tag_i32("reconnFlag", 0);
        w.tag_i32("connectCnt", 0);
        w.tag("proxyUser", &self.proxy_user);
        w.tag("proxyRcatZone", &self.proxy_zone);
        w.tag("clientUser", &self.client_user);
        w.tag("clientRcatZone", &self.client_zone);
        w.tag("relVersion", CLIENT_RELEASE_VERSION);
        w.tag("apiVersion", CLIENT_API_VERSION);
        w.tag("option", &option);
        Ok(w.finish())
    }
}
