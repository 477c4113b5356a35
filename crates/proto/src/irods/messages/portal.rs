//! Portal reply for parallel transfers: `PortalOprOut_PI`.

use crate::irods::message::Message;
use crate::irods::messages::ResponseMessage;
use crate::irods::xml::{XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

/// One data-connection endpoint advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalEndpoint {
    /// Host to dial for the data connection.
    pub host: String,
    /// Port to dial.
    pub port: u16,
    /// Cookie sent as the first four bytes of the data connection.
    pub cookie: i32,
}

/// Reply to a put/get issued with two or more requested streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalReply {
    /// Descriptor of the portal operation on the control connection.
    pub descriptor: i32,
    /// Stream count granted by the server.
    pub num_threads: i32,
    /// Advertised endpoints. A server may advertise a single endpoint for
    /// all streams; callers reuse it per chunk in that case.
    pub endpoints: Vec<PortalEndpoint>,
}

impl ResponseMessage for PortalReply {
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "PortalOprOut_PI" {
            return Err(RodsError::Malformed(format!(
                "expected PortalOprOut_PI, found '{}'",
                node.name
            )));
        }
        let status = node.i32_of("status")?;
        if status < 0 {
            return Err(RodsError::from_code(status));
        }

        let mut endpoints = Vec::new();
        for port_list in node.children_named("PortList_PI") {
            let port = port_list.i32_of("portNum")?;
            if !(1..=i32::from(u16::MAX)).contains(&port) {
                return Err(RodsError::Malformed(format!(
                    "portal advertised invalid port {}",
                    port
                )));
            }
            endpoints.push(PortalEndpoint {
                host: port_list.text_of("hostAddr")?.to_string(),
                port: port as u16,
                cookie: port_list.i32_of("cookie")?,
            });
        }
        if endpoints.is_empty() {
            return Err(RodsError::Malformed(
                "portal reply carries no endpoints".to_string(),
            ));
        }

        Ok(Self {
            descriptor: node.i32_of("l1descInx")?,
            num_threads: node.i32_of("numThreads")?,
            endpoints,
        })
    }
}
