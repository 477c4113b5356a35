//! Per-message-type builders.
//!
//! Each request type knows its frame type tag, its API number (`intInfo`),
//! and how to serialize its packed-struct body for a given XML era. Each
//! response type knows the frame type it expects and how to decode itself
//! from a received [`Message`].

use crate::irods::message::{Message, MessageType};
use crate::irods::xml::{PackedStructWriter, XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

pub mod auth;
pub mod collection;
pub mod cs_neg;
pub mod data_object;
pub mod metadata;
pub mod portal;
pub mod query;
pub mod ssl;
pub mod startup;
pub mod struct_file;
pub mod version;

/// A message the client can send.
pub trait RequestMessage {
    /// Frame type tag; API requests are the default.
    fn message_type(&self) -> MessageType {
        MessageType::ApiReq
    }

    /// Value for the header's `intInfo` field (the API number on requests).
    fn int_info(&self) -> i32 {
        0
    }

    /// Serializes the message-body segment.
    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>>;
}

/// A message the client can receive.
pub trait ResponseMessage: Sized {
    /// Frame type tag this response arrives under.
    fn expected_type() -> MessageType {
        MessageType::ApiReply
    }

    /// Decodes the response from a received frame.
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self>;
}

/// Reply with no meaningful body; the status rode in `intInfo` and was
/// already checked by the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyResponse {
    /// The (non-negative) `intInfo` the server returned.
    pub result: i32,
}

impl ResponseMessage for EmptyResponse {
    fn from_message(message: &Message, _era: XmlEra) -> RodsResult<Self> {
        Ok(Self {
            result: message.body.int_info,
        })
    }
}

/// `KeyValPair_PI`: keyword/value conditions attached to many requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValPair {
    pairs: Vec<(String, String)>,
}

impl KeyValPair {
    /// Creates an empty pair set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyword/value pair.
    pub fn set(&mut self, keyword: &str, value: &str) {
        self.pairs.push((keyword.to_string(), value.to_string()));
    }

    /// Returns the value for a keyword, if present.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Serializes into an open packed-struct writer.
    pub fn write_into(&self, w: &mut PackedStructWriter) {
        w.open("KeyValPair_PI");
        w.tag("ssLen", &self.pairs.len().to_string());
        for (keyword, _) in &self.pairs {
            w.tag("keyWord", keyword);
        }
        for (_, value) in &self.pairs {
            w.tag("svalue", value);
        }
        w.close("KeyValPair_PI");
    }

    /// Decodes from a parsed `KeyValPair_PI` element.
    pub fn from_node(node: &XmlNode) -> RodsResult<Self> {
        let len: usize = node.u32_of("ssLen")? as usize;
        let keywords: Vec<_> = node.children_named("keyWord").collect();
        let values: Vec<_> = node.children_named("svalue").collect();
        if keywords.len() != len || values.len() != len {
            return Err(RodsError::Malformed(format!(
                "KeyValPair_PI declares {} pairs but carries {} keywords / {} values",
                len,
                keywords.len(),
                values.len()
            )));
        }
        let pairs = keywords
            .into_iter()
            .zip(values)
            .map(|(k, v)| (k.text.clone(), v.text.clone()))
            .collect();
        Ok(Self { pairs })
    }
}
