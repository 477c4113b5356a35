//! Framed message codec.
//!
//! # Frame format
//!
//! ```text
//! uint32      header length L (big-endian)
//! byte[L]     header packed struct (MsgHeader_PI)
//! byte[m]     message body        (m = msgLen)
//! byte[e]     error body          (e = errorLen, may be 0)
//! byte[b]     binary bytestream   (b = bsLen, may be 0)
//! ```
//!
//! The header is an XML packed struct with a closed field set:
//! `<MsgHeader_PI><type>..</type><msgLen>..</msgLen><errorLen>..</errorLen>
//! <bsLen>..</bsLen><intInfo>..</intInfo></MsgHeader_PI>`. Unknown header
//! elements are rejected; the session would be unsynchronized otherwise.
//!
//! # Example
//!
//! ```rust
//! use rods_proto::irods::message::{Message, MessageType};
//!
//! let message = Message::new(MessageType::ApiReq, b"<x>1</x>".to_vec(), 702);
//! let wire = message.to_bytes();
//! let (parsed, consumed) = Message::from_bytes(&wire).unwrap();
//! assert_eq!(consumed, wire.len());
//! assert_eq!(parsed.body.int_info, 702);
//! ```

use crate::irods::xml::{XmlEra, XmlNode};
use bytes::{Buf, BufMut, BytesMut};
use rods_platform::{RodsError, RodsResult};

/// Upper bound on the header packed struct, to reject garbage framing early.
pub const MAX_HEADER_SIZE: usize = 1024;

/// Upper bound on a single frame body (message + error + bytestream).
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Message type tag carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Startup pack, first message of a session.
    Connect,
    /// Server version reply.
    Version,
    /// Client-server negotiation, both directions.
    CsNeg,
    /// API request.
    ApiReq,
    /// API reply.
    ApiReply,
    /// Best-effort goodbye.
    Disconnect,
    /// TLS parameter announcement after the upgrade.
    SslSettings,
    /// TLS shared secret, sent as a raw bytestream.
    SslSharedSecret,
}

impl MessageType {
    /// Returns the ASCII token used on the wire.
    pub fn as_token(&self) -> &'static str {
        match self {
            MessageType::Connect => "RODS_CONNECT",
            MessageType::Version => "RODS_VERSION",
            MessageType::CsNeg => "RODS_CS_NEG",
            MessageType::ApiReq => "RODS_API_REQ",
            MessageType::ApiReply => "RODS_API_REPLY",
            MessageType::Disconnect => "RODS_DISCONNECT",
            MessageType::SslSettings => "RODS_SSL_SETTINGS",
            MessageType::SslSharedSecret => "RODS_SSL_SHARED_SECRET",
        }
    }

    /// Parses a wire token.
    ///
    /// # Errors
    ///
    /// Returns [`RodsError::Malformed`] for an unknown token.
    pub fn from_token(token: &str) -> RodsResult<Self> {
        match token {
            "RODS_CONNECT" => Ok(MessageType::Connect),
            "RODS_VERSION" => Ok(MessageType::Version),
            "RODS_CS_NEG" => Ok(MessageType::CsNeg),
            "RODS_API_REQ" => Ok(MessageType::ApiReq),
            "RODS_API_REPLY" => Ok(MessageType::ApiReply),
            "RODS_DISCONNECT" => Ok(MessageType::Disconnect),
            "RODS_SSL_SETTINGS" => Ok(MessageType::SslSettings),
            "RODS_SSL_SHARED_SECRET" => Ok(MessageType::SslSharedSecret),
            _ => Err(RodsError::Malformed(format!(
                "unknown message type '{}'",
                token
            ))),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Message type tag.
    pub msg_type: MessageType,
    /// Length of the message body segment.
    pub msg_len: u32,
    /// Length of the error body segment.
    pub error_len: u32,
    /// Length of the binary bytestream segment.
    pub bs_len: u32,
    /// API number on requests, status/result code on replies.
    pub int_info: i32,
}

impl Header {
    /// Serializes the header packed struct (without the length prefix).
    ///
    /// Header fields are plain ASCII, so the escape era is irrelevant here;
    /// the standard escaper is used unconditionally.
    pub fn to_body_bytes(&self) -> Vec<u8> {
        let mut w = crate::irods::xml::PackedStructWriter::new("MsgHeader_PI", XmlEra::Standard);
        w.tag("type", self.msg_type.as_token());
        w.tag("msgLen", &self.msg_len.to_string());
        w.tag("errorLen", &self.error_len.to_string());
        w.tag("bsLen", &self.bs_len.to_string());
        w.tag("intInfo", &self.int_info.to_string());
        w.finish()
    }

    /// Parses the header packed struct.
    ///
    /// # Errors
    ///
    /// Returns [`RodsError::Malformed`] on an unknown element, an unknown
    /// type token, or a missing field. The header's field set is closed.
    pub fn from_body_bytes(bytes: &[u8]) -> RodsResult<Self> {
        let node = XmlNode::parse(bytes, XmlEra::Standard)?;
        if node.name != "MsgHeader_PI" {
            return Err(RodsError::Malformed(format!(
                "expected MsgHeader_PI, found '{}'",
                node.name
            )));
        }
        node.deny_unknown(&["type", "msgLen", "errorLen", "bsLen", "intInfo"])?;
        Ok(Self {
            msg_type: MessageType::from_token(node.text_of("type")?)?,
            msg_len: node.u32_of("msgLen")?,
            error_len: node.u32_of("errorLen")?,
            bs_len: node.u32_of("bsLen")?,
            int_info: node.i32_of("intInfo")?,
        })
    }
}

/// Frame body: the three variable-length segments plus the header echo
/// (type tag and intInfo) that response decoding keys off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Message segment, usually an XML packed struct.
    pub message: Vec<u8>,
    /// Error segment, may be empty.
    pub error: Vec<u8>,
    /// Binary bytestream segment, may be empty.
    pub bs: Vec<u8>,
    /// Type tag copied from the header.
    pub msg_type: MessageType,
    /// `intInfo` copied from the header.
    pub int_info: i32,
}

/// A full framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame header.
    pub header: Header,
    /// Frame body segments.
    pub body: Body,
}

impl Message {
    /// Builds a message with only a message segment.
    pub fn new(msg_type: MessageType, message: Vec<u8>, int_info: i32) -> Self {
        Self::with_segments(msg_type, message, Vec::new(), Vec::new(), int_info)
    }

    /// Builds a message with message, error, and bytestream segments.
    pub fn with_segments(
        msg_type: MessageType,
        message: Vec<u8>,
        error: Vec<u8>,
        bs: Vec<u8>,
        int_info: i32,
    ) -> Self {
        let header = Header {
            msg_type,
            msg_len: message.len() as u32,
            error_len: error.len() as u32,
            bs_len: bs.len() as u32,
            int_info,
        };
        Self {
            header,
            body: Body {
                message,
                error,
                bs,
                msg_type,
                int_info,
            },
        }
    }

    /// Serializes the frame: length prefix, header, then body segments.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header_bytes = self.header.to_body_bytes();
        let mut buf = BytesMut::with_capacity(
            4 + header_bytes.len()
                + self.body.message.len()
                + self.body.error.len()
                + self.body.bs.len(),
        );
        buf.put_u32(header_bytes.len() as u32);
        buf.put_slice(&header_bytes);
        buf.put_slice(&self.body.message);
        buf.put_slice(&self.body.error);
        buf.put_slice(&self.body.bs);
        buf.to_vec()
    }

    /// Returns the total length of the first frame in `buf`, if `buf`
    /// contains enough bytes to determine it and to hold the whole frame.
    pub fn frame_len(buf: &[u8]) -> RodsResult<Option<usize>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let header_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if header_len == 0 || header_len > MAX_HEADER_SIZE {
            return Err(RodsError::Malformed(format!(
                "invalid header length {}",
                header_len
            )));
        }
        if buf.len() < 4 + header_len {
            return Ok(None);
        }
        let header = Header::from_body_bytes(&buf[4..4 + header_len])?;
        let body_len = header.msg_len as usize + header.error_len as usize + header.bs_len as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(RodsError::Malformed(format!(
                "frame body too large: {} bytes",
                body_len
            )));
        }
        let total = 4 + header_len + body_len;
        if buf.len() < total {
            return Ok(None);
        }
        Ok(Some(total))
    }

    /// Parses one frame from the start of `buf`.
    ///
    /// Returns the message and the number of bytes consumed; bytes past the
    /// first frame are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RodsError::Malformed`] on a corrupt header or a truncated
    /// frame.
    pub fn from_bytes(buf: &[u8]) -> RodsResult<(Self, usize)> {
        let total = Self::frame_len(buf)?.ok_or_else(|| {
            RodsError::Malformed(format!("truncated frame: {} bytes buffered", buf.len()))
        })?;

        let mut cursor = &buf[..total];
        let header_len = cursor.get_u32() as usize;
        let header = Header::from_body_bytes(&cursor[..header_len])?;
        cursor.advance(header_len);

        let message = cursor[..header.msg_len as usize].to_vec();
        cursor.advance(header.msg_len as usize);
        let error = cursor[..header.error_len as usize].to_vec();
        cursor.advance(header.error_len as usize);
        let bs = cursor[..header.bs_len as usize].to_vec();

        let body = Body {
            message,
            error,
            bs,
            msg_type: header.msg_type,
            int_info: header.int_info,
        };
        Ok((Self { header, body }, total))
    }

    /// Errors unless the message carries the expected type tag.
    pub fn expect_type(&self, expected: MessageType) -> RodsResult<()> {
        if self.header.msg_type == expected {
            Ok(())
        } else {
            Err(RodsError::Malformed(format!(
                "expected {} message, received {}",
                expected, self.header.msg_type
            )))
        }
    }

    /// Maps a negative `intInfo` to the corresponding server error.
    pub fn check_int_info(&self) -> RodsResult<()> {
        if self.body.int_info < 0 {
            Err(RodsError::from_code(self.body.int_info))
        } else {
            Ok(())
        }
    }
}
