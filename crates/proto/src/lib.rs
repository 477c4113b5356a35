//! Protocol implementation for the rods iRODS client ecosystem.
//!
//! This crate provides a native Rust client for the iRODS data-management
//! protocol:
//!
//! - **Wire codec** - header-length-prefixed frames with XML packed-struct bodies
//! - **Transport** - plain TCP or TLS with per-operation deadlines
//! - **Handshake** - startup pack, client-server negotiation, TLS upgrade
//! - **Authentication** - native challenge/response and PAM-over-TLS
//! - **Connection pool** - bounded, health-checked, fair acquire/return
//! - **Parallel transfer** - chunked multi-connection upload/download
//!
//! # Features
//!
//! - `irods` (default) - iRODS protocol support
//!
//! # Example
//!
//! ```rust
//! use rods_proto::irods::message::{Message, MessageType};
//!
//! // Encode a framed message and parse it back from wire format
//! let message = Message::new(MessageType::ApiReq, b"<dummy/>".to_vec(), 700);
//! let wire_format = message.to_bytes();
//!
//! let (parsed, consumed) = Message::from_bytes(&wire_format).unwrap();
//! assert_eq!(consumed, wire_format.len());
//! assert_eq!(parsed.body.message, b"<dummy/>");
//! ```
//!
//! # Security
//!
//! - TLS via `rustls` with server-name verification
//! - Passwords and shared secrets zeroized on drop with `zeroize`
//! - The native-auth MD5 digest is mandated by the iRODS protocol; TLS
//!   protects the exchange from the network

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "irods")]
pub mod irods;
