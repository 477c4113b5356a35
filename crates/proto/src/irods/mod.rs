//! iRODS client protocol implementation.
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Codec** ([`xml`], [`message`], [`messages`]) - framed messages with
//!    XML packed-struct bodies and per-type builders
//! 2. **Transport** ([`transport`]) - plain-TCP or TLS socket with
//!    per-operation deadlines
//! 3. **Connection** ([`connection`]) - handshake, client-server
//!    negotiation, TLS upgrade, authentication, request/response pairing
//! 4. **Session** ([`session`]) - bounded pool with health checks and fair
//!    acquire/return
//! 5. **Transfer** ([`transfer`]) - chunked multi-connection upload and
//!    download
//! 6. **Operations** ([`ops`]) - data objects, collections, queries,
//!    metadata, users, struct files
//!
//! # Protocol notes
//!
//! - Every frame is a big-endian length-prefixed header followed by message,
//!   error, and bytestream segments ([`message`]).
//! - Two XML escape eras exist; the era is chosen from the server version
//!   received during the handshake ([`xml`], [`messages::version`]).
//! - The protocol has no multiplexing: a connection serializes exchanges
//!   behind its mutex, and compound operations take the lock explicitly.
//!
//! # Example
//!
//! ```rust,no_run
//! use rods_proto::irods::account::Account;
//! use rods_proto::irods::session::{Session, SessionConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let account = Account::new("data.example.org", 1247, "tempZone", "rods", "secret");
//! let session = Session::new(account, SessionConfig::default());
//! session.connect().await?;
//!
//! let conn = session.acquire().await?;
//! let handle = rods_proto::irods::ops::data_object::create(&conn, "/tempZone/home/rods/T", None, true).await?;
//! handle.write(b"Hello World").await?;
//! handle.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod auth;
pub mod cancel;
pub mod common;
pub mod connection;
pub mod message;
pub mod messages;
pub mod ops;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod xml;

// Re-export main types
pub use account::{Account, AuthScheme, CaSource, CsNegPolicy, SslConfig};
pub use cancel::CancelToken;
pub use connection::{Connection, ConnectionConfig, ConnectionGuard, ConnectionState};
pub use message::{Header, Message, MessageType};
pub use messages::cs_neg::{perform_cs_negotiation, CsNegResult};
pub use messages::version::Version;
pub use session::{Pool, PoolStats, PooledConnection, Session, SessionConfig};
pub use transfer::{TransferOptions, TransferPlan};
pub use transport::Transport;
pub use xml::XmlEra;
