//! # Rods Platform
//!
//! Core platform types for the rods iRODS client ecosystem.
//!
//! This crate provides:
//! - Unified error types (`RodsError`, `RodsResult`)
//! - The iRODS server error-code mapping shared by every protocol crate
//!
//! # Examples
//!
//! ```
//! use rods_platform::{RodsError, RodsResult};
//!
//! fn example_function() -> RodsResult<String> {
//!     Ok("Hello, rods!".to_string())
//! }
//!
//! # fn main() -> RodsResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, rods!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{RodsError, RodsResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
