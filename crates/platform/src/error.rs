//! Error types for the rods client.
//!
//! Every fallible operation in the client returns [`RodsResult`]. The error
//! kinds distinguish transport faults (which invalidate a connection) from
//! server-side iRODS errors (which do not), so callers and the pool can make
//! the right retry decision.

use std::fmt;

/// Catalog error code returned when a general query matches no rows.
pub const CAT_NO_ROWS_FOUND: i32 = -808000;

/// Catalog error code for an invalid authentication response.
pub const CAT_INVALID_AUTHENTICATION: i32 = -826000;

/// Catalog error code for an unknown user.
pub const CAT_INVALID_USER: i32 = -827000;

/// Catalog error code for an expired password.
pub const CAT_PASSWORD_EXPIRED: i32 = -840000;

/// Server error code when a data object path does not exist.
pub const USER_FILE_DOES_NOT_EXIST: i32 = -510002;

/// Unified error type for all rods operations
#[derive(Debug)]
pub enum RodsError {
    /// Socket, DNS, or TLS I/O failure. Fatal to the connection it occurred on.
    Transport(std::io::Error),

    /// A per-operation deadline elapsed.
    Timeout(String),

    /// The caller cancelled the operation via a cancel token.
    Cancelled,

    /// Codec decode failure or an unexpected message type. Fatal to the
    /// connection: the byte stream is no longer synchronized.
    Malformed(String),

    /// Client-server negotiation produced an incompatible policy pair.
    NegotiationFailed(String),

    /// PAM authentication was attempted on a plain-TCP transport.
    TlsRequired,

    /// The server rejected the authentication exchange.
    AuthFailed(String),

    /// The server returned a negative `intInfo`; the code is preserved.
    Irods {
        /// Raw negative error code from the server.
        code: i32,
        /// Optional server-provided message.
        message: Option<String>,
    },

    /// Specialization of [`RodsError::Irods`] for catalog-no-rows codes.
    FileNotFound(String),

    /// Waiting for a pooled connection timed out.
    PoolExhausted(String),

    /// Feature not implemented (e.g. GSI authentication).
    Unsupported(String),

    /// Invalid client-side configuration.
    Config(String),
}

impl RodsError {
    /// Builds an error from a negative server `intInfo` code.
    ///
    /// Catalog no-rows codes become [`RodsError::FileNotFound`];
    /// authentication codes become [`RodsError::AuthFailed`]; everything
    /// else is preserved as [`RodsError::Irods`].
    pub fn from_code(code: i32) -> Self {
        // Servers append an errno to the main code (e.g. -808001); fold it
        // away before classifying, but keep exact matches for codes that
        // already carry one, like USER_FILE_DOES_NOT_EXIST (-510002).
        let folded = code - (code % 1000);
        if code == USER_FILE_DOES_NOT_EXIST || folded == CAT_NO_ROWS_FOUND {
            return RodsError::FileNotFound(format!("server returned {}", code));
        }
        match folded {
            CAT_INVALID_AUTHENTICATION | CAT_INVALID_USER | CAT_PASSWORD_EXPIRED => {
                RodsError::AuthFailed(format!("server returned {}", code))
            }
            _ => RodsError::Irods {
                code,
                message: None,
            },
        }
    }

    /// Returns the preserved server error code, if this error carries one.
    pub fn server_code(&self) -> Option<i32> {
        match self {
            RodsError::Irods { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns whether the connection this error occurred on must be
    /// discarded rather than returned to the pool.
    pub fn invalidates_connection(&self) -> bool {
        matches!(
            self,
            RodsError::Transport(_)
                | RodsError::Timeout(_)
                | RodsError::Cancelled
                | RodsError::Malformed(_)
        )
    }
}

impl fmt::Display for RodsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RodsError::Transport(e) => write!(f, "Transport error: {}", e),
            RodsError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            RodsError::Cancelled => write!(f, "Operation cancelled"),
            RodsError::Malformed(msg) => write!(f, "Malformed message: {}", msg),
            RodsError::NegotiationFailed(msg) => {
                write!(f, "Client-server negotiation failed: {}", msg)
            }
            RodsError::TlsRequired => {
                write!(f, "PAM authentication requires a TLS transport")
            }
            RodsError::AuthFailed(msg) => write!(f, "Authentication failed: {}", msg),
            RodsError::Irods { code, message } => match message {
                Some(msg) => write!(f, "iRODS error {}: {}", code, msg),
                None => write!(f, "iRODS error {}", code),
            },
            RodsError::FileNotFound(msg) => write!(f, "File not found: {}", msg),
            RodsError::PoolExhausted(msg) => write!(f, "Connection pool exhausted: {}", msg),
            RodsError::Unsupported(msg) => write!(f, "Not supported: {}", msg),
            RodsError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RodsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RodsError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RodsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                RodsError::Timeout(err.to_string())
            }
            _ => RodsError::Transport(err),
        }
    }
}

/// Result type for rods operations
pub type RodsResult<T> = Result<T, RodsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RodsError::Config("missing SSL configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing SSL configuration"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let rods_err: RodsError = io_err.into();
        assert!(matches!(rods_err, RodsError::Transport(_)));
    }

    #[test]
    fn test_timed_out_io_error_becomes_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed");
        let rods_err: RodsError = io_err.into();
        assert!(matches!(rods_err, RodsError::Timeout(_)));
    }

    #[test]
    fn test_from_code_no_rows_is_file_not_found() {
        let err = RodsError::from_code(CAT_NO_ROWS_FOUND);
        assert!(matches!(err, RodsError::FileNotFound(_)));
        // Sub-error of the same family maps identically.
        let err = RodsError::from_code(CAT_NO_ROWS_FOUND - 2);
        assert!(matches!(err, RodsError::FileNotFound(_)));
        // This code already carries an errno suffix; it must match exactly.
        let err = RodsError::from_code(USER_FILE_DOES_NOT_EXIST);
        assert!(matches!(err, RodsError::FileNotFound(_)));
    }

    #[test]
    fn test_from_code_auth() {
        let err = RodsError::from_code(CAT_INVALID_AUTHENTICATION);
        assert!(matches!(err, RodsError::AuthFailed(_)));
    }

    #[test]
    fn test_from_code_preserves_unknown_codes() {
        let err = RodsError::from_code(-1105000);
        assert_eq!(err.server_code(), Some(-1105000));
    }

    #[test]
    fn test_invalidates_connection() {
        assert!(RodsError::Malformed("bad header".to_string()).invalidates_connection());
        assert!(RodsError::Cancelled.invalidates_connection());
        assert!(!RodsError::from_code(-1105000).invalidates_connection());
        assert!(!RodsError::FileNotFound("x".to_string()).invalidates_connection());
    }

    #[test]
    fn test_result_type() {
        fn example() -> RodsResult<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
