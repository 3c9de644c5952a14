//! Error types for chatvault.

use thiserror::Error;

/// Result type alias using chatvault's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for chatvault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote messaging service rejected or failed a call
    #[error("Remote error: {0}")]
    Remote(String),

    /// Remote messaging service asked us to slow down
    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Session is missing, expired, or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unrecognized message, media, or peer shape
    #[error("Classification error: {0}")]
    Classification(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation abandoned because cancellation was requested
    #[error("Cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that must stop the ingestion driver instead of being absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    /// Errors that are likely to succeed on the next rescan without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Request(_) | Error::Database(_) | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("conversation 42".to_string());
        assert_eq!(err.to_string(), "Not found: conversation 42");
    }

    #[test]
    fn test_error_display_rate_limited() {
        let err = Error::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limited: retry after Some(30)s");
    }

    #[test]
    fn test_error_display_classification() {
        let err = Error::Classification("unsupported media: geo".to_string());
        assert_eq!(
            err.to_string(),
            "Classification error: unsupported media: geo"
        );
    }

    #[test]
    fn test_error_display_cancelled() {
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_only_unauthorized_is_fatal() {
        assert!(Error::Unauthorized("session revoked".into()).is_fatal());
        assert!(!Error::Remote("PEER_ID_INVALID".into()).is_fatal());
        assert!(!Error::RateLimited {
            retry_after_secs: None
        }
        .is_fatal());
        assert!(!Error::Storage("disk full".into()).is_fatal());
    }

    #[test]
    fn test_transient_errors() {
        assert!(Error::RateLimited {
            retry_after_secs: Some(5)
        }
        .is_transient());
        assert!(Error::Request("connection reset".into()).is_transient());
        assert!(!Error::Classification("x".into()).is_transient());
        assert!(!Error::Unauthorized("x".into()).is_transient());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
