//! Mapping of bridge HTTP failures onto chatvault errors.

use chatvault_core::Error;

/// Convert a non-success bridge response to an [`Error`].
///
/// 401/403 mean the session is gone and must stop ingestion. 429 carries
/// the server's `Retry-After` hint. Other 4xx are call-specific rejections;
/// 5xx are treated as transport failures.
pub fn status_to_error(status: u16, message: &str, retry_after_secs: Option<u64>) -> Error {
    match status {
        401 | 403 => Error::Unauthorized(message.to_string()),
        429 => Error::RateLimited { retry_after_secs },
        404 => Error::NotFound(message.to_string()),
        400..=499 => Error::Remote(format!("{}: {}", status, message)),
        _ => Error::Request(format!("bridge returned {}: {}", status, message)),
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}
