//! Error types for the photo frame controller.

use thiserror::Error;

/// Errors that can occur while managing photos, config and the display.
#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected: bad filename, crop rectangle, interval, image type...
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unknown photo or widget type
    #[error("not found: {0}")]
    NotFound(String),

    /// Disk read/write failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Decoding, encoding or compositing an image failed
    #[error("image processing failed: {0}")]
    Image(String),

    /// No e-ink panel detected or it could not be opened
    #[error("display hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// The panel rejected a frame
    #[error("display error: {0}")]
    Display(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// Background task failed (join error, closed channel)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Error::Storage(e.to_string()),
            image::ImageError::Unsupported(e) => Error::Validation(e.to_string()),
            other => Error::Image(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("cycle_interval must be at least 60 seconds");
        assert!(err.to_string().contains("at least 60"));

        let err = Error::not_found("a.jpg");
        assert_eq!(err.to_string(), "not found: a.jpg");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(matches!(Error::from(io), Error::Storage(_)));
    }
}
