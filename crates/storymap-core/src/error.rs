//! Error types for storymap.

use thiserror::Error;

use crate::lifecycle::TransitionRejection;

/// Result type alias using storymap's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for storymap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unknown story or pin identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lifecycle guard violation
    #[error("Invalid transition: {0}")]
    InvalidTransition(TransitionRejection),

    /// Invalid field value (out-of-range coordinate, duplicate id, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Required field absent or blank
    #[error("Validation error: missing required field '{0}'")]
    MissingField(&'static str),

    /// Backing store lacks a required table or column
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// Backing store rejected a write or could not be reached
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of the backing store itself, which are reported
    /// upward unchanged.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Storage(_) | Error::SchemaUnavailable(_)
        )
    }

    /// True for caller mistakes that map to a validation response.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::MissingField(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<TransitionRejection> for Error {
    fn from(rejection: TransitionRejection) -> Self {
        Error::InvalidTransition(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleAction;
    use crate::models::StoryStatus;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("story s1".to_string());
        assert_eq!(err.to_string(), "Not found: story s1");
    }

    #[test]
    fn test_error_display_missing_field() {
        let err = Error::MissingField("title");
        assert_eq!(
            err.to_string(),
            "Validation error: missing required field 'title'"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err: Error = TransitionRejection {
            id: "s1".to_string(),
            from: StoryStatus::Pending,
            action: LifecycleAction::Publish,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid transition:"));
        assert!(msg.contains("s1"));
        assert!(msg.contains("pending"));
    }

    #[test]
    fn test_storage_failure_classification() {
        assert!(Error::Storage("connection reset".to_string()).is_storage_failure());
        assert!(!Error::NotFound("x".to_string()).is_storage_failure());
        assert!(!Error::Validation("bad".to_string()).is_storage_failure());
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
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "seed file missing");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("I/O error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
