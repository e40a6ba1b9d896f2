//! Error types for the confession booth.
//!
//! This module defines all error types used throughout the crate, grouped by
//! the subsystem that raises them.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for confession booth operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The storage lock was poisoned by a panicking holder.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Submission Errors ===
    /// A required form field was missing or blank.
    #[error("{message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Message suitable for showing to the user.
        message: String,
    },

    /// A photo payload could not be decoded.
    #[error("invalid photo payload: {0}")]
    InvalidPhoto(String),

    /// The session cannot handle this event on the current screen.
    #[error("cannot {event} from the {screen} screen")]
    InvalidTransition {
        /// Screen the session was on.
        screen: String,
        /// Event that was rejected.
        event: String,
    },

    // === Network Errors ===
    /// An HTTP request failed at the transport layer.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The text-generation provider refused or garbled a request.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider rate limited the active credential.
    #[error("rate limited by provider (credential {index})")]
    ProviderRateLimited {
        /// Index of the credential that was rejected.
        index: usize,
    },

    /// A remote collaborator answered with a non-success status.
    #[error("{service} returned status {status}")]
    RemoteStatus {
        /// Name of the remote service.
        service: &'static str,
        /// HTTP status code.
        status: u16,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for confession booth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error for a form field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a new provider error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error is a form validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The form field that failed validation, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Check if this error came from local persistence.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::StorageUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = Error::validation("name", "Please enter your full name");
        assert_eq!(err.to_string(), "Please enter your full name");
        assert!(err.is_validation());
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_non_validation_has_no_field() {
        let err = Error::provider("bad payload");
        assert!(!err.is_validation());
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_provider_error_display() {
        let err = Error::provider("no candidates");
        assert_eq!(err.to_string(), "provider error: no candidates");
    }

    #[test]
    fn test_rate_limited_display() {
        let err = Error::ProviderRateLimited { index: 3 };
        assert!(err.to_string().contains("credential 3"));
    }

    #[test]
    fn test_remote_status_display() {
        let err = Error::RemoteStatus {
            service: "webhook",
            status: 502,
        };
        assert_eq!(err.to_string(), "webhook returned status 502");
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("max_limit too small");
        assert!(err.to_string().contains("max_limit too small"));
    }

    #[test]
    fn test_storage_predicate() {
        let err = Error::StorageUnavailable("poisoned".to_string());
        assert!(err.is_storage());
        assert!(!Error::internal("x").is_storage());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
            assert!(err.is_storage());
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
