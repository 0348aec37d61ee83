//! Error types for Chatstore Core
//!
//! Every failure the store can report is a variant of [`StoreError`]. The
//! operator layer turns these into messages; nothing here is fatal to the
//! process. We use `thiserror` for the Display/Error plumbing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input rejected before any mutation was applied
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No user with this username
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// No chat with this id
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// The on-disk document could not be parsed
    #[error("Document at {} is unreadable: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Pre-mutation backup failed and the backup policy requires one
    #[error("Backup failed: {source}")]
    Backup {
        #[source]
        source: Box<StoreError>,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StoreError>,
    },
}

/// Input validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("username {0:?} must match [A-Za-z0-9_.-] and be 1-64 characters long")]
    InvalidUsername(String),

    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error("contact number {0:?} must be in format C-123456")]
    InvalidContactNumber(String),

    #[error("contact number {0:?} is already in use")]
    ContactNumberTaken(String),

    #[error("chat id {0:?} already exists")]
    ChatIdTaken(String),
}

impl StoreError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip context wrappers and return the underlying error
    pub fn root(&self) -> &StoreError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for validation and not-found failures, which never touch the document
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.root(),
            Self::Validation(_) | Self::UserNotFound(_) | Self::ChatNotFound(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<StoreError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = StoreError::from(ValidationError::UsernameTaken("bob".into()));
        let err = err.context("Failed to rename user");

        assert!(err.to_string().contains("Failed to rename user"));
        assert!(err.to_string().contains("bob"));
    }

    #[test]
    fn test_result_ext_on_io_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("writing data.json").unwrap_err();

        assert!(err.to_string().starts_with("writing data.json"));
        assert!(matches!(err.root(), StoreError::Io(_)));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(StoreError::UserNotFound("x".into()).is_rejection());
        assert!(StoreError::from(ValidationError::InvalidContactNumber("1".into()))
            .context("ctx")
            .is_rejection());
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!io.is_rejection());
    }
}
