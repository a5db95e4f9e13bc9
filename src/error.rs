//! Error types for the WOPI lock engine.
//!
//! Uses thiserror for derive macros. Every variant is a terminal outcome of a
//! single request and maps onto exactly one HTTP status.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for wopilock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WopiError {
    /// The file id, its document, or the referenced blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required protocol header is missing or empty, or the operation is unknown.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Lock mismatch, absent-when-expected, permission denied, or natively locked.
    ///
    /// `current` is the value to echo in the lock header: `None` sends no
    /// header at all, `Some("")` sends an empty one.
    #[error("lock conflict{}", conflict_suffix(.current))]
    LockConflict { current: Option<String> },

    /// The request shape is not supported.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// The payload exceeds the server or client size limit.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Reading or writing persisted state failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration could not be read or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl WopiError {
    /// Conflict that sends no lock header (natively locked, permission denied).
    pub fn conflict() -> Self {
        WopiError::LockConflict { current: None }
    }

    /// Conflict echoing `lock` in the lock header (empty string when unlocked).
    pub fn conflict_with(lock: impl Into<String>) -> Self {
        WopiError::LockConflict {
            current: Some(lock.into()),
        }
    }

    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            WopiError::NotFound(_) => 404,
            WopiError::BadRequest(_) => 400,
            WopiError::LockConflict { .. } => 409,
            WopiError::Unsupported(_) => 501,
            WopiError::PreconditionFailed(_) => 412,
            WopiError::Storage(_) | WopiError::Config(_) => 500,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WopiError::NotFound(_) => exit_codes::NOT_FOUND,
            WopiError::BadRequest(_) => exit_codes::BAD_REQUEST,
            WopiError::LockConflict { .. } => exit_codes::LOCK_CONFLICT,
            WopiError::Unsupported(_) => exit_codes::UNSUPPORTED,
            WopiError::PreconditionFailed(_) => exit_codes::PRECONDITION_FAILED,
            WopiError::Storage(_) | WopiError::Config(_) => exit_codes::USER_ERROR,
        }
    }

    /// The lock header value carried by a conflict, if any.
    pub fn lock_header(&self) -> Option<&str> {
        match self {
            WopiError::LockConflict { current } => current.as_deref(),
            _ => None,
        }
    }
}

fn conflict_suffix(current: &Option<String>) -> String {
    match current {
        Some(lock) if !lock.is_empty() => format!(" (current lock: {})", lock),
        Some(_) => " (not locked)".to_string(),
        None => String::new(),
    }
}

/// Result type alias for wopilock operations.
pub type Result<T> = std::result::Result<T, WopiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_protocol() {
        assert_eq!(WopiError::NotFound("x".into()).status_code(), 404);
        assert_eq!(WopiError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(WopiError::conflict().status_code(), 409);
        assert_eq!(WopiError::Unsupported("x".into()).status_code(), 501);
        assert_eq!(WopiError::PreconditionFailed("x".into()).status_code(), 412);
        assert_eq!(WopiError::Storage("x".into()).status_code(), 500);
    }

    #[test]
    fn conflict_has_lock_exit_code() {
        assert_eq!(
            WopiError::conflict_with("foo").exit_code(),
            exit_codes::LOCK_CONFLICT
        );
        assert_eq!(
            WopiError::Config("bad".into()).exit_code(),
            exit_codes::USER_ERROR
        );
    }

    #[test]
    fn lock_header_distinguishes_absent_and_empty() {
        assert_eq!(WopiError::conflict().lock_header(), None);
        assert_eq!(WopiError::conflict_with("").lock_header(), Some(""));
        assert_eq!(WopiError::conflict_with("foo").lock_header(), Some("foo"));
        assert_eq!(WopiError::NotFound("x".into()).lock_header(), None);
    }

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            WopiError::conflict_with("foo").to_string(),
            "lock conflict (current lock: foo)"
        );
        assert_eq!(
            WopiError::conflict_with("").to_string(),
            "lock conflict (not locked)"
        );
        assert_eq!(WopiError::conflict().to_string(), "lock conflict");
        assert_eq!(
            WopiError::BadRequest("missing X-WOPI-Lock".into()).to_string(),
            "bad request: missing X-WOPI-Lock"
        );
    }
}
