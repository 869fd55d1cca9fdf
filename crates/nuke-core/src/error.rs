//! Backend error types and transient/fatal classification.
//!
//! Resource kinds return `BackendError` from `list`, `setup` and `remove`.
//! The retry loop only needs to know whether an error is worth retrying;
//! that decision lives in `classify` and nowhere else.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend API rejected a request.
    #[error("Error {status}: {message}{}", reason_suffix(.reason))]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// A long-running operation finished with an error.
    #[error("operation {operation} failed: {message}{}", reason_suffix(.code))]
    Operation {
        operation: String,
        code: Option<String>,
        message: String,
    },

    /// An item did not finish deleting within the configured timeout.
    #[error("timed out after {}s waiting for {item}", .waited.as_secs())]
    Timeout { item: String, waited: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(", {r}"))
        .unwrap_or_default()
}

impl BackendError {
    /// Create an untyped error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(classify(self), ErrorClass::Transient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Why a backend error is expected to clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransientReason {
    /// Another resource still references the target.
    InUse,
    /// The target is mid-transition and refuses the request.
    NotReady,
    /// A listing returned an item that is already gone.
    StaleListing,
}

/// Outcome of classifying a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient(TransientReason),
    Fatal,
}

/// Typed reason codes, as reported by API errors and operation errors.
const TRANSIENT_REASONS: &[(&str, TransientReason)] = &[
    ("resourceInUseByAnotherResource", TransientReason::InUse),
    ("RESOURCE_IN_USE_BY_ANOTHER_RESOURCE", TransientReason::InUse),
    ("resourceNotReady", TransientReason::NotReady),
    ("RESOURCE_NOT_READY", TransientReason::NotReady),
];

/// Substrings matched against error text when no typed reason is available.
const TRANSIENT_MESSAGES: &[(&str, TransientReason)] = &[
    ("resourceInUseByAnotherResource", TransientReason::InUse),
    ("resourceNotReady", TransientReason::NotReady),
    // Listing right after a delete can return ghost entries (seen with
    // GKE-managed instance groups); deleting those answers 404.
    ("googleapi: Error 404", TransientReason::StaleListing),
];

/// Classify a backend error as transient or fatal.
pub fn classify(error: &BackendError) -> ErrorClass {
    match error {
        BackendError::Api { status: 404, .. } => {
            ErrorClass::Transient(TransientReason::StaleListing)
        }
        BackendError::Api {
            reason: Some(reason),
            ..
        }
        | BackendError::Operation {
            code: Some(reason),
            ..
        } => match transient_reason(reason) {
            Some(r) => ErrorClass::Transient(r),
            None => classify_message(&error.to_string()),
        },
        BackendError::Cancelled | BackendError::Timeout { .. } => ErrorClass::Fatal,
        _ => classify_message(&error.to_string()),
    }
}

/// Classify raw error text by the known transient substrings.
pub fn classify_message(message: &str) -> ErrorClass {
    TRANSIENT_MESSAGES
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, reason)| ErrorClass::Transient(*reason))
        .unwrap_or(ErrorClass::Fatal)
}

fn transient_reason(code: &str) -> Option<TransientReason> {
    TRANSIENT_REASONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, reason)| *reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, reason: Option<&str>, message: &str) -> BackendError {
        BackendError::Api {
            status,
            reason: reason.map(String::from),
            message: message.to_string(),
        }
    }

    #[test]
    fn typed_reasons_are_transient() {
        for (code, expected) in TRANSIENT_REASONS {
            let err = api(400, Some(code), "boom");
            assert_eq!(classify(&err), ErrorClass::Transient(*expected), "{code}");

            let op = BackendError::Operation {
                operation: "operation-1".to_string(),
                code: Some(code.to_string()),
                message: "boom".to_string(),
            };
            assert_eq!(classify(&op), ErrorClass::Transient(*expected), "{code}");
        }
    }

    #[test]
    fn message_substrings_are_transient() {
        let err = BackendError::other(
            "The network resource 'default' is already being used by 'fw-1': resourceInUseByAnotherResource",
        );
        assert_eq!(classify(&err), ErrorClass::Transient(TransientReason::InUse));

        let err = BackendError::other("googleapi: Error 400: resourceNotReady");
        assert_eq!(classify(&err), ErrorClass::Transient(TransientReason::NotReady));

        let err = BackendError::other("googleapi: Error 404: The resource was not found");
        assert_eq!(
            classify(&err),
            ErrorClass::Transient(TransientReason::StaleListing)
        );
    }

    #[test]
    fn not_found_api_error_is_stale_listing() {
        let err = api(404, Some("notFound"), "The resource 'disk-1' was not found");
        assert!(err.is_transient());
    }

    #[test]
    fn other_errors_are_fatal() {
        assert_eq!(
            classify(&api(403, Some("forbidden"), "Required 'compute.instances.delete' permission")),
            ErrorClass::Fatal
        );
        assert_eq!(classify(&BackendError::other("malformed request")), ErrorClass::Fatal);
        assert_eq!(classify(&BackendError::Cancelled), ErrorClass::Fatal);
        assert!(!BackendError::Auth("no token".to_string()).is_transient());
    }

    #[test]
    fn unknown_reason_falls_back_to_message() {
        let err = api(400, Some("badRequest"), "resourceNotReady: try again later");
        assert_eq!(classify(&err), ErrorClass::Transient(TransientReason::NotReady));
    }

    #[test]
    fn api_error_display_includes_reason() {
        let err = api(400, Some("resourceInUseByAnotherResource"), "in use");
        assert_eq!(err.to_string(), "Error 400: in use, resourceInUseByAnotherResource");
        assert_eq!(api(500, None, "backend").to_string(), "Error 500: backend");
    }
}
