//! Error types for the request lifecycle engine.

use thiserror::Error;

use crate::domain::person::PersonId;
use crate::domain::request::{ConcurrencyToken, RequestId, RequestStatus};

/// Result type alias using the reqtrack error type.
pub type Result<T> = std::result::Result<T, ReqtrackError>;

/// Main error type for the lifecycle engine.
///
/// Variants map onto four caller-visible categories: local validation,
/// authorization, concurrency conflicts and store outages. Notification
/// failures are produced by [`crate::notify::Notifier`] implementations but
/// never escape [`crate::service::RequestService`].
#[derive(Error, Debug)]
pub enum ReqtrackError {
    /// The requested operation is not legal for the request in its current state.
    #[error("Validation failed for request {request_id} (actor {actor}): {reason}")]
    Validation {
        request_id: RequestId,
        actor: PersonId,
        reason: ValidationFailure,
    },

    /// The role policy denied the operation.
    #[error("User {actor} is not authorized to {action} on request {request_id}")]
    Unauthorized {
        request_id: RequestId,
        actor: PersonId,
        action: Action,
    },

    /// The supplied concurrency token does not match the stored one.
    ///
    /// The caller must re-fetch the request before retrying.
    #[error(
        "Concurrency conflict on request {request_id}: supplied token {}, store has {current}",
        display_token(.supplied)
    )]
    ConcurrencyConflict {
        request_id: RequestId,
        supplied: Option<ConcurrencyToken>,
        current: ConcurrencyToken,
    },

    /// Request not found (or removed)
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// The backing store could not complete the operation. Not retried by the core.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// A notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Mail relay transport error
    #[error("Mail transport failed: {0}")]
    MailTransport(#[from] reqwest::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn display_token(token: &Option<ConcurrencyToken>) -> String {
    token
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".to_string())
}

impl ReqtrackError {
    /// Stable, machine-readable reason code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            ReqtrackError::Validation { .. } => "validation",
            ReqtrackError::Unauthorized { .. } => "unauthorized",
            ReqtrackError::ConcurrencyConflict { .. } => "conflict",
            ReqtrackError::RequestNotFound(_) => "not_found",
            ReqtrackError::StoreUnavailable(_) => "store_unavailable",
            ReqtrackError::Notification(_) | ReqtrackError::MailTransport(_) => "notification",
            ReqtrackError::Other(_) => "internal",
        }
    }

    /// True if the caller should re-fetch the request and try again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReqtrackError::ConcurrencyConflict { .. })
    }

    /// True for failures the store reported as transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReqtrackError::StoreUnavailable(_))
    }
}

/// Why a request failed local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The request is an unsaved draft; it must be submitted first.
    NotSubmitted,
    /// Only drafts can be submitted.
    AlreadySubmitted,
    /// The target is neither the next status, the reject status nor a cancellation.
    IllegalTarget {
        from: RequestStatus,
        to: RequestStatus,
    },
    /// Rejections and cancellations must carry a rationale.
    CommentRequired { target: RequestStatus },
    /// Status, people and approval fields can only change through a transition.
    StatusChangeRequiresTransition,
    /// The resulting request would break a structural invariant.
    Inconsistent(String),
    /// Notes must have text.
    EmptyNote,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::NotSubmitted => write!(f, "request has not been submitted"),
            ValidationFailure::AlreadySubmitted => write!(f, "request was already submitted"),
            ValidationFailure::IllegalTarget { from, to } => {
                write!(f, "'{}' is not a legal target from '{}'", to, from)
            }
            ValidationFailure::CommentRequired { target } => {
                write!(f, "a comment is required to change the status to '{}'", target)
            }
            ValidationFailure::StatusChangeRequiresTransition => {
                write!(f, "status, people and approval fields only change through a transition")
            }
            ValidationFailure::Inconsistent(detail) => write!(f, "inconsistent request: {}", detail),
            ValidationFailure::EmptyNote => write!(f, "note text is empty"),
        }
    }
}

/// The operation an authorization decision was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Transition {
        from: RequestStatus,
        to: RequestStatus,
    },
    Edit,
    Remove,
    AddNote,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Transition { from, to } => write!(f, "move '{}' -> '{}'", from, to),
            Action::Edit => write!(f, "edit"),
            Action::Remove => write!(f, "remove"),
            Action::AddNote => write!(f, "add a note"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_per_category() {
        let validation = ReqtrackError::Validation {
            request_id: RequestId(7),
            actor: PersonId(1),
            reason: ValidationFailure::CommentRequired {
                target: RequestStatus::Cancelled,
            },
        };
        let unauthorized = ReqtrackError::Unauthorized {
            request_id: RequestId(7),
            actor: PersonId(1),
            action: Action::Transition {
                from: RequestStatus::Submitted,
                to: RequestStatus::Approved,
            },
        };
        let conflict = ReqtrackError::ConcurrencyConflict {
            request_id: RequestId(7),
            supplied: Some(ConcurrencyToken::new("a")),
            current: ConcurrencyToken::new("b"),
        };
        let outage = ReqtrackError::StoreUnavailable(anyhow::anyhow!("connection reset"));

        assert_eq!(validation.code(), "validation");
        assert_eq!(unauthorized.code(), "unauthorized");
        assert_eq!(conflict.code(), "conflict");
        assert_eq!(outage.code(), "store_unavailable");
        assert!(conflict.is_conflict());
        assert!(outage.is_transient());
        assert!(!validation.is_conflict());

        let unexpected = ReqtrackError::from(anyhow::anyhow!("bad payload"));
        assert_eq!(unexpected.code(), "internal");
        assert_eq!(unexpected.to_string(), "bad payload");
    }

    #[test]
    fn test_inconsistent_request_message() {
        let err = ReqtrackError::Validation {
            request_id: RequestId(0),
            actor: PersonId(1),
            reason: ValidationFailure::Inconsistent("draft has approval date".to_string()),
        };
        assert_eq!(err.code(), "validation");
        assert!(err.to_string().contains("inconsistent request: draft has approval date"));
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ReqtrackError::Unauthorized {
            request_id: RequestId(12),
            actor: PersonId(3),
            action: Action::Transition {
                from: RequestStatus::Submitted,
                to: RequestStatus::Approved,
            },
        };
        let message = err.to_string();
        assert!(message.contains("12"));
        assert!(message.contains("3"));
        assert!(message.contains("'Submitted' -> 'Approved'"));

        let err = ReqtrackError::ConcurrencyConflict {
            request_id: RequestId(12),
            supplied: None,
            current: ConcurrencyToken::new("etag-2"),
        };
        assert!(err.to_string().contains("<none>"));
        assert!(err.to_string().contains("etag-2"));
    }
}
