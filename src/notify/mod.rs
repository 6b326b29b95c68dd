//! Notification contract.
//!
//! The lifecycle engine reports what happened to a request through a
//! [`Notifier`] after the change has been persisted. Delivery is best effort:
//! the engine logs and counts failures but never rolls back or reports them
//! to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::Note;
use crate::domain::request::{RequestStatus, RequirementsRequest};
use crate::error::{ReqtrackError, Result};

pub mod email;

pub use email::EmailNotifier;

/// What happened to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// A draft was submitted for PEO approval.
    Submitted,
    /// The approving PEO approved the request.
    Approved,
    /// The request entered a reject status.
    Rejected { status: RequestStatus },
    Cancelled,
    /// Any other forward move.
    StatusChanged {
        from: RequestStatus,
        to: RequestStatus,
    },
    NoteAdded(Note),
}

impl NotificationKind {
    /// The notification to send when a request moves from `from` to `to`.
    pub fn for_transition(from: RequestStatus, to: RequestStatus) -> Self {
        match to {
            RequestStatus::Submitted => NotificationKind::Submitted,
            RequestStatus::Approved => NotificationKind::Approved,
            RequestStatus::Cancelled => NotificationKind::Cancelled,
            status if status.is_reject() => NotificationKind::Rejected { status },
            to => NotificationKind::StatusChanged { from, to },
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Submitted => "submitted",
            NotificationKind::Approved => "approved",
            NotificationKind::Rejected { .. } => "rejected",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::StatusChanged { .. } => "status_changed",
            NotificationKind::NoteAdded(_) => "note_added",
        }
    }
}

/// Delivers lifecycle notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the interested parties about `kind` on `request`.
    ///
    /// `request` is the persisted version. `comment` is the rationale the
    /// actor gave, if any.
    async fn notify(
        &self,
        kind: NotificationKind,
        request: &RequirementsRequest,
        comment: Option<&str>,
    ) -> Result<()>;
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotification {
    pub kind: NotificationKind,
    pub request: RequirementsRequest,
    pub comment: Option<String>,
}

/// Notifier that records every call. Can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    recorded: Arc<Mutex<Vec<RecordedNotification>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call with the given message. Calls are still recorded.
    pub fn fail_with(&self, error: &str) {
        *self.failing.lock() = Some(error.to_string());
    }

    pub fn recorded(&self) -> Vec<RecordedNotification> {
        self.recorded.lock().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.recorded.lock().iter().map(|n| n.kind.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        request: &RequirementsRequest,
        comment: Option<&str>,
    ) -> Result<()> {
        self.recorded.lock().push(RecordedNotification {
            kind,
            request: request.clone(),
            comment: comment.map(str::to_string),
        });
        match self.failing.lock().clone() {
            Some(error) => Err(ReqtrackError::Notification(error)),
            None => Ok(()),
        }
    }
}
