//! Request lifecycle orchestration.
//!
//! [`RequestService`] runs every state-changing operation through the same
//! steps: local validation, authorization, persistence, then a best-effort
//! notification. Local checks run before any I/O. Writes are then built
//! from the stored version, never from the caller's copy, so a copy with
//! altered status, people or approval fields is refused before it reaches
//! the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::request::{ConcurrencyToken, RequestId, RequestStatus, RequirementsRequest};
use crate::domain::{NewNote, Note};
use crate::error::{Action, ReqtrackError, Result, ValidationFailure};
use crate::notify::{NotificationKind, Notifier};
use crate::policy;
use crate::repository::{NoteRepository, RequestRepository};
use crate::roles::Actor;

/// Configuration for [`RequestService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the site; links in notifications are built from it
    pub site_url: String,

    /// How long a notification may take before it is abandoned (milliseconds)
    pub notification_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:3000".to_string(),
            notification_timeout_ms: 5_000,
        }
    }
}

/// Applies lifecycle operations to requests.
///
/// # Example
/// ```ignore
/// use reqtrack::{InMemoryRepository, RecordingNotifier, RequestService, ServiceConfig};
///
/// let service = RequestService::new(
///     Arc::new(InMemoryRepository::new()),
///     Arc::new(RecordingNotifier::new()),
///     ServiceConfig::default(),
/// );
/// let approved = service
///     .transition(&request, RequestStatus::Approved, None, &actor)
///     .await?;
/// ```
pub struct RequestService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    config: ServiceConfig,
}

impl<R, N> RequestService<R, N> {
    pub fn new(repository: Arc<R>, notifier: Arc<N>, config: ServiceConfig) -> Self {
        Self {
            repository,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

fn validation(request: &RequirementsRequest, actor: &Actor, reason: ValidationFailure) -> ReqtrackError {
    ReqtrackError::Validation {
        request_id: request.id,
        actor: actor.id(),
        reason,
    }
}

fn unauthorized(request: &RequirementsRequest, actor: &Actor, action: Action) -> ReqtrackError {
    ReqtrackError::Unauthorized {
        request_id: request.id,
        actor: actor.id(),
        action,
    }
}

/// Log and count a rejected state change, then hand the error back.
fn rejected(err: ReqtrackError) -> ReqtrackError {
    tracing::warn!(error = %err, code = err.code(), "Rejected state change");
    metrics::counter!("reqtrack_transitions_rejected_total", "reason" => err.code()).increment(1);
    err
}

fn is_blank(comment: Option<&str>) -> bool {
    comment.is_none_or(|c| c.trim().is_empty())
}

/// Refuse to write a request that breaks the entity invariants.
fn ensure_consistent(request: &RequirementsRequest, actor: &Actor) -> Result<()> {
    request
        .check_invariants()
        .map_err(|detail| rejected(validation(request, actor, ValidationFailure::Inconsistent(detail))))
}

impl<R: RequestRepository, N: Notifier> RequestService<R, N> {
    /// Move `request` to `target` on behalf of `actor`.
    ///
    /// `request` must be the version the caller last read. The move is
    /// applied to the stored version, which must carry the same token and
    /// agree with `request` on status, people and approval fields. Form
    /// edits on `request` are not saved; see [`RequestService::update_details`].
    /// Returns the persisted request with a fresh token.
    ///
    /// # Errors
    /// - `Validation` if the request is a draft, `target` is not a legal
    ///   successor, a required comment is missing, or `request` disagrees
    ///   with the stored lifecycle fields
    /// - `Unauthorized` if the role policy denies the move
    /// - `ConcurrencyConflict` if `request` is not the latest stored version
    /// - `RequestNotFound` or `StoreUnavailable` from the store
    ///
    /// Notification failures are logged and never returned.
    #[tracing::instrument(skip(self, request, comment, actor), fields(request_id = %request.id, actor = %actor.id(), from = %request.status, target = %target))]
    pub async fn transition(
        &self,
        request: &RequirementsRequest,
        target: RequestStatus,
        comment: Option<&str>,
        actor: &Actor,
    ) -> Result<RequirementsRequest> {
        let from = request.status;

        if request.is_draft() {
            return Err(rejected(validation(request, actor, ValidationFailure::NotSubmitted)));
        }
        if !request.is_legal_target(target) {
            return Err(rejected(validation(
                request,
                actor,
                ValidationFailure::IllegalTarget { from, to: target },
            )));
        }
        if !policy::user_can_change_status(request, target, &actor.user, &actor.roles) {
            return Err(rejected(unauthorized(
                request,
                actor,
                Action::Transition { from, to: target },
            )));
        }
        if target.requires_comment() && is_blank(comment) {
            return Err(rejected(validation(
                request,
                actor,
                ValidationFailure::CommentRequired { target },
            )));
        }

        let stored = self.load_current(request).await?;
        if !stored.same_lifecycle(request) {
            return Err(rejected(validation(
                request,
                actor,
                ValidationFailure::StatusChangeRequiresTransition,
            )));
        }

        let next = stored.with_transition(target, comment, Utc::now());
        ensure_consistent(&next, actor)?;
        let persisted = self.repository.upsert(&next).await.map_err(rejected)?;

        tracing::info!(request_id = %persisted.id, %from, to = %target, "Request status changed");
        metrics::counter!(
            "reqtrack_transitions_total",
            "from" => from.as_str(),
            "to" => target.as_str()
        )
        .increment(1);

        self.notify_best_effort(NotificationKind::for_transition(from, target), &persisted, comment)
            .await;

        Ok(persisted)
    }

    /// Submit an unsaved draft for PEO approval.
    ///
    /// Only the people and form contents of `draft` are kept. The received
    /// date is stamped and the request is created in the store.
    #[tracing::instrument(skip(self, draft, actor), fields(actor = %actor.id()))]
    pub async fn submit(&self, draft: &RequirementsRequest, actor: &Actor) -> Result<RequirementsRequest> {
        if !draft.is_draft() {
            return Err(rejected(validation(draft, actor, ValidationFailure::AlreadySubmitted)));
        }
        ensure_consistent(draft, actor)?;
        if !policy::user_can_change_status(draft, RequestStatus::Submitted, &actor.user, &actor.roles) {
            return Err(rejected(unauthorized(
                draft,
                actor,
                Action::Transition {
                    from: RequestStatus::Draft,
                    to: RequestStatus::Submitted,
                },
            )));
        }

        let now = Utc::now();
        let mut submitted = RequirementsRequest::draft(
            draft.requester.clone(),
            draft.approving_peo.clone(),
            draft.data.clone(),
        )
        .with_transition(RequestStatus::Submitted, None, now);
        submitted.data.received_date = now;

        let persisted = self.repository.upsert(&submitted).await.map_err(rejected)?;

        tracing::info!(request_id = %persisted.id, "Request submitted");
        metrics::counter!(
            "reqtrack_transitions_total",
            "from" => RequestStatus::Draft.as_str(),
            "to" => RequestStatus::Submitted.as_str()
        )
        .increment(1);

        self.notify_best_effort(NotificationKind::Submitted, &persisted, None)
            .await;

        Ok(persisted)
    }

    /// Save changes to the form contents of a submitted request.
    ///
    /// Only [`crate::domain::request::RequestData`] may differ from the stored
    /// version; status, people and approval fields change through
    /// [`RequestService::transition`] alone. The actor must be able to make
    /// at least one transition on the stored request.
    #[tracing::instrument(skip(self, request, actor), fields(request_id = %request.id, actor = %actor.id()))]
    pub async fn update_details(
        &self,
        request: &RequirementsRequest,
        actor: &Actor,
    ) -> Result<RequirementsRequest> {
        if request.is_draft() {
            return Err(rejected(validation(request, actor, ValidationFailure::NotSubmitted)));
        }

        let stored = self.load_current(request).await?;
        if !stored.same_lifecycle(request) {
            return Err(rejected(validation(
                request,
                actor,
                ValidationFailure::StatusChangeRequiresTransition,
            )));
        }

        if stored.is_read_only(&actor.user, &actor.roles) {
            return Err(rejected(unauthorized(request, actor, Action::Edit)));
        }
        ensure_consistent(request, actor)?;

        let persisted = self.repository.upsert(request).await.map_err(rejected)?;
        tracing::info!(request_id = %persisted.id, "Request details updated");
        Ok(persisted)
    }

    /// Remove a request from the store. Admin only.
    ///
    /// Removing a request that is already gone is not an error.
    #[tracing::instrument(skip(self, request, actor), fields(request_id = %request.id, actor = %actor.id()))]
    pub async fn remove(&self, request: &RequirementsRequest, actor: &Actor) -> Result<()> {
        if request.is_draft() {
            return Err(rejected(validation(request, actor, ValidationFailure::NotSubmitted)));
        }
        if !policy::user_can_remove(request, &actor.user, &actor.roles) {
            return Err(rejected(unauthorized(request, actor, Action::Remove)));
        }

        self.repository.remove(request).await?;
        tracing::info!(request_id = %request.id, "Request removed");
        Ok(())
    }

    /// Fetch a request by id.
    pub async fn fetch(&self, id: RequestId) -> Result<RequirementsRequest> {
        tracing::debug!(request_id = %id, "Fetching request");
        self.repository
            .fetch_by_id(id)
            .await?
            .ok_or(ReqtrackError::RequestNotFound(id))
    }

    /// Every request in the store.
    pub async fn list(&self) -> Result<Vec<RequirementsRequest>> {
        self.repository.fetch_all().await
    }

    /// Requests on which `actor` can make at least one transition right now.
    pub async fn actionable(&self, actor: &Actor) -> Result<Vec<RequirementsRequest>> {
        let requests = self.repository.fetch_all().await?;
        let actionable: Vec<_> = requests
            .into_iter()
            .filter(|request| !request.is_draft() && !request.is_read_only(&actor.user, &actor.roles))
            .collect();
        tracing::debug!(actor = %actor.id(), count = actionable.len(), "Computed actionable requests");
        Ok(actionable)
    }

    /// The stored version of `request`, provided the caller read the latest one.
    async fn load_current(&self, request: &RequirementsRequest) -> Result<RequirementsRequest> {
        let stored = self
            .repository
            .fetch_by_id(request.id)
            .await
            .map_err(rejected)?
            .ok_or_else(|| rejected(ReqtrackError::RequestNotFound(request.id)))?;

        if stored.concurrency_token != request.concurrency_token {
            return Err(rejected(ReqtrackError::ConcurrencyConflict {
                request_id: request.id,
                supplied: request.concurrency_token.clone(),
                current: stored
                    .concurrency_token
                    .clone()
                    .unwrap_or_else(ConcurrencyToken::fresh),
            }));
        }
        Ok(stored)
    }

    /// Deliver a notification, bounded by the configured timeout.
    ///
    /// The change has already been committed, so failures are only logged
    /// and counted.
    async fn notify_best_effort(
        &self,
        kind: NotificationKind,
        request: &RequirementsRequest,
        comment: Option<&str>,
    ) {
        let label = kind.label();
        let timeout = Duration::from_millis(self.config.notification_timeout_ms);

        match tokio::time::timeout(timeout, self.notifier.notify(kind, request, comment)).await {
            Ok(Ok(())) => {
                tracing::debug!(request_id = %request.id, kind = label, "Notification delivered");
            }
            Ok(Err(e)) => {
                tracing::warn!(request_id = %request.id, kind = label, error = %e, "Notification failed");
                metrics::counter!("reqtrack_notifications_failed_total", "kind" => label).increment(1);
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request.id,
                    kind = label,
                    timeout_ms = self.config.notification_timeout_ms,
                    "Notification timed out"
                );
                metrics::counter!("reqtrack_notifications_failed_total", "kind" => label).increment(1);
            }
        }
    }
}

impl<R: RequestRepository + NoteRepository, N: Notifier> RequestService<R, N> {
    /// Attach a note to a submitted request and tell both parties about it.
    #[tracing::instrument(skip(self, request, title, text, actor), fields(request_id = %request.id, actor = %actor.id()))]
    pub async fn add_note(
        &self,
        request: &RequirementsRequest,
        title: &str,
        text: &str,
        actor: &Actor,
    ) -> Result<Note> {
        if request.is_draft() {
            return Err(rejected(validation(request, actor, ValidationFailure::NotSubmitted)));
        }
        if text.trim().is_empty() {
            return Err(rejected(validation(request, actor, ValidationFailure::EmptyNote)));
        }
        if !policy::user_can_add_note(request, &actor.user, &actor.roles) {
            return Err(rejected(unauthorized(request, actor, Action::AddNote)));
        }

        let note = self
            .repository
            .add_note(NewNote {
                request_id: request.id,
                title: title.trim().to_string(),
                text: text.trim().to_string(),
                author: actor.user.clone(),
            })
            .await?;

        tracing::info!(request_id = %request.id, note_id = %note.id, "Note added");
        self.notify_best_effort(NotificationKind::NoteAdded(note.clone()), request, None)
            .await;

        Ok(note)
    }

    /// Notes attached to a request, oldest first.
    pub async fn notes(&self, request_id: RequestId) -> Result<Vec<Note>> {
        self.repository.fetch_notes(request_id).await
    }
}
