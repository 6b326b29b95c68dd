//! Status transitions for requirements requests.
//!
//! The pipeline is mostly linear. Two stages have a negative counterpart and
//! every non-terminal saved status can be cancelled:
//!
//! ```text
//! Draft ─submit─> Submitted ──> Approved ──> Review ──> Accepted ──> Contract ──> Closed
//!                     │                        │
//!                     └──> Disapproved         └──> Declined
//!
//! Submitted | Approved | Review | Accepted | Contract ──cancel──> Cancelled
//! ```
//!
//! `next` and `reject` are pure functions of the status alone. The methods on
//! [`RequirementsRequest`] add the draft rule (an unsaved request has no
//! transitions; it is submitted instead) and combine the status rules with
//! the role policy to decide whether a user is looking at a read-only request.

use chrono::{DateTime, Utc};

use super::state::{RequestStatus, RequirementsRequest};
use crate::domain::person::Person;
use crate::policy;
use crate::roles::RoleType;

impl RequestStatus {
    /// The single forward status, or `None` for terminal statuses.
    pub fn next(self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Draft => Some(RequestStatus::Submitted),
            RequestStatus::Submitted => Some(RequestStatus::Approved),
            RequestStatus::Approved => Some(RequestStatus::Review),
            RequestStatus::Review => Some(RequestStatus::Accepted),
            RequestStatus::Accepted => Some(RequestStatus::Contract),
            RequestStatus::Contract => Some(RequestStatus::Closed),
            RequestStatus::Disapproved
            | RequestStatus::Declined
            | RequestStatus::Closed
            | RequestStatus::Cancelled => None,
        }
    }

    /// The negative outcome of the current stage, if the stage has one.
    pub fn reject(self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Submitted => Some(RequestStatus::Disapproved),
            RequestStatus::Review => Some(RequestStatus::Declined),
            RequestStatus::Draft
            | RequestStatus::Approved
            | RequestStatus::Disapproved
            | RequestStatus::Accepted
            | RequestStatus::Declined
            | RequestStatus::Contract
            | RequestStatus::Closed
            | RequestStatus::Cancelled => None,
        }
    }
}

impl RequirementsRequest {
    /// The forward status reachable from here. `None` for drafts and terminal statuses.
    pub fn next_status(&self) -> Option<RequestStatus> {
        if self.is_draft() {
            return None;
        }
        self.status.next()
    }

    /// The reject status reachable from here. `None` for drafts and for
    /// stages without a negative outcome.
    pub fn reject_status(&self) -> Option<RequestStatus> {
        if self.is_draft() {
            return None;
        }
        self.status.reject()
    }

    /// Every status this request may legally move to, regardless of who asks.
    pub fn legal_targets(&self) -> Vec<RequestStatus> {
        if self.is_draft() || self.status.is_terminal() {
            return Vec::new();
        }
        self.next_status()
            .into_iter()
            .chain(self.reject_status())
            .chain(std::iter::once(RequestStatus::Cancelled))
            .collect()
    }

    pub fn is_legal_target(&self, target: RequestStatus) -> bool {
        self.legal_targets().contains(&target)
    }

    /// True when `user` has no legal action left on this request.
    ///
    /// Drafts are always editable by whoever holds them. Terminal requests
    /// are read-only for everyone. Otherwise the answer comes from the role
    /// policy, so an edit affordance is only offered when some transition
    /// would be authorized.
    pub fn is_read_only(&self, user: &Person, roles: &[RoleType]) -> bool {
        if self.is_draft() {
            return false;
        }
        if self.status.is_terminal() {
            return true;
        }
        !self
            .legal_targets()
            .into_iter()
            .any(|target| policy::user_can_change_status(self, target, user, roles))
    }

    /// Build the post-transition version of this request.
    ///
    /// Does not check legality or authorization. The concurrency token is
    /// carried over unchanged so that the store can detect a stale read.
    pub fn with_transition(
        &self,
        target: RequestStatus,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> RequirementsRequest {
        let comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let mut next = self.clone();
        next.status = target;
        next.status_comment = comment.clone();

        match target {
            RequestStatus::Approved => {
                next.peo_approved_date = Some(now);
                next.peo_approved_comment = comment;
            }
            RequestStatus::Disapproved => {
                next.peo_approved_comment = comment;
            }
            _ => {}
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::request::state::fixtures::{data, peo, requester, saved};

    fn stranger() -> Person {
        Person::new(99, "Someone Else", "someone@example.com")
    }

    #[test]
    fn test_next_status_follows_pipeline_order() {
        let expected = [
            (RequestStatus::Submitted, Some(RequestStatus::Approved)),
            (RequestStatus::Approved, Some(RequestStatus::Review)),
            (RequestStatus::Review, Some(RequestStatus::Accepted)),
            (RequestStatus::Accepted, Some(RequestStatus::Contract)),
            (RequestStatus::Contract, Some(RequestStatus::Closed)),
            (RequestStatus::Disapproved, None),
            (RequestStatus::Declined, None),
            (RequestStatus::Closed, None),
            (RequestStatus::Cancelled, None),
        ];
        for (status, next) in expected {
            assert_eq!(saved(5, status).next_status(), next, "next of {}", status);
        }
    }

    #[test]
    fn test_reject_status_only_at_decision_stages() {
        for status in RequestStatus::ALL {
            let reject = saved(5, status).reject_status();
            match status {
                RequestStatus::Submitted => assert_eq!(reject, Some(RequestStatus::Disapproved)),
                RequestStatus::Review => assert_eq!(reject, Some(RequestStatus::Declined)),
                _ => assert_eq!(reject, None, "reject of {}", status),
            }
        }
    }

    #[test]
    fn test_terminal_iff_no_successor() {
        for status in RequestStatus::ALL {
            let has_successor = status.next().is_some() || status.reject().is_some();
            assert_eq!(status.is_terminal(), !has_successor, "{}", status);
        }
    }

    #[test]
    fn test_drafts_have_no_transitions() {
        let draft = RequirementsRequest::draft(requester(), peo(), data());
        assert_eq!(draft.next_status(), None);
        assert_eq!(draft.reject_status(), None);
        assert!(draft.legal_targets().is_empty());
        assert!(!draft.is_read_only(&stranger(), &[]));
    }

    #[test]
    fn test_legal_targets() {
        assert_eq!(
            saved(5, RequestStatus::Submitted).legal_targets(),
            vec![
                RequestStatus::Approved,
                RequestStatus::Disapproved,
                RequestStatus::Cancelled
            ]
        );
        assert_eq!(
            saved(5, RequestStatus::Contract).legal_targets(),
            vec![RequestStatus::Closed, RequestStatus::Cancelled]
        );
        assert!(saved(5, RequestStatus::Closed).legal_targets().is_empty());
        assert!(!saved(5, RequestStatus::Closed).is_legal_target(RequestStatus::Contract));
    }

    #[test]
    fn test_terminal_requests_are_read_only_for_everyone() {
        let everyone = [RoleType::Admin, RoleType::Manager];
        for status in RequestStatus::ALL.into_iter().filter(RequestStatus::is_terminal) {
            let request = saved(5, status);
            for user in [requester(), peo(), stranger()] {
                assert!(request.is_read_only(&user, &everyone), "{} for {}", status, user.id);
                assert!(request.is_read_only(&user, &[]));
            }
        }
    }

    #[test]
    fn test_read_only_agrees_with_policy() {
        let submitted = saved(5, RequestStatus::Submitted);
        assert!(!submitted.is_read_only(&peo(), &[]));
        // The requester can still cancel
        assert!(!submitted.is_read_only(&requester(), &[]));
        assert!(submitted.is_read_only(&stranger(), &[RoleType::Manager]));

        let review = saved(5, RequestStatus::Review);
        assert!(!review.is_read_only(&stranger(), &[RoleType::Manager]));
        assert!(review.is_read_only(&peo(), &[]));

        for status in RequestStatus::ALL {
            let request = saved(5, status);
            for (user, roles) in [
                (requester(), vec![]),
                (peo(), vec![]),
                (stranger(), vec![RoleType::Manager]),
                (stranger(), vec![RoleType::Admin]),
                (stranger(), vec![]),
            ] {
                let can_act = request
                    .legal_targets()
                    .into_iter()
                    .any(|t| policy::user_can_change_status(&request, t, &user, &roles));
                assert_eq!(request.is_read_only(&user, &roles), !can_act);
            }
        }
    }

    #[test]
    fn test_with_transition_stamps_approval() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let request = saved(5, RequestStatus::Submitted);

        let approved = request.with_transition(RequestStatus::Approved, Some("  Looks good "), now);
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.peo_approved_date, Some(now));
        assert_eq!(approved.peo_approved_comment.as_deref(), Some("Looks good"));
        assert_eq!(approved.status_comment.as_deref(), Some("Looks good"));
        assert_eq!(approved.concurrency_token, request.concurrency_token);
        assert!(approved.check_invariants().is_ok());

        let disapproved = request.with_transition(RequestStatus::Disapproved, Some("No funding"), now);
        assert_eq!(disapproved.peo_approved_date, None);
        assert_eq!(disapproved.peo_approved_comment.as_deref(), Some("No funding"));
        assert!(disapproved.check_invariants().is_ok());

        let review = approved.with_transition(RequestStatus::Review, Some(""), now);
        assert_eq!(review.status_comment, None);
        assert_eq!(review.peo_approved_comment.as_deref(), Some("Looks good"));
        assert_eq!(review.peo_approved_date, Some(now));
    }
}
