//! Role policy: who may move a request from one status to another.
//!
//! Authorization is a lookup in [`TRANSITION_RULES`], keyed by the
//! `(current, target)` status pair. Each rule names the authorities allowed
//! to make that move. Authorities are derived fresh on every call from the
//! request (is the user its requester or approving PEO?) and the roles the
//! caller passes in. Pairs missing from the table are denied.
//!
//! ```text
//! Draft ──> Submitted ──> Approved ──> Review ──> Accepted ──> Contract ──> Closed
//!  (Requester)  │  (ApprovingPeo)  (Manager)  │  (Manager)  (Manager|Admin) (Manager|Admin)
//!               └──> Disapproved             └──> Declined
//!                    (ApprovingPeo)               (Manager)
//!
//! any non-terminal saved status ──> Cancelled   (Requester|Admin)
//! ```

use crate::domain::person::Person;
use crate::domain::request::{RequestStatus, RequirementsRequest};
use crate::roles::RoleType;

/// A capacity in which a user can act on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    /// The user who submitted the request.
    Requester,
    /// The official named on the request as its approver.
    ApprovingPeo,
    /// Holder of [`RoleType::Manager`].
    Manager,
    /// Holder of [`RoleType::Admin`].
    Admin,
}

/// One row of the transition authorization table.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub allowed: &'static [Authority],
}

const CANCELLERS: &[Authority] = &[Authority::Requester, Authority::Admin];
const BOARD: &[Authority] = &[Authority::Manager];
const CONTRACTING: &[Authority] = &[Authority::Manager, Authority::Admin];

/// Every authorized transition.
pub const TRANSITION_RULES: &[TransitionRule] = &[
    TransitionRule {
        from: RequestStatus::Draft,
        to: RequestStatus::Submitted,
        allowed: &[Authority::Requester],
    },
    TransitionRule {
        from: RequestStatus::Submitted,
        to: RequestStatus::Approved,
        allowed: &[Authority::ApprovingPeo],
    },
    TransitionRule {
        from: RequestStatus::Submitted,
        to: RequestStatus::Disapproved,
        allowed: &[Authority::ApprovingPeo],
    },
    TransitionRule {
        from: RequestStatus::Approved,
        to: RequestStatus::Review,
        allowed: BOARD,
    },
    TransitionRule {
        from: RequestStatus::Review,
        to: RequestStatus::Accepted,
        allowed: BOARD,
    },
    TransitionRule {
        from: RequestStatus::Review,
        to: RequestStatus::Declined,
        allowed: BOARD,
    },
    TransitionRule {
        from: RequestStatus::Accepted,
        to: RequestStatus::Contract,
        allowed: CONTRACTING,
    },
    TransitionRule {
        from: RequestStatus::Contract,
        to: RequestStatus::Closed,
        allowed: CONTRACTING,
    },
    TransitionRule {
        from: RequestStatus::Submitted,
        to: RequestStatus::Cancelled,
        allowed: CANCELLERS,
    },
    TransitionRule {
        from: RequestStatus::Approved,
        to: RequestStatus::Cancelled,
        allowed: CANCELLERS,
    },
    TransitionRule {
        from: RequestStatus::Review,
        to: RequestStatus::Cancelled,
        allowed: CANCELLERS,
    },
    TransitionRule {
        from: RequestStatus::Accepted,
        to: RequestStatus::Cancelled,
        allowed: CANCELLERS,
    },
    TransitionRule {
        from: RequestStatus::Contract,
        to: RequestStatus::Cancelled,
        allowed: CANCELLERS,
    },
];

/// Who may attach notes to a saved request.
const NOTE_AUTHORS: &[Authority] = &[
    Authority::Requester,
    Authority::ApprovingPeo,
    Authority::Manager,
    Authority::Admin,
];

/// Who may remove a request from the store.
const REMOVERS: &[Authority] = &[Authority::Admin];

/// Look up the table row for a status pair.
pub fn rule_for(from: RequestStatus, to: RequestStatus) -> Option<&'static TransitionRule> {
    TRANSITION_RULES
        .iter()
        .find(|rule| rule.from == from && rule.to == to)
}

/// The authorities `user` holds with respect to `request`.
pub fn authorities(request: &RequirementsRequest, user: &Person, roles: &[RoleType]) -> Vec<Authority> {
    let mut held = Vec::with_capacity(4);
    if request.requester.is_same_person(user) {
        held.push(Authority::Requester);
    }
    if request.approving_peo.is_same_person(user) {
        held.push(Authority::ApprovingPeo);
    }
    if roles.contains(&RoleType::Manager) {
        held.push(Authority::Manager);
    }
    if roles.contains(&RoleType::Admin) {
        held.push(Authority::Admin);
    }
    held
}

fn any_allowed(allowed: &[Authority], held: &[Authority]) -> bool {
    held.iter().any(|authority| allowed.contains(authority))
}

/// Can `user`, holding `roles`, move `request` from its current status to `target`?
///
/// This only answers the authorization question; whether `target` is a
/// legal successor is the entity's concern. Returns `false` for any pair
/// the table does not list.
pub fn user_can_change_status(
    request: &RequirementsRequest,
    target: RequestStatus,
    user: &Person,
    roles: &[RoleType],
) -> bool {
    let Some(rule) = rule_for(request.status, target) else {
        return false;
    };
    any_allowed(rule.allowed, &authorities(request, user, roles))
}

/// Can `user` attach a note to `request`?
pub fn user_can_add_note(request: &RequirementsRequest, user: &Person, roles: &[RoleType]) -> bool {
    !request.is_draft() && any_allowed(NOTE_AUTHORS, &authorities(request, user, roles))
}

/// Can `user` remove `request` from the store?
pub fn user_can_remove(request: &RequirementsRequest, user: &Person, roles: &[RoleType]) -> bool {
    !request.is_draft() && any_allowed(REMOVERS, &authorities(request, user, roles))
}
