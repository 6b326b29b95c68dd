//! Request record and the closed set of statuses it can occupy.
//!
//! Requests are loaded from storage in any status, so the status is a field
//! of [`RequirementsRequest`] rather than a type parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::person::Person;

/// Unique identifier for a request. `0` marks an unsaved draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    /// The id carried by a request that has never been persisted.
    pub const UNSAVED: RequestId = RequestId(0);

    pub fn is_unsaved(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId(id)
    }
}

/// Opaque version stamp issued by the store.
///
/// Only ever compared for equality. Required on every update, absent on create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(value: impl Into<String>) -> Self {
        ConcurrencyToken(value.into())
    }

    /// A new, globally unique token.
    pub fn fresh() -> Self {
        ConcurrencyToken(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConcurrencyToken {
    fn from(uuid: Uuid) -> Self {
        ConcurrencyToken(uuid.to_string())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Where a request is in the approval pipeline.
///
/// The serialized tokens are part of the persisted format and appear in
/// email text; do not rename them without a data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Not yet submitted. Only ever held by unsaved requests.
    Draft,
    Submitted,
    Approved,
    Disapproved,
    /// Under board review.
    Review,
    Accepted,
    Declined,
    Contract,
    Closed,
    Cancelled,
}

impl RequestStatus {
    /// Every status, in pipeline order.
    pub const ALL: [RequestStatus; 10] = [
        RequestStatus::Draft,
        RequestStatus::Submitted,
        RequestStatus::Approved,
        RequestStatus::Disapproved,
        RequestStatus::Review,
        RequestStatus::Accepted,
        RequestStatus::Declined,
        RequestStatus::Contract,
        RequestStatus::Closed,
        RequestStatus::Cancelled,
    ];

    /// The persisted string token.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "Draft",
            RequestStatus::Submitted => "Submitted",
            RequestStatus::Approved => "Approved",
            RequestStatus::Disapproved => "Disapproved",
            RequestStatus::Review => "Review",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Declined => "Declined",
            RequestStatus::Contract => "Contract",
            RequestStatus::Closed => "Closed",
            RequestStatus::Cancelled => "Cancelled",
        }
    }

    /// No forward, reject or cancel transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Closed
                | RequestStatus::Cancelled
                | RequestStatus::Disapproved
                | RequestStatus::Declined
        )
    }

    /// True for the negative outcomes of a pipeline stage.
    pub fn is_reject(&self) -> bool {
        matches!(self, RequestStatus::Disapproved | RequestStatus::Declined)
    }

    /// Entering this status requires a rationale from the actor.
    pub fn requires_comment(&self) -> bool {
        self.is_reject() || *self == RequestStatus::Cancelled
    }

    /// True once the approving PEO has signed off.
    ///
    /// `None` for `Cancelled`, which can be reached from either side of the
    /// approval gate.
    pub fn is_past_peo_approval(&self) -> Option<bool> {
        match self {
            RequestStatus::Draft | RequestStatus::Submitted | RequestStatus::Disapproved => {
                Some(false)
            }
            RequestStatus::Approved
            | RequestStatus::Review
            | RequestStatus::Accepted
            | RequestStatus::Declined
            | RequestStatus::Contract
            | RequestStatus::Closed => Some(true),
            RequestStatus::Cancelled => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown request status '{}'", s))
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementType {
    #[serde(rename = "New Capability")]
    NewCapability,
    #[serde(rename = "Modify Existing Capability")]
    ModifyExistingCapability,
}

/// The application a requirement targets. `Other` is paired with
/// [`RequestData::other_application_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationType {
    #[serde(rename = "CCaR")]
    Ccar,
    #[serde(rename = "Other")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgPriority {
    /// Essential to deliver
    High,
    /// Functional capability enhancements
    Medium,
    /// Desire to have, worth implementing
    Low,
}

/// Centers whose organizations a requirement can impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Center {
    Afimsc,
    Aflcmc,
    Afnwc,
    Afrl,
    Afsc,
    Aftc,
}

// ============================================================================
// Request record
// ============================================================================

/// Form-owned contents of a request.
///
/// None of these fields influence the state machine; the surrounding form
/// validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub title: String,
    pub request_date: DateTime<Utc>,
    /// When the store received the submission
    pub received_date: DateTime<Utc>,
    pub requester_org_symbol: String,
    pub requester_dsn_phone: String,
    pub requester_comm_phone: String,
    pub peo_org_symbol: String,
    pub peo_dsn_phone: String,
    pub peo_comm_phone: String,
    pub requirement_type: RequirementType,
    /// Set when the requirement is already funded
    pub funding_org_or_peo: Option<String>,
    pub application_needed: ApplicationType,
    pub other_application_needed: Option<String>,
    pub is_projected_orgs_enterprise: bool,
    pub projected_orgs_impacted_center: Center,
    pub projected_orgs_impacted_org: String,
    pub projected_impacted_users: u32,
    pub operational_need_date: DateTime<Utc>,
    pub org_priority: OrgPriority,
    pub priority_explanation: String,
    pub business_objective: String,
    pub functional_requirements: String,
    pub benefits: String,
    pub risk: String,
    pub additional_info: String,
}

impl RequestData {
    /// Human readable name of the application needed, resolving `Other`.
    pub fn application_name(&self) -> &str {
        match self.application_needed {
            ApplicationType::Ccar => "CCaR",
            ApplicationType::Other => self.other_application_needed.as_deref().unwrap_or("Other"),
        }
    }
}

/// A requirements request moving through the approval pipeline.
///
/// Fields governed by the lifecycle engine live here; everything the form
/// owns lives in [`RequestData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsRequest {
    pub id: RequestId,
    /// Version stamp last read from the store; `None` until first persisted.
    pub concurrency_token: Option<ConcurrencyToken>,
    pub status: RequestStatus,
    pub requester: Person,
    pub approving_peo: Person,
    /// `None` until the approving PEO approves.
    pub peo_approved_date: Option<DateTime<Utc>>,
    /// Comment left by the PEO with the approval decision.
    pub peo_approved_comment: Option<String>,
    /// Rationale supplied with the most recent transition.
    pub status_comment: Option<String>,
    pub data: RequestData,
}

impl RequirementsRequest {
    /// Create an unsaved draft.
    pub fn draft(requester: Person, approving_peo: Person, data: RequestData) -> Self {
        Self {
            id: RequestId::UNSAVED,
            concurrency_token: None,
            status: RequestStatus::Draft,
            requester,
            approving_peo,
            peo_approved_date: None,
            peo_approved_comment: None,
            status_comment: None,
            data,
        }
    }

    /// True for requests that have never been persisted.
    pub fn is_draft(&self) -> bool {
        self.id.is_unsaved()
    }

    /// Display identifier, zero padded. Carries no business meaning.
    pub fn formatted_id(&self) -> String {
        format!("{:04}", self.id.0)
    }

    /// Check the structural invariants tying id, status and approval date together.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.is_draft() != (self.status == RequestStatus::Draft) {
            return Err(format!(
                "request {} has status '{}' but is {}",
                self.id,
                self.status,
                if self.is_draft() { "unsaved" } else { "saved" }
            ));
        }
        if let Some(past_approval) = self.status.is_past_peo_approval()
            && past_approval != self.peo_approved_date.is_some()
        {
            return Err(format!(
                "request {} in status '{}' {} an approval date",
                self.id,
                self.status,
                if past_approval { "is missing" } else { "must not have" }
            ));
        }
        Ok(())
    }

    /// True if `other` agrees with this request on everything but the form
    /// contents and the concurrency token.
    pub fn same_lifecycle(&self, other: &RequirementsRequest) -> bool {
        self.id == other.id
            && self.status == other.status
            && self.requester == other.requester
            && self.approving_peo == other.approving_peo
            && self.peo_approved_date == other.peo_approved_date
            && self.peo_approved_comment == other.peo_approved_comment
            && self.status_comment == other.status_comment
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;

    pub fn requester() -> Person {
        Person::new(1, "Jeremy Clark", "jeremyclark@example.com")
    }

    pub fn peo() -> Person {
        Person::new(2, "Robert Porterfield", "robertporterfield@example.com")
    }

    pub fn data() -> RequestData {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        RequestData {
            title: "Test1".to_string(),
            request_date: date,
            received_date: date,
            requester_org_symbol: "OZIC".to_string(),
            requester_dsn_phone: "1234567890".to_string(),
            requester_comm_phone: "1234567890".to_string(),
            peo_org_symbol: "OZI".to_string(),
            peo_dsn_phone: "1234567890".to_string(),
            peo_comm_phone: "1234567890".to_string(),
            requirement_type: RequirementType::NewCapability,
            funding_org_or_peo: None,
            application_needed: ApplicationType::Ccar,
            other_application_needed: None,
            is_projected_orgs_enterprise: false,
            projected_orgs_impacted_center: Center::Afimsc,
            projected_orgs_impacted_org: "OZIC".to_string(),
            projected_impacted_users: 12,
            operational_need_date: date,
            org_priority: OrgPriority::Medium,
            priority_explanation: "Low is too low and high is too high.".to_string(),
            business_objective: "We want a thing to do the thing.".to_string(),
            functional_requirements: "It has to do the thing.".to_string(),
            benefits: "It will do the thing so that we don't have to.".to_string(),
            risk: "We will forget how to do the thing.".to_string(),
            additional_info: String::new(),
        }
    }

    /// A saved request in the given status, with an approval date when the
    /// status requires one.
    pub fn saved(id: i64, status: RequestStatus) -> RequirementsRequest {
        let mut request = RequirementsRequest::draft(requester(), peo(), data());
        request.id = RequestId(id);
        request.status = status;
        request.concurrency_token = Some(ConcurrencyToken::new(format!("etag-{}", id)));
        if status.is_past_peo_approval() == Some(true) {
            request.peo_approved_date = Some(request.data.request_date);
        }
        request
    }
}
