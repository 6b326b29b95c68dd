//! Notes attached to requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::person::Person;
use super::request::RequestId;

/// Unique identifier for a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note as submitted, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub request_id: RequestId,
    pub title: String,
    pub text: String,
    pub author: Person,
}

/// A note stored against a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub request_id: RequestId,
    pub title: String,
    pub text: String,
    pub author: Person,
    pub created_at: DateTime<Utc>,
}
