//! People referenced by requests.

use serde::{Deserialize, Serialize};

/// Identifier of a user in the external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub i64);

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PersonId {
    fn from(id: i64) -> Self {
        PersonId(id)
    }
}

/// A reference to a person: identity plus a display snapshot taken when the
/// reference was recorded. It is not kept in sync with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub display_name: String,
    pub email: String,
}

impl Person {
    pub fn new(id: i64, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: PersonId(id),
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    /// True if both references point at the same identity.
    pub fn is_same_person(&self, other: &Person) -> bool {
        self.id == other.id
    }
}
