//! Roles held by users and the directory that answers "who holds role X".
//!
//! Role assignments belong to an external identity provider. The engine
//! receives the acting user's roles with every call ([`Actor`]) and asks a
//! [`RoleDirectory`] for role holders when it needs recipients; neither is
//! cached between calls.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::person::{Person, PersonId};
use crate::error::Result;

/// A role granted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleType {
    Admin,
    Manager,
}

/// The user performing an operation, with the roles they hold right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user: Person,
    pub roles: Vec<RoleType>,
}

impl Actor {
    pub fn new(user: Person, roles: Vec<RoleType>) -> Self {
        Self { user, roles }
    }

    pub fn id(&self) -> PersonId {
        self.user.id
    }

    pub fn has_role(&self, role: RoleType) -> bool {
        self.roles.contains(&role)
    }
}

/// The roles assigned to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user: Person,
    pub roles: Vec<RoleType>,
}

/// Read access to current role assignments.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// All current assignments.
    async fn assignments(&self) -> Result<Vec<RoleAssignment>>;

    /// Users currently holding `role`.
    async fn users_with_role(&self, role: RoleType) -> Result<Vec<Person>> {
        Ok(self
            .assignments()
            .await?
            .into_iter()
            .filter(|assignment| assignment.roles.contains(&role))
            .map(|assignment| assignment.user)
            .collect())
    }
}

/// Role directory backed by process memory.
///
/// Assignments can be changed at any time; readers always see the latest set.
#[derive(Clone, Default)]
pub struct InMemoryRoleDirectory {
    assignments: Arc<RwLock<Vec<RoleAssignment>>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `user`.
    pub fn grant(&self, user: Person, role: RoleType) {
        let mut assignments = self.assignments.write();
        match assignments.iter_mut().find(|a| a.user.id == user.id) {
            Some(existing) => {
                if !existing.roles.contains(&role) {
                    existing.roles.push(role);
                }
            }
            None => assignments.push(RoleAssignment {
                user,
                roles: vec![role],
            }),
        }
    }

    /// Revoke `role` from the user with `user_id`. Revoking an absent role is a no-op.
    pub fn revoke(&self, user_id: PersonId, role: RoleType) {
        let mut assignments = self.assignments.write();
        for assignment in assignments.iter_mut().filter(|a| a.user.id == user_id) {
            assignment.roles.retain(|r| *r != role);
        }
        assignments.retain(|a| !a.roles.is_empty());
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn assignments(&self) -> Result<Vec<RoleAssignment>> {
        Ok(self.assignments.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_users_with_role_reflects_latest_assignments() {
        let directory = InMemoryRoleDirectory::new();
        let alice = Person::new(10, "Alice", "alice@example.com");
        let bob = Person::new(11, "Bob", "bob@example.com");

        directory.grant(alice.clone(), RoleType::Manager);
        directory.grant(bob.clone(), RoleType::Admin);
        directory.grant(alice.clone(), RoleType::Manager);

        let managers = directory.users_with_role(RoleType::Manager).await.unwrap();
        assert_eq!(managers, vec![alice.clone()]);

        directory.grant(bob.clone(), RoleType::Manager);
        directory.revoke(alice.id, RoleType::Manager);

        let managers = directory.users_with_role(RoleType::Manager).await.unwrap();
        assert_eq!(managers, vec![bob.clone()]);
        assert_eq!(directory.assignments().await.unwrap().len(), 1);
    }

    #[test]
    fn test_actor_roles() {
        let actor = Actor::new(Person::new(5, "Eve", "eve@example.com"), vec![RoleType::Admin]);
        assert!(actor.has_role(RoleType::Admin));
        assert!(!actor.has_role(RoleType::Manager));
        assert_eq!(actor.id(), PersonId(5));
    }
}
