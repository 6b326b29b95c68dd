//! Lifecycle engine for requirements requests.
//!
//! A request moves through a fixed approval pipeline (submitted, approved by
//! its PEO, reviewed by the board, put on contract, closed) with reject and
//! cancel exits along the way. This crate provides the status state
//! machine, the role policy deciding who may make each move, the
//! optimistic-concurrency contract for persisting requests, and the
//! notification contract for telling people about it.
//!
//! [`RequestService`] ties these together: it validates a requested change
//! locally, checks it against the policy, persists it through a
//! [`RequestRepository`] and then notifies through a [`Notifier`]. Storage is
//! in memory by default, or PostgreSQL with the `postgres` feature.

pub mod domain;
pub mod error;
pub mod mail;
pub mod notify;
pub mod policy;
pub mod repository;
pub mod roles;
pub mod service;

// Re-export commonly used types
pub use domain::request::{
    ConcurrencyToken, RequestData, RequestId, RequestStatus, RequirementsRequest,
};
pub use domain::{NewNote, Note, NoteId, Person, PersonId};
pub use error::{Action, ReqtrackError, Result, ValidationFailure};
pub use mail::{EmailMessage, Mailer, MailerConfig, MockMailer, ReqwestMailer};
pub use notify::{EmailNotifier, NotificationKind, Notifier, RecordingNotifier};
pub use repository::{InMemoryRepository, NoteRepository, RequestRepository};
#[cfg(feature = "postgres")]
pub use repository::postgres::{PoolProvider, PostgresRepository, TestDbPools};
pub use roles::{Actor, InMemoryRoleDirectory, RoleDirectory, RoleType};
pub use service::{RequestService, ServiceConfig};

/// Get the reqtrack database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
