//! Repository contracts consumed by the lifecycle engine.
//!
//! This module defines the `RequestRepository` and `NoteRepository` traits.
//! The engine calls only these operations and assumes nothing about the
//! backing store beyond the concurrency contract documented on
//! [`RequestRepository::upsert`].

use async_trait::async_trait;

use crate::domain::request::{RequestId, RequirementsRequest};
use crate::domain::{NewNote, Note};
use crate::error::Result;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryRepository;

/// Storage for requirements requests.
///
/// Implementations own any retry policy; the engine surfaces their failures
/// unchanged.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Fetch a request by id. Removed requests are reported as absent.
    async fn fetch_by_id(&self, id: RequestId) -> Result<Option<RequirementsRequest>>;

    /// Fetch every request that has not been removed, ordered by id.
    async fn fetch_all(&self) -> Result<Vec<RequirementsRequest>>;

    /// Create or update a request and return the stored version.
    ///
    /// - Unsaved requests (`id == 0`) are created with a fresh id and token.
    /// - Saved requests are updated only if `concurrency_token` equals the
    ///   stored token; a missing or stale token fails with
    ///   [`crate::ReqtrackError::ConcurrencyConflict`] and nothing is written.
    /// - Unknown or removed ids fail with [`crate::ReqtrackError::RequestNotFound`].
    ///
    /// The returned request carries a new token.
    async fn upsert(&self, request: &RequirementsRequest) -> Result<RequirementsRequest>;

    /// Soft-delete a request. Removing an absent request is not an error.
    async fn remove(&self, request: &RequirementsRequest) -> Result<()>;
}

/// Storage for notes attached to requests.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Store a note and return it with its assigned id.
    async fn add_note(&self, note: NewNote) -> Result<Note>;

    /// All notes for a request, oldest first.
    async fn fetch_notes(&self, request_id: RequestId) -> Result<Vec<Note>>;
}
