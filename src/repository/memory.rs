//! In-memory implementation of the repository contracts.
//!
//! Useful for tests and single-process deployments. Besides honouring the
//! concurrency contract it records how often each operation was called and
//! can be told to fail the next write, so callers can verify what reached
//! the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{NoteRepository, RequestRepository};
use crate::domain::request::{ConcurrencyToken, RequestId, RequestStatus, RequirementsRequest};
use crate::domain::{NewNote, Note, NoteId};
use crate::error::{ReqtrackError, Result};

#[derive(Debug, Clone)]
struct StoredRequest {
    request: RequirementsRequest,
    removed: bool,
}

#[derive(Default)]
struct Tables {
    requests: BTreeMap<RequestId, StoredRequest>,
    notes: Vec<Note>,
    last_request_id: i64,
    last_note_id: i64,
}

/// Repository backed by process memory.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
    upsert_calls: Arc<AtomicUsize>,
    fail_next_write: Arc<AtomicBool>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an already-saved request, bypassing the token check.
    ///
    /// The request keeps its id; a token is issued if it has none.
    pub fn insert(&self, mut request: RequirementsRequest) -> RequirementsRequest {
        let mut tables = self.tables.lock();
        if request.id.is_unsaved() {
            tables.last_request_id += 1;
            request.id = RequestId(tables.last_request_id);
            if request.status == RequestStatus::Draft {
                request.status = RequestStatus::Submitted;
            }
        }
        tables.last_request_id = tables.last_request_id.max(request.id.0);
        if request.concurrency_token.is_none() {
            request.concurrency_token = Some(ConcurrencyToken::fresh());
        }
        tables.requests.insert(
            request.id,
            StoredRequest {
                request: request.clone(),
                removed: false,
            },
        );
        request
    }

    /// Number of `upsert` calls received, successful or not.
    pub fn upsert_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Make the next `upsert` fail as if the store were unreachable.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn fetch_by_id(&self, id: RequestId) -> Result<Option<RequirementsRequest>> {
        let tables = self.tables.lock();
        Ok(tables
            .requests
            .get(&id)
            .filter(|stored| !stored.removed)
            .map(|stored| stored.request.clone()))
    }

    async fn fetch_all(&self) -> Result<Vec<RequirementsRequest>> {
        let tables = self.tables.lock();
        Ok(tables
            .requests
            .values()
            .filter(|stored| !stored.removed)
            .map(|stored| stored.request.clone())
            .collect())
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, status = %request.status))]
    async fn upsert(&self, request: &RequirementsRequest) -> Result<RequirementsRequest> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(ReqtrackError::StoreUnavailable(anyhow::anyhow!(
                "in-memory store configured to fail"
            )));
        }

        let mut tables = self.tables.lock();

        if request.id.is_unsaved() {
            tables.last_request_id += 1;
            let mut created = request.clone();
            created.id = RequestId(tables.last_request_id);
            created.concurrency_token = Some(ConcurrencyToken::fresh());
            tables.requests.insert(
                created.id,
                StoredRequest {
                    request: created.clone(),
                    removed: false,
                },
            );
            tracing::debug!(request_id = %created.id, "Created request");
            return Ok(created);
        }

        let stored = match tables.requests.get_mut(&request.id) {
            Some(stored) if !stored.removed => stored,
            _ => return Err(ReqtrackError::RequestNotFound(request.id)),
        };

        let current = stored
            .request
            .concurrency_token
            .clone()
            .unwrap_or_else(ConcurrencyToken::fresh);
        if request.concurrency_token.as_ref() != Some(&current) {
            tracing::debug!(request_id = %request.id, "Rejected update with stale token");
            return Err(ReqtrackError::ConcurrencyConflict {
                request_id: request.id,
                supplied: request.concurrency_token.clone(),
                current,
            });
        }

        let mut updated = request.clone();
        updated.concurrency_token = Some(ConcurrencyToken::fresh());
        stored.request = updated.clone();
        Ok(updated)
    }

    async fn remove(&self, request: &RequirementsRequest) -> Result<()> {
        let mut tables = self.tables.lock();
        if let Some(stored) = tables.requests.get_mut(&request.id) {
            stored.removed = true;
        }
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for InMemoryRepository {
    async fn add_note(&self, note: NewNote) -> Result<Note> {
        let mut tables = self.tables.lock();
        tables.last_note_id += 1;
        let note = Note {
            id: NoteId(tables.last_note_id),
            request_id: note.request_id,
            title: note.title,
            text: note.text,
            author: note.author,
            created_at: chrono::Utc::now(),
        };
        tables.notes.push(note.clone());
        Ok(note)
    }

    async fn fetch_notes(&self, request_id: RequestId) -> Result<Vec<Note>> {
        let tables = self.tables.lock();
        Ok(tables
            .notes
            .iter()
            .filter(|note| note.request_id == request_id)
            .cloned()
            .collect())
    }
}
