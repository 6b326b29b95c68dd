//! PostgreSQL implementation of the repository contracts.
//!
//! Each row carries an `etag` UUID that is rotated on every write. Updates
//! are conditional on the etag the caller last read:
//!
//! ```sql
//! UPDATE requirements_requests SET ... WHERE id = $1 AND etag = $2 AND deleted_at IS NULL
//! ```
//!
//! When that matches no row, a follow-up lookup on the primary tells a stale
//! token apart from a missing request. Removal sets `deleted_at`.
//!
//! # Example
//! ```ignore
//! use reqtrack::repository::postgres::PostgresRepository;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgresql://localhost/reqtrack").await?;
//! reqtrack::migrator().run(&pool).await?;
//! let repository = Arc::new(PostgresRepository::new(pool));
//! ```

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{NoteRepository, RequestRepository};
use crate::domain::person::Person;
use crate::domain::request::{
    ConcurrencyToken, RequestData, RequestId, RequestStatus, RequirementsRequest,
};
use crate::domain::{NewNote, Note, NoteId};
use crate::error::{ReqtrackError, Result};

mod pool_provider;

pub use pool_provider::{PoolProvider, TestDbPools};

const REQUEST_COLUMNS: &str = "id, etag, status, requester, approving_peo, peo_approved_date, \
     peo_approved_comment, status_comment, data";

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    etag: Uuid,
    status: String,
    requester: Json<Person>,
    approving_peo: Json<Person>,
    peo_approved_date: Option<DateTime<Utc>>,
    peo_approved_comment: Option<String>,
    status_comment: Option<String>,
    data: Json<RequestData>,
}

impl TryFrom<RequestRow> for RequirementsRequest {
    type Error = ReqtrackError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(RequirementsRequest {
            id: RequestId(row.id),
            concurrency_token: Some(row.etag.into()),
            status: row.status.parse::<RequestStatus>()?,
            requester: row.requester.0,
            approving_peo: row.approving_peo.0,
            peo_approved_date: row.peo_approved_date,
            peo_approved_comment: row.peo_approved_comment,
            status_comment: row.status_comment,
            data: row.data.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: i64,
    request_id: i64,
    title: String,
    text: String,
    author: Json<Person>,
    created_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Note {
            id: NoteId(row.id),
            request_id: RequestId(row.request_id),
            title: row.title,
            text: row.text,
            author: row.author.0,
            created_at: row.created_at,
        }
    }
}

fn store_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> ReqtrackError {
    move |e| ReqtrackError::StoreUnavailable(anyhow!("{}: {}", context, e))
}

/// Repository backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresRepository<P: PoolProvider = sqlx::PgPool> {
    pools: P,
}

impl<P: PoolProvider> PostgresRepository<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    /// The current etag of a live request, read from the primary.
    async fn current_etag(&self, id: RequestId) -> Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT etag FROM requirements_requests WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.0)
        .fetch_optional(self.pools.write())
        .await
        .map_err(store_error("Failed to read etag"))
    }

    async fn create(&self, request: &RequirementsRequest) -> Result<RequirementsRequest> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            INSERT INTO requirements_requests (
                etag, status, requester, approving_peo, peo_approved_date,
                peo_approved_comment, status_comment, data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.status.as_str())
        .bind(Json(&request.requester))
        .bind(Json(&request.approving_peo))
        .bind(request.peo_approved_date)
        .bind(request.peo_approved_comment.as_deref())
        .bind(request.status_comment.as_deref())
        .bind(Json(&request.data))
        .fetch_one(self.pools.write())
        .await
        .map_err(store_error("Failed to create request"))?;

        let created = RequirementsRequest::try_from(row)?;
        tracing::debug!(request_id = %created.id, "Created request");
        Ok(created)
    }

    async fn update(&self, request: &RequirementsRequest) -> Result<RequirementsRequest> {
        // A token that is not one of our UUIDs can never match
        let supplied = request
            .concurrency_token
            .as_ref()
            .and_then(|token| Uuid::parse_str(token.as_str()).ok());

        let row = match supplied {
            Some(etag) => sqlx::query_as::<_, RequestRow>(&format!(
                r#"
                UPDATE requirements_requests SET
                    etag = $3,
                    status = $4,
                    requester = $5,
                    approving_peo = $6,
                    peo_approved_date = $7,
                    peo_approved_comment = $8,
                    status_comment = $9,
                    data = $10,
                    updated_at = now()
                WHERE id = $1 AND etag = $2 AND deleted_at IS NULL
                RETURNING {REQUEST_COLUMNS}
                "#
            ))
            .bind(request.id.0)
            .bind(etag)
            .bind(Uuid::new_v4())
            .bind(request.status.as_str())
            .bind(Json(&request.requester))
            .bind(Json(&request.approving_peo))
            .bind(request.peo_approved_date)
            .bind(request.peo_approved_comment.as_deref())
            .bind(request.status_comment.as_deref())
            .bind(Json(&request.data))
            .fetch_optional(self.pools.write())
            .await
            .map_err(store_error("Failed to update request"))?,
            None => None,
        };

        if let Some(row) = row {
            return RequirementsRequest::try_from(row);
        }

        match self.current_etag(request.id).await? {
            None => Err(ReqtrackError::RequestNotFound(request.id)),
            Some(current) => {
                tracing::debug!(request_id = %request.id, "Rejected update with stale token");
                Err(ReqtrackError::ConcurrencyConflict {
                    request_id: request.id,
                    supplied: request.concurrency_token.clone(),
                    current: ConcurrencyToken::from(current),
                })
            }
        }
    }
}

#[async_trait]
impl<P: PoolProvider> RequestRepository for PostgresRepository<P> {
    async fn fetch_by_id(&self, id: RequestId) -> Result<Option<RequirementsRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requirements_requests WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.0)
        .fetch_optional(self.pools.read())
        .await
        .map_err(store_error("Failed to fetch request"))?;

        row.map(RequirementsRequest::try_from).transpose()
    }

    async fn fetch_all(&self) -> Result<Vec<RequirementsRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requirements_requests WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(self.pools.read())
        .await
        .map_err(store_error("Failed to fetch requests"))?;

        rows.into_iter().map(RequirementsRequest::try_from).collect()
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, status = %request.status))]
    async fn upsert(&self, request: &RequirementsRequest) -> Result<RequirementsRequest> {
        if request.id.is_unsaved() {
            self.create(request).await
        } else {
            self.update(request).await
        }
    }

    async fn remove(&self, request: &RequirementsRequest) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE requirements_requests SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(request.id.0)
        .execute(self.pools.write())
        .await
        .map_err(store_error("Failed to remove request"))?
        .rows_affected();

        tracing::debug!(request_id = %request.id, rows_affected, "Removed request");
        Ok(())
    }
}

#[async_trait]
impl<P: PoolProvider> NoteRepository for PostgresRepository<P> {
    async fn add_note(&self, note: NewNote) -> Result<Note> {
        let row = sqlx::query_as::<_, NoteRow>(
            r#"
            INSERT INTO request_notes (request_id, title, text, author)
            VALUES ($1, $2, $3, $4)
            RETURNING id, request_id, title, text, author, created_at
            "#,
        )
        .bind(note.request_id.0)
        .bind(&note.title)
        .bind(&note.text)
        .bind(Json(&note.author))
        .fetch_one(self.pools.write())
        .await
        .map_err(store_error("Failed to add note"))?;

        Ok(row.into())
    }

    async fn fetch_notes(&self, request_id: RequestId) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT id, request_id, title, text, author, created_at
            FROM request_notes
            WHERE request_id = $1
            ORDER BY id
            "#,
        )
        .bind(request_id.0)
        .fetch_all(self.pools.read())
        .await
        .map_err(store_error("Failed to fetch notes"))?;

        Ok(rows.into_iter().map(Note::from).collect())
    }
}
