//! Read/write pool routing for the PostgreSQL repository.
//!
//! Lookups (`fetch_by_id`, `fetch_all`, `fetch_notes`) go through
//! [`PoolProvider::read`], which may point at a replica. Writes and the
//! conflict check that follows a rejected update go through
//! [`PoolProvider::write`], so they always see the primary's latest etag.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Provides connection pools for read and write operations.
///
/// # Example
///
/// ```ignore
/// use reqtrack::repository::postgres::PoolProvider;
/// use sqlx::PgPool;
///
/// #[derive(Clone)]
/// struct Pools {
///     primary: PgPool,
///     replica: Option<PgPool>,
/// }
///
/// impl PoolProvider for Pools {
///     fn read(&self) -> &PgPool {
///         self.replica.as_ref().unwrap_or(&self.primary)
///     }
///
///     fn write(&self) -> &PgPool {
///         &self.primary
///     }
/// }
/// ```
pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for queries that tolerate slight staleness.
    fn read(&self) -> &PgPool;

    /// Pool for writes and reads that must observe the latest write.
    fn write(&self) -> &PgPool;
}

impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// Test pools whose read side rejects writes.
///
/// The replica pool runs with `default_transaction_read_only = on`, so a
/// write routed through [`PoolProvider::read`] fails loudly in tests.
#[derive(Clone, Debug)]
pub struct TestDbPools {
    primary: PgPool,
    replica: PgPool,
}

impl TestDbPools {
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        let primary = pool.clone();

        let replica = PgPoolOptions::new()
            .max_connections(pool.options().get_max_connections())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET default_transaction_read_only = on")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(pool.connect_options().as_ref().clone())
            .await?;

        Ok(Self { primary, replica })
    }
}

impl PoolProvider for TestDbPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
