use crate::store::{BackendError, KvBackend, StoreSettings};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// PostgreSQL-backed key-value store.
///
/// Entries live in `kv_entries`, partitioned by the database index so that
/// production and test data never collide.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    db: i16,
}

impl PgBackend {
    /// Creates the pool without connecting; the first query (usually the
    /// `connect` probe) opens the connection.
    pub fn new(settings: &StoreSettings) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(settings.timeout)
            .connect_lazy(&settings.endpoint)?;

        Ok(Self {
            pool,
            db: settings.db,
        })
    }

    /// Creates the entries table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), BackendError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                db SMALLINT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ,
                PRIMARY KEY (db, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS kv_entries_expires_at_idx ON kv_entries (db, expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Deletes expired entries of this database index. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, BackendError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE db = $1 AND expires_at <= now()")
            .bind(self.db)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KvBackend for PgBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT value FROM kv_entries
            WHERE db = $1 AND key = $2
              AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(self.db)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), BackendError> {
        let expires_at: Option<DateTime<Utc>> = ttl
            .and_then(|ttl| TimeDelta::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        sqlx::query(
            r#"
            INSERT INTO kv_entries (db, key, value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (db, key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(self.db)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        // Expired rows are never read again; reclaim them on the write path.
        let purged = self.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(db = self.db, purged, "Purged expired store entries");
        }
        Ok(())
    }
}

/// Connectivity and pool exhaustion are transient; everything else is permanent.
fn classify(err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendError::Transient(err.to_string()),
        other => BackendError::Permanent(other.to_string()),
    }
}
