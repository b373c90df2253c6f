use crate::config::PostgresConfig;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Row, Transaction};
use std::time::Instant;
use tinylink_core::{ItemBatch, LinkStore, OwnedLink, Result, Stats, StorageError};
use tracing::{debug, info, trace, warn};

/// Idempotent schema: the `short_urls` table and its unique original URL index.
pub const SCHEMA: &str = include_str!("../ddl/postgres/short_urls.sql");

const ORIGINAL_URL_INDEX: &str = "short_urls_original_url_idx";

/// Postgres implementation of the storage contract.
///
/// Rows are never hard-deleted: deletion flips `is_deleted`, and a deleted
/// row keeps both its alias and its original URL reserved. Batch writes and
/// batch deletes each run in a single transaction and either fully commit
/// or roll back.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a storage from an existing connection pool.
    ///
    /// The schema is expected to exist; see [`PostgresStorage::prepare_schema`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a bounded connection pool and prepares the schema.
    ///
    /// Fails fast when the server is unreachable.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let started = Instant::now();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.dsn)
            .await
            .map_err(map_sqlx_error)?;

        let storage = Self::new(pool);
        storage.prepare_schema(config.reset).await?;

        info!(
            elapsed = ?started.elapsed(),
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(storage)
    }

    /// Creates the table and index if missing.
    ///
    /// With `reset`, the table is dropped first and all stored links are lost.
    pub async fn prepare_schema(&self, reset: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        if reset {
            warn!("dropping short_urls table");
            let dropped = sqlx::query("DROP TABLE IF EXISTS short_urls")
                .execute(&mut *tx)
                .await;
            if let Err(err) = dropped {
                return Err(rollback(tx, map_sqlx_error(err)).await);
            }
        }

        let created = sqlx::raw_sql(SCHEMA).execute(&mut *tx).await;
        if let Err(err) = created {
            return Err(rollback(tx, map_sqlx_error(err)).await);
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn rollback(tx: Transaction<'_, Postgres>, err: StorageError) -> StorageError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "transaction rollback failed");
    }
    err
}

fn is_original_url_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && db.constraint() == Some(ORIGINAL_URL_INDEX)
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => {
            StorageError::Timeout(format!("connection pool exhausted: {message}"))
        }
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn to_count(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|e| StorageError::InvalidData(format!("invalid count '{}': {e}", value)))
}

#[async_trait]
impl LinkStore for PostgresStorage {
    async fn set(&self, items: &ItemBatch) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for (alias, item) in items {
            // The no-op update on alias conflict makes the statement return the
            // stored original URL instead of failing.
            let stored = sqlx::query_scalar::<_, String>(
                r#"
                INSERT INTO short_urls (original_url, alias, owner_id, is_deleted)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (alias)
                DO UPDATE SET alias = EXCLUDED.alias
                RETURNING original_url
                "#,
            )
            .bind(item.original_url.as_str())
            .bind(alias.as_str())
            .bind(item.owner_id.as_str())
            .bind(item.is_deleted)
            .fetch_one(&mut *tx)
            .await;

            match stored {
                Ok(original_url) if original_url == item.original_url => {}
                Ok(_) => {
                    debug!(alias = %alias, "alias already bound to another url");
                    return Err(rollback(tx, StorageError::AliasTaken(alias.clone())).await);
                }
                Err(err) if is_original_url_violation(&err) => {
                    debug!(alias = %alias, original_url = %item.original_url, "original url already stored");
                    let conflict = StorageError::AlreadyExists(item.original_url.clone());
                    return Err(rollback(tx, conflict).await);
                }
                Err(err) => return Err(rollback(tx, map_sqlx_error(err)).await),
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        trace!(count = items.len(), "stored batch in postgres");
        Ok(())
    }

    async fn get(&self, alias: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM short_urls
            WHERE alias = $1
            LIMIT 1
            "#,
        )
        .bind(alias)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(alias.to_owned()));
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StorageError::Gone(alias.to_owned()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn alias_for(&self, original_url: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT alias
            FROM short_urls
            WHERE original_url = $1
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::NotFound(original_url.to_owned()))
    }

    async fn batch_by_owner(&self, owner_id: &str) -> Result<Vec<OwnedLink>> {
        let rows = sqlx::query(
            r#"
            SELECT alias, original_url
            FROM short_urls
            WHERE owner_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(OwnedLink {
                    alias: row.try_get("alias").map_err(map_sqlx_error)?,
                    original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn delete_batch(&self, aliases: &[String], owner_id: &str) -> Result<()> {
        if aliases.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for alias in aliases {
            let result = sqlx::query(
                r#"
                UPDATE short_urls
                SET is_deleted = TRUE
                WHERE alias = $1
                  AND owner_id = $2
                "#,
            )
            .bind(alias.as_str())
            .bind(owner_id)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => {
                    debug!(alias = %alias, owner_id = %owner_id, "skipping delete of unknown or foreign alias");
                }
                Ok(_) => {}
                Err(err) => return Err(rollback(tx, map_sqlx_error(err)).await),
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn stats(&self) -> Result<Stats> {
        let urls: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM short_urls WHERE NOT is_deleted")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let owners: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT owner_id) FROM short_urls WHERE NOT is_deleted",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: to_count(urls)?,
            owners: to_count(owners)?,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
