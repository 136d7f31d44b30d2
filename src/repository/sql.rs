//! SQLite-backed repository.
//!
//! Connection handling follows the crate's database conventions:
//! `SqliteConnectOptions` with `create_if_missing`, WAL journaling and
//! normal synchronous mode, a `SqlitePoolOptions` pool, and runtime
//! `sqlx::query(...).bind(...)` statements with explicit transactions
//! around multi-statement writes.

use super::query::{compile, BindValue, UriQuery};
use super::{key_as_text, Repository};
use crate::config::DbConfig;
use crate::error::{AppError, Result};
use crate::indication::Indication;
use crate::uri::ResourceUri;
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::QueryBuilder;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

/// Repository over a SQLite database.
pub struct SqlRepository {
    pool: SqlitePool,
}

impl SqlRepository {
    /// Connect using the configuration file's database section. The
    /// driver and dialect must both name SQLite; other engines are
    /// external to this crate.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        if !matches!(config.driver_name.as_str(), "sqlite" | "sqlite3") {
            return Err(AppError::config(format!(
                "unsupported database driver {:?} (expected sqlite)",
                config.driver_name
            )));
        }
        if !matches!(config.dialect.as_str(), "sqlite" | "sqlite3") {
            return Err(AppError::config(format!(
                "unsupported SQL dialect {:?} (expected sqlite)",
                config.dialect
            )));
        }
        Self::open(&config.data_source_name).await
    }

    /// Open (and create, if missing) the database at `data_source`.
    pub async fn open(data_source: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(data_source)
            .map_err(AppError::Database)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        debug!(data_source, "connected to repository database");
        Ok(Self { pool })
    }

    /// Create the `resource` and `indication` tables.
    pub async fn initialize(&self) -> Result<()> {
        info!("creating repository schema");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resource (
                resource_id INTEGER PRIMARY KEY AUTOINCREMENT,
                uri TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indication (
                indication_id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL REFERENCES resource(resource_id),
                key VARCHAR(16) NOT NULL,
                value BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_indication_resource ON indication(resource_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_indication_key_value ON indication(key, value)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqlRepository {
    async fn indications(&self, uri: &ResourceUri) -> Result<Option<Indication>> {
        let mut tx = self.pool.begin().await?;
        let resource: Option<(i64,)> =
            sqlx::query_as("SELECT resource_id FROM resource WHERE uri = ?")
                .bind(uri.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let Some((resource_id,)) = resource else {
            return Ok(None);
        };
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT key, value FROM indication WHERE resource_id = ?")
                .bind(resource_id)
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        let mut entries: HashMap<String, Vec<u8>> = HashMap::new();
        for (key, value) in rows {
            entries.insert(key, value);
        }
        let mut ind = Indication::new();
        for (key, value) in &entries {
            ind.write(key.as_bytes(), value);
        }
        Ok(Some(ind))
    }

    async fn set_indications(&self, uri: &ResourceUri, ind: &Indication) -> Result<()> {
        // Validate keys up front so the transaction never holds
        // half-written state for malformed input.
        let mut desired: HashMap<String, Vec<u8>> = HashMap::new();
        ind.each(|key, value| {
            desired.insert(key_as_text(key)?.to_string(), value.to_vec());
            Ok(())
        })?;

        let uri_text = uri.to_string();
        let mut tx = self.pool.begin().await?;

        let resource: Option<(i64,)> =
            sqlx::query_as("SELECT resource_id FROM resource WHERE uri = ?")
                .bind(&uri_text)
                .fetch_optional(&mut *tx)
                .await?;
        let resource_id = match resource {
            Some((id,)) => {
                // Diff the stored rows against the new set: identical
                // (key, value) rows stay, the rest are deleted in bulk.
                let existing: Vec<(i64, String, Vec<u8>)> = sqlx::query_as(
                    "SELECT indication_id, key, value FROM indication WHERE resource_id = ?",
                )
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
                let mut stale = Vec::new();
                for (indication_id, key, value) in existing {
                    if desired.get(&key) == Some(&value) {
                        desired.remove(&key);
                    } else {
                        stale.push(indication_id);
                    }
                }
                if !stale.is_empty() {
                    let mut builder =
                        QueryBuilder::new("DELETE FROM indication WHERE indication_id IN (");
                    let mut ids = builder.separated(", ");
                    for indication_id in stale {
                        ids.push_bind(indication_id);
                    }
                    builder.push(")");
                    builder.build().execute(&mut *tx).await?;
                }
                id
            }
            None => {
                let inserted = sqlx::query("INSERT INTO resource (uri) VALUES (?)")
                    .bind(&uri_text)
                    .execute(&mut *tx)
                    .await?;
                inserted.last_insert_rowid()
            }
        };

        if !desired.is_empty() {
            let mut builder = QueryBuilder::new("INSERT INTO indication (resource_id, key, value) ");
            builder.push_values(desired.iter(), |mut row, (key, value)| {
                row.push_bind(resource_id)
                    .push_bind(key.as_str())
                    .push_bind(value.as_slice());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(uri = %uri_text, "stored indications");
        Ok(())
    }

    async fn uris(&self, query: &UriQuery) -> Result<Vec<ResourceUri>> {
        let compiled = compile(query)?;
        let mut statement = sqlx::query_scalar::<_, String>(&compiled.sql);
        for bind in &compiled.binds {
            statement = match bind {
                BindValue::Text(text) => statement.bind(text.clone()),
                BindValue::Blob(blob) => statement.bind(blob.clone()),
            };
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter().map(|row| row.parse()).collect()
    }
}
