//! Migration history tracking.
//!
//! The `__strata_history` table, inside the target database, is the single
//! source of truth for which migrations have been applied. Each row pairs a
//! migration id with the context key it belongs to and the serialized model
//! snapshot the migration produced, so a later run can reconstruct the
//! applied schema without consulting anything outside the database.
//!
//! The store holds no transaction boundary of its own: reads go through the
//! pool, mutations take the caller's transaction so a migration's DDL and
//! its history row commit or roll back together.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

use strata_core::dialect::Dialect;
use strata_core::snapshot::ModelSnapshot;

use crate::error::{MigrateError, Result};

/// Name of the history table.
pub const HISTORY_TABLE: &str = "__strata_history";

/// SQL to create the history table.
pub const CREATE_HISTORY_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS __strata_history (
    migration_id TEXT PRIMARY KEY,
    context_key TEXT NOT NULL,
    model BLOB NOT NULL,
    product_version TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// One applied migration.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// Sortable migration id.
    pub migration_id: String,
    /// Context this migration belongs to.
    pub context_key: String,
    /// The model snapshot as of this migration.
    pub model: ModelSnapshot,
    /// Version of the engine that applied the migration.
    pub product_version: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl HistoryRow {
    /// Creates a row for a migration applied now by this engine version.
    #[must_use]
    pub fn new(
        migration_id: impl Into<String>,
        context_key: impl Into<String>,
        model: ModelSnapshot,
    ) -> Self {
        Self {
            migration_id: migration_id.into(),
            context_key: context_key.into(),
            model,
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            applied_at: Utc::now(),
        }
    }

    /// Renders this row's INSERT as literal SQL for script output.
    ///
    /// The model blob becomes a hex literal so the script is self-contained
    /// text.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn insert_sql(&self, dialect: &dyn Dialect) -> Result<String> {
        let blob = encode_model(&self.model)?;
        Ok(format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES ('{}', '{}', X'{}', '{}', '{}')",
            dialect.quote(HISTORY_TABLE),
            dialect.quote("migration_id"),
            dialect.quote("context_key"),
            dialect.quote("model"),
            dialect.quote("product_version"),
            dialect.quote("applied_at"),
            escape(&self.migration_id),
            escape(&self.context_key),
            hex(&blob),
            escape(&self.product_version),
            self.applied_at.to_rfc3339(),
        ))
    }

    /// Renders this row's DELETE as literal SQL for downgrade scripts.
    #[must_use]
    pub fn delete_sql(&self, dialect: &dyn Dialect) -> String {
        format!(
            "DELETE FROM {} WHERE {} = '{}'",
            dialect.quote(HISTORY_TABLE),
            dialect.quote("migration_id"),
            escape(&self.migration_id),
        )
    }
}

/// Serializes a snapshot to its history blob form (canonical JSON bytes).
///
/// # Errors
///
/// Returns an error if serialization fails, which for these types it
/// cannot in practice.
pub fn encode_model(model: &ModelSnapshot) -> Result<Vec<u8>> {
    serde_json::to_vec(model).map_err(|source| MigrateError::HistoryDecode {
        id: String::new(),
        source,
    })
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[usize::from(b >> 4)] as char);
        out.push(DIGITS[usize::from(b & 0x0f)] as char);
    }
    out
}

fn parse_applied_at(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime() default format fallback.
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

/// Manages the migration history table.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Creates a history store over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the history table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] if the statement fails.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_HISTORY_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns all applied migrations for a context, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] on query failure and
    /// [`MigrateError::HistoryDecode`] if a stored snapshot is unreadable.
    pub async fn applied_migrations(&self, context_key: &str) -> Result<Vec<HistoryRow>> {
        let rows: Vec<(String, String, Vec<u8>, String, String)> = sqlx::query_as(
            "SELECT migration_id, context_key, model, product_version, applied_at \
             FROM __strata_history WHERE context_key = ? ORDER BY migration_id",
        )
        .bind(context_key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(migration_id, context_key, blob, product_version, applied_at)| {
                let model = serde_json::from_slice(&blob).map_err(|source| {
                    MigrateError::HistoryDecode {
                        id: migration_id.clone(),
                        source,
                    }
                })?;
                Ok(HistoryRow {
                    migration_id,
                    context_key,
                    model,
                    product_version,
                    applied_at: parse_applied_at(&applied_at),
                })
            })
            .collect()
    }

    /// Returns the most recently applied migration for a context, if any.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] on query failure and
    /// [`MigrateError::HistoryDecode`] if the stored snapshot is unreadable.
    pub async fn last_row(&self, context_key: &str) -> Result<Option<HistoryRow>> {
        let row: Option<(String, String, Vec<u8>, String, String)> = sqlx::query_as(
            "SELECT migration_id, context_key, model, product_version, applied_at \
             FROM __strata_history WHERE context_key = ? ORDER BY migration_id DESC LIMIT 1",
        )
        .bind(context_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(migration_id, context_key, blob, product_version, applied_at)| {
            let model =
                serde_json::from_slice(&blob).map_err(|source| MigrateError::HistoryDecode {
                    id: migration_id.clone(),
                    source,
                })?;
            Ok(HistoryRow {
                migration_id,
                context_key,
                model,
                product_version,
                applied_at: parse_applied_at(&applied_at),
            })
        })
        .transpose()
    }

    /// Inserts a row inside the caller's transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] if the insert fails.
    pub async fn append(tx: &mut Transaction<'_, Sqlite>, row: &HistoryRow) -> Result<()> {
        let blob = encode_model(&row.model)?;
        sqlx::query(
            "INSERT INTO __strata_history \
             (migration_id, context_key, model, product_version, applied_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&row.migration_id)
        .bind(&row.context_key)
        .bind(blob)
        .bind(&row.product_version)
        .bind(row.applied_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Deletes a row inside the caller's transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::TargetNotFound`] if no row matched, or
    /// [`MigrateError::Database`] on statement failure.
    pub async fn delete(tx: &mut Transaction<'_, Sqlite>, migration_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM __strata_history WHERE migration_id = ?")
            .bind(migration_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MigrateError::TargetNotFound {
                target: migration_id.to_string(),
            });
        }
        Ok(())
    }
}
