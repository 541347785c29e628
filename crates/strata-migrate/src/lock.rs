//! Advisory run locking.
//!
//! Two runners executing concurrently against the same context is
//! unsupported; the lock is the explicit collaborator that prevents it.
//! The runner acquires it before planning and releases it after the run.
//! [`TableLock`] is the provided implementation: a single-row table whose
//! insert fails while another run holds the lock. Any other mechanism can
//! be substituted by implementing [`RunLock`]; [`NoLock`] opts out
//! entirely for callers that serialize runs themselves.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// SQL to create the lock table.
pub const CREATE_LOCK_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS __strata_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    locked_at TEXT NOT NULL
)
";

/// Advisory lock held for the duration of a migration run.
pub trait RunLock {
    /// Acquires the lock before planning begins.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LockHeld`] if another run holds the lock.
    fn acquire(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Releases the lock after the run, successful or not.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] if the release fails.
    fn release(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// No locking; the caller guarantees runs never overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl RunLock for NoLock {
    async fn acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Lock backed by a single-row table in the target database.
///
/// Acquisition inserts the one permitted row; a second insert violates the
/// primary key and maps to [`MigrateError::LockHeld`]. A crashed run leaves
/// the row behind; clearing it is a manual operation, like fixing the
/// half-applied state such a crash implies.
#[derive(Debug, Clone)]
pub struct TableLock {
    pool: SqlitePool,
}

impl TableLock {
    /// Creates a table lock over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RunLock for TableLock {
    async fn acquire(&self) -> Result<()> {
        sqlx::query(CREATE_LOCK_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        let inserted = sqlx::query("INSERT INTO __strata_lock (id, locked_at) VALUES (1, ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await;
        match inserted {
            Ok(_) => {
                debug!("run lock acquired");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() || e.is_check_violation() => {
                Err(MigrateError::LockHeld)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self) -> Result<()> {
        sqlx::query("DELETE FROM __strata_lock WHERE id = 1")
            .execute(&self.pool)
            .await?;
        debug!("run lock released");
        Ok(())
    }
}
