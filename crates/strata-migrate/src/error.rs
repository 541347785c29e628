//! Errors for the migration engine.

use std::path::PathBuf;

use strata_core::error::{GenerateError, PlanError};
use thiserror::Error;

/// Errors raised while planning, applying or reverting migrations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Snapshot validation, diffing, replay or ordering failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A dialect could not render an operation.
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// The current model differs from what the applied and pending
    /// migrations produce; some change is not captured by any migration.
    #[error(
        "the model has pending changes not captured by any migration \
         (model fingerprint {model}, migrations produce {migrations})"
    )]
    PendingModelChanges {
        /// Fingerprint of the caller's current model.
        model: String,
        /// Fingerprint of the last applied snapshot advanced through every
        /// pending migration.
        migrations: String,
    },

    /// The update or script target names a migration that exists neither
    /// locally nor in history.
    #[error("target migration '{target}' was not found locally or in history")]
    TargetNotFound {
        /// The requested target id.
        target: String,
    },

    /// A migration recorded in history has no local counterpart, so its
    /// down operations are unavailable for rollback.
    #[error("migration '{id}' is recorded in history but is not present locally")]
    MissingLocalMigration {
        /// The history row's migration id.
        id: String,
    },

    /// Two local migrations share an id.
    #[error("duplicate migration id '{id}'")]
    DuplicateMigrationId {
        /// The duplicated id.
        id: String,
    },

    /// Rollback was requested through a migration whose down list contains
    /// an operation that cannot be automatically inverted.
    #[error("cannot roll back through migration '{id}': {operation}")]
    IrreversibleMigration {
        /// The offending migration id.
        id: String,
        /// Description of the irreversible operation.
        operation: String,
    },

    /// The automatic migration manufactured from the model delta would
    /// drop tables or columns and the data-loss override was not given.
    #[error("automatic migration would lose data ({operation}); enable the data-loss override to proceed")]
    AutomaticDataLoss {
        /// Description of the destructive operation.
        operation: String,
    },

    /// A statement failed mid-migration. The active transaction was rolled
    /// back; migrations committed earlier in the run remain committed.
    #[error("statement {statement_index} of migration '{id}' failed: {source}")]
    SqlExecution {
        /// The failing migration's id.
        id: String,
        /// Zero-based index of the failing statement within the migration.
        statement_index: usize,
        /// The offending SQL text.
        sql: String,
        /// Ids of migrations committed earlier in this run.
        committed: Vec<String>,
        /// The underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// Another run holds the advisory lock.
    #[error("another migration run holds the lock")]
    LockHeld,

    /// A history row's embedded model snapshot could not be decoded.
    #[error("history row for '{id}' has an unreadable model snapshot: {source}")]
    HistoryDecode {
        /// The history row's migration id.
        id: String,
        /// The decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Database error outside a migration's statements (history reads,
    /// transaction management).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A model or migration artifact file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A model or migration artifact file could not be parsed.
    #[error("failed to parse '{path}': {source}")]
    Json {
        /// The offending path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for migration engine operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
