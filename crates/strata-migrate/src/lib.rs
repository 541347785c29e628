//! Migration engine for strata models.
//!
//! `strata-migrate` executes the plans `strata-core` produces: it keeps a
//! history table inside the target database, reconciles a set of local
//! migrations against it, and moves the schema to a requested target —
//! forward through pending migrations or backward through applied ones.
//!
//! # Architecture
//!
//! - **History Store** — the `__strata_history` table: one row per applied
//!   migration, carrying the full model snapshot that migration produced
//! - **Runner** — plans and executes runs, one transaction per migration,
//!   with a drift gate that refuses to run when the current model contains
//!   changes no migration captures
//! - **Run Lock** — optional advisory lock preventing concurrent runs
//! - **Artifacts** — JSON model and migration files from the scaffolder
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::dialect::SqliteDialect;
//! use strata_migrate::prelude::*;
//!
//! let runner = MigrationRunner::new(pool, SqliteDialect, RunnerOptions::default());
//! let report = runner.update(&migrations, &model, &UpdateTarget::Latest).await?;
//! for id in &report.applied {
//!     println!("applied {id}");
//! }
//! ```

pub mod artifacts;
pub mod error;
pub mod history;
pub mod lock;
pub mod runner;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::artifacts::{load_migrations, load_model};
    pub use crate::error::{MigrateError, Result};
    pub use crate::history::{HistoryRow, HistoryStore};
    pub use crate::lock::{NoLock, RunLock, TableLock};
    pub use crate::runner::{
        script_migrations, CancellationHandle, MigrationRunner, RunReport, RunState,
        RunnerOptions, UpdateTarget,
    };
}
