//! # strata-core
//!
//! Schema snapshot diffing, operation ordering and SQL generation.
//!
//! This crate provides:
//! - Structural diffing of model snapshots into abstract schema operations
//! - Dependency-aware ordering that keeps foreign keys after their targets
//! - Automatic inverse synthesis for rollback, with explicit irreversibility
//! - Pluggable SQL dialects (generic ANSI, SQLite, PostgreSQL)
//!
//! ## From snapshots to SQL
//!
//! ```rust
//! use strata_core::diff::diff_models;
//! use strata_core::dialect::{Dialect, GenericDialect};
//! use strata_core::snapshot::{ColumnSnapshot, ColumnType, ModelSnapshot, TableSnapshot};
//!
//! let before = ModelSnapshot::new().table(
//!     TableSnapshot::new("Customer")
//!         .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
//!         .primary_key(vec!["Id".to_string()]),
//! );
//! let after = before.clone().table(
//!     TableSnapshot::new("Customer")
//!         .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
//!         .column(ColumnSnapshot::new("Email", ColumnType::Text))
//!         .primary_key(vec!["Id".to_string()]),
//! );
//!
//! let diff = diff_models(&before, &after).unwrap();
//! assert_eq!(diff.operations.len(), 1);
//!
//! let sql = GenericDialect.generate(&diff.operations[0]).unwrap();
//! assert_eq!(sql[0], r#"ALTER TABLE "Customer" ADD COLUMN "Email" TEXT"#);
//! ```
//!
//! ## Migrations
//!
//! [`Migration::from_diff`] packages an ordered forward list together with
//! its synthesized backward list; the runner crate executes migrations and
//! records them in the target database's history table.

pub mod apply;
pub mod diff;
pub mod dialect;
pub mod error;
pub mod fingerprint;
pub mod inverse;
pub mod migration;
pub mod operation;
pub mod snapshot;
pub mod sort;

pub use apply::{apply_operation, apply_operations};
pub use diff::{diff_models, diff_models_with, DiffWarning, ModelDiff, RenameLog};
pub use dialect::{Dialect, GenericDialect, PostgresDialect, SqliteDialect};
pub use error::{GenerateError, PlanError};
pub use fingerprint::{fingerprint, models_match};
pub use inverse::{invert_operation, invert_operations};
pub use migration::{migration_id, Migration};
pub use operation::Operation;
pub use snapshot::{
    ColumnSnapshot, ColumnType, DefaultValue, ForeignKeySnapshot, IndexSnapshot, ModelSnapshot,
    TableSnapshot,
};
pub use sort::sort_operations;
