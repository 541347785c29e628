//! Migration artifacts.
//!
//! A [`Migration`] is one schema transition: a sortable id, a name, and a
//! forward and backward operation list. Migrations are created once (by a
//! scaffolding tool or by the runner's automatic path) and are immutable
//! afterwards; the id's fixed-width timestamp prefix gives a total order
//! without relying on file order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::ModelDiff;
use crate::error::PlanError;
use crate::inverse::invert_operations;
use crate::operation::Operation;
use crate::sort::sort_operations;

/// One named, ordered schema transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    /// Sortable identity: `yyyymmddhhmmss_Name`.
    pub id: String,
    /// Human-readable name, also the id's suffix.
    pub name: String,
    /// Operations that apply the transition, in execution order.
    pub up_operations: Vec<Operation>,
    /// Operations that revert the transition, in execution order.
    pub down_operations: Vec<Operation>,
}

impl Migration {
    /// Creates a migration with explicit forward and backward lists.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        up_operations: Vec<Operation>,
        down_operations: Vec<Operation>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            up_operations,
            down_operations,
        }
    }

    /// Builds a migration from a diff: orders the forward list and
    /// synthesizes the backward list from it.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] if the operations cannot be ordered.
    pub fn from_diff(
        id: impl Into<String>,
        name: impl Into<String>,
        diff: ModelDiff,
    ) -> Result<Self, PlanError> {
        let up_operations = sort_operations(diff.operations)?;
        let down_operations = invert_operations(&up_operations);
        Ok(Self {
            id: id.into(),
            name: name.into(),
            up_operations,
            down_operations,
        })
    }

    /// Returns `true` if the backward list contains no irreversible
    /// placeholder, i.e. automatic rollback through this migration is
    /// possible.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !self
            .down_operations
            .iter()
            .any(Operation::is_irreversible)
    }
}

/// Builds a migration id from a timestamp and a name.
///
/// The fixed-width `%Y%m%d%H%M%S` prefix makes ids from different machines
/// and sessions sort chronologically as plain strings.
#[must_use]
pub fn migration_id(at: DateTime<Utc>, name: &str) -> String {
    format!("{}_{}", at.format("%Y%m%d%H%M%S"), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_models;
    use crate::snapshot::{ColumnSnapshot, ColumnType, ModelSnapshot, TableSnapshot};
    use chrono::TimeZone;

    #[test]
    fn ids_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 11, 15, 9, 30, 0).unwrap();
        let a = migration_id(earlier, "AddCustomer");
        let b = migration_id(later, "AddOrder");
        assert_eq!(a, "20260301093000_AddCustomer");
        assert!(a < b);
    }

    #[test]
    fn from_diff_orders_forward_and_synthesizes_backward() {
        let before = ModelSnapshot::new();
        let after = ModelSnapshot::new().table(
            TableSnapshot::new("Customer")
                .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
                .primary_key(vec!["Id".to_string()]),
        );
        let diff = diff_models(&before, &after).unwrap();
        let migration = Migration::from_diff("20260101000000_Init", "Init", diff).unwrap();
        assert_eq!(migration.up_operations.len(), 1);
        assert!(matches!(
            migration.up_operations[0],
            Operation::CreateTable { .. }
        ));
        assert!(matches!(
            migration.down_operations[0],
            Operation::DropTable { .. }
        ));
        assert!(migration.is_reversible());
    }

    #[test]
    fn raw_sql_makes_a_migration_irreversible() {
        let up = vec![Operation::Sql {
            sql: "DELETE FROM Audit".to_string(),
            suppress_transaction: false,
        }];
        let down = invert_operations(&up);
        let migration = Migration::new("20260101000000_Purge", "Purge", up, down);
        assert!(!migration.is_reversible());
    }
}
