//! Integration tests for the planning pipeline.
//!
//! These tests drive snapshots through diff, sort, inverse synthesis and
//! SQL generation together, checking the properties the single-module
//! unit tests cannot see: orderings stay safe across operation kinds,
//! backward lists really undo forward lists, and dialect errors surface
//! before any SQL would run.

use strata_core::apply::apply_operations;
use strata_core::diff::diff_models;
use strata_core::dialect::{Dialect, GenericDialect, SqliteDialect};
use strata_core::migration::Migration;
use strata_core::snapshot::{
    ColumnSnapshot, ColumnType, ForeignKeySnapshot, IndexSnapshot, ModelSnapshot, TableSnapshot,
};
use strata_core::{sort_operations, GenerateError, Operation};

fn customer() -> TableSnapshot {
    TableSnapshot::new("Customer")
        .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
        .column(ColumnSnapshot::new("Name", ColumnType::Varchar(100)).not_null())
        .primary_key(vec!["Id".to_string()])
}

fn order_with_fk() -> (TableSnapshot, ForeignKeySnapshot) {
    let table = TableSnapshot::new("Order")
        .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
        .column(ColumnSnapshot::new("CustomerId", ColumnType::Integer).not_null())
        .primary_key(vec!["Id".to_string()])
        .index(IndexSnapshot::new(
            "IX_Order_CustomerId",
            vec!["CustomerId".to_string()],
        ));
    let fk = ForeignKeySnapshot::new("FK_Order_Customer", "Order", "Customer")
        .pair("CustomerId", "Id");
    (table, fk)
}

// =============================================================================
// Diff identity
// =============================================================================

#[test]
fn diffing_a_snapshot_against_itself_is_empty() {
    let (order, fk) = order_with_fk();
    let model = ModelSnapshot::new()
        .table(customer())
        .table(order)
        .foreign_key(fk);
    let diff = diff_models(&model, &model).unwrap();
    assert!(diff.is_empty());
}

// =============================================================================
// Add-column scenario: Customer gains Email
// =============================================================================

#[test]
fn added_column_plans_one_alter_table_statement() {
    let before = ModelSnapshot::new().table(customer());
    let after =
        ModelSnapshot::new().table(customer().column(ColumnSnapshot::new("Email", ColumnType::Text)));

    let diff = diff_models(&before, &after).unwrap();
    let ordered = sort_operations(diff.operations).unwrap();
    assert_eq!(ordered.len(), 1);

    let sql = GenericDialect.generate(&ordered[0]).unwrap();
    assert_eq!(
        sql,
        vec![r#"ALTER TABLE "Customer" ADD COLUMN "Email" TEXT"#.to_string()]
    );
}

// =============================================================================
// Dependency safety
// =============================================================================

#[test]
fn new_tables_come_before_their_foreign_keys() {
    let (order, fk) = order_with_fk();
    let before = ModelSnapshot::new();
    let after = ModelSnapshot::new()
        .table(customer())
        .table(order)
        .foreign_key(fk);

    let diff = diff_models(&before, &after).unwrap();
    let ordered = sort_operations(diff.operations).unwrap();

    let fk_pos = ordered
        .iter()
        .position(|op| matches!(op, Operation::AddForeignKey { .. }))
        .unwrap();
    for (i, op) in ordered.iter().enumerate() {
        if matches!(op, Operation::CreateTable { .. } | Operation::CreateIndex { .. }) {
            assert!(i < fk_pos, "structural operation after a foreign key add");
        }
    }

    // The whole plan renders on the generic dialect.
    for op in &ordered {
        GenericDialect.generate(op).unwrap();
    }
}

#[test]
fn dropped_tables_come_after_their_foreign_keys() {
    let (order, fk) = order_with_fk();
    let before = ModelSnapshot::new()
        .table(customer())
        .table(order)
        .foreign_key(fk);
    let after = ModelSnapshot::new().table(customer());

    let diff = diff_models(&before, &after).unwrap();
    let ordered = sort_operations(diff.operations).unwrap();

    let drop_fk_pos = ordered
        .iter()
        .position(|op| matches!(op, Operation::DropForeignKey { .. }))
        .unwrap();
    let drop_table_pos = ordered
        .iter()
        .position(|op| matches!(op, Operation::DropTable { .. }))
        .unwrap();
    assert!(drop_fk_pos < drop_table_pos);
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn reversible_migration_round_trips_the_model() {
    let base = ModelSnapshot::new().table(customer());
    let (order, fk) = order_with_fk();
    let target = ModelSnapshot::new()
        .table(customer().column(ColumnSnapshot::new("Email", ColumnType::Text)))
        .table(order)
        .foreign_key(fk);

    let diff = diff_models(&base, &target).unwrap();
    let migration =
        Migration::from_diff("20260301000000_AddOrders", "AddOrders", diff).unwrap();
    assert!(migration.is_reversible());

    let forward = apply_operations(&base, &migration.up_operations).unwrap();
    assert_eq!(forward, target);

    let backward = apply_operations(&forward, &migration.down_operations).unwrap();
    assert_eq!(backward, base);
}

#[test]
fn narrowing_change_cannot_round_trip() {
    let before = ModelSnapshot::new().table(customer());
    let after = ModelSnapshot::new().table(
        TableSnapshot::new("Customer")
            .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
            .column(ColumnSnapshot::new("Name", ColumnType::Varchar(20)).not_null())
            .primary_key(vec!["Id".to_string()]),
    );

    let diff = diff_models(&before, &after).unwrap();
    let migration = Migration::from_diff("20260301000000_Narrow", "Narrow", diff).unwrap();
    assert!(!migration.is_reversible());
    assert!(migration
        .down_operations
        .iter()
        .any(Operation::is_irreversible));
}

// =============================================================================
// Dialect limits surface as generation errors
// =============================================================================

#[test]
fn sqlite_rejects_constraint_changes_before_any_sql_is_produced() {
    let (order, fk) = order_with_fk();
    let before = ModelSnapshot::new().table(customer()).table(order.clone());
    let after = ModelSnapshot::new()
        .table(customer())
        .table(order)
        .foreign_key(fk);

    let diff = diff_models(&before, &after).unwrap();
    let ordered = sort_operations(diff.operations).unwrap();
    assert_eq!(ordered.len(), 1);

    let err = SqliteDialect.generate(&ordered[0]).unwrap_err();
    match err {
        GenerateError::Unsupported {
            operation,
            provider,
        } => {
            assert!(operation.contains("FK_Order_Customer"));
            assert_eq!(provider, "sqlite");
        }
        other => panic!("expected Unsupported, got {other}"),
    }
}

#[test]
fn sqlite_handles_a_foreign_key_free_plan_end_to_end() {
    let before = ModelSnapshot::new();
    let after = ModelSnapshot::new().table(
        customer().index(IndexSnapshot::new(
            "IX_Customer_Name",
            vec!["Name".to_string()],
        )),
    );

    let diff = diff_models(&before, &after).unwrap();
    let ordered = sort_operations(diff.operations).unwrap();
    let mut statements = Vec::new();
    for op in &ordered {
        statements.extend(SqliteDialect.generate(op).unwrap());
    }
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("CREATE TABLE"));
    assert!(statements[1].starts_with("CREATE INDEX"));
}
