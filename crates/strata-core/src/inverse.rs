//! Inverse operation synthesis.
//!
//! [`invert_operations`] derives the rollback list for a forward list:
//! reversed order, each operation flipped. Column, index and foreign key
//! drops invert through the `previous` payload the differ recorded; when
//! that payload is missing, or when the forward operation destroyed data
//! a reverse operation cannot recover (a dropped table's rows, a
//! narrowing type change), the inverse degrades to
//! [`Operation::Irreversible`] so the refusal happens at rollback time
//! with a message naming the lossy step.
//!
//! Reversing an ordered forward list yields an ordered backward list: the
//! forward tail of `AddForeignKey` operations becomes the backward head of
//! `DropForeignKey` operations, so no re-sort is needed.

use crate::operation::Operation;
use crate::snapshot::{qualified, split_qualified, TableSnapshot};

/// Synthesizes the backward list for an ordered forward list.
#[must_use]
pub fn invert_operations(up: &[Operation]) -> Vec<Operation> {
    up.iter().rev().map(invert_operation).collect()
}

/// Inverts one operation.
///
/// A dropped table never inverts, even with its definition recorded:
/// recreating the table would not recreate its rows, so the inverse is
/// always the irreversible placeholder.
#[must_use]
pub fn invert_operation(op: &Operation) -> Operation {
    match op {
        Operation::CreateTable {
            table,
            columns,
            primary_key,
        } => {
            let (schema, name) = split_qualified(table);
            Operation::DropTable {
                table: table.clone(),
                previous: Some(TableSnapshot {
                    schema: schema.map(str::to_string),
                    name: name.to_string(),
                    columns: columns.clone(),
                    primary_key: primary_key.clone(),
                    indexes: std::collections::BTreeMap::new(),
                }),
            }
        }

        // The recorded definition stays available for diagnostics, but the
        // rows are gone either way.
        Operation::DropTable { table, .. } => Operation::Irreversible {
            description: format!("table '{table}' was dropped; its rows cannot be restored"),
        },

        Operation::MoveTable { table, new_schema } => {
            let (old_schema, name) = split_qualified(table);
            Operation::MoveTable {
                table: qualified(new_schema.as_deref(), name),
                new_schema: old_schema.map(str::to_string),
            }
        }

        Operation::RenameTable { table, new_name } => {
            let (schema, old_name) = split_qualified(table);
            Operation::RenameTable {
                table: qualified(schema, new_name),
                new_name: old_name.to_string(),
            }
        }

        Operation::AddColumn { table, column } => Operation::DropColumn {
            table: table.clone(),
            column: column.name.clone(),
            previous: Some(column.clone()),
        },

        Operation::DropColumn {
            table,
            column,
            previous,
        } => match previous {
            Some(prev) => Operation::AddColumn {
                table: table.clone(),
                column: prev.clone(),
            },
            None => Operation::Irreversible {
                description: format!(
                    "column '{table}.{column}' was dropped and its definition was not recorded"
                ),
            },
        },

        Operation::AlterColumn {
            table,
            column,
            previous,
        } => match previous {
            // Widening back cannot resurrect values the narrowing change
            // already truncated.
            Some(prev) if column.column_type.narrower_than(&prev.column_type) => {
                Operation::Irreversible {
                    description: format!(
                        "column '{table}.{}' was narrowed; values outside the new type cannot be restored",
                        column.name
                    ),
                }
            }
            Some(prev) => Operation::AlterColumn {
                table: table.clone(),
                column: prev.clone(),
                previous: Some(column.clone()),
            },
            None => Operation::Irreversible {
                description: format!(
                    "column '{table}.{}' was altered and its previous definition was not recorded",
                    column.name
                ),
            },
        },

        Operation::RenameColumn {
            table,
            column,
            new_name,
        } => Operation::RenameColumn {
            table: table.clone(),
            column: new_name.clone(),
            new_name: column.clone(),
        },

        Operation::AddForeignKey { foreign_key } => Operation::DropForeignKey {
            name: foreign_key.name.clone(),
            previous: Some(foreign_key.clone()),
        },

        Operation::DropForeignKey { name, previous } => match previous {
            Some(prev) => Operation::AddForeignKey {
                foreign_key: prev.clone(),
            },
            None => Operation::Irreversible {
                description: format!(
                    "foreign key '{name}' was dropped and its definition was not recorded"
                ),
            },
        },

        Operation::CreateIndex { table, index } => Operation::DropIndex {
            table: table.clone(),
            index: index.name.clone(),
            previous: Some(index.clone()),
        },

        Operation::DropIndex {
            table,
            index,
            previous,
        } => match previous {
            Some(prev) => Operation::CreateIndex {
                table: table.clone(),
                index: prev.clone(),
            },
            None => Operation::Irreversible {
                description: format!(
                    "index '{index}' on '{table}' was dropped and its definition was not recorded"
                ),
            },
        },

        Operation::Sql { .. } => Operation::Irreversible {
            description: "raw SQL operation has no automatic inverse".to_string(),
        },

        Operation::Irreversible { description } => Operation::Irreversible {
            description: description.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnSnapshot, ColumnType, ForeignKeySnapshot, IndexSnapshot};

    #[test]
    fn create_table_inverts_to_drop_with_definition() {
        let up = Operation::CreateTable {
            table: "Customer".to_string(),
            columns: vec![ColumnSnapshot::new("Id", ColumnType::Integer).identity()],
            primary_key: vec!["Id".to_string()],
        };
        let down = invert_operation(&up);
        assert!(matches!(
            &down,
            Operation::DropTable { table, previous: Some(prev) }
                if table == "Customer" && prev.columns.len() == 1
        ));
        // The synthesized drop does not invert back: its rows are gone.
        assert!(invert_operation(&down).is_irreversible());
    }

    #[test]
    fn dropping_a_table_is_always_irreversible() {
        // Even a fully recorded definition cannot restore the rows.
        let table = TableSnapshot::new("Customer")
            .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
            .column(ColumnSnapshot::new("Name", ColumnType::Varchar(100)))
            .primary_key(vec!["Id".to_string()])
            .index(IndexSnapshot::new("IX_Customer_Name", vec!["Name".to_string()]));
        let recorded = Operation::DropTable {
            table: "Customer".to_string(),
            previous: Some(table),
        };
        assert!(invert_operation(&recorded).is_irreversible());

        let unrecorded = Operation::DropTable {
            table: "Customer".to_string(),
            previous: None,
        };
        assert!(invert_operation(&unrecorded).is_irreversible());
    }

    #[test]
    fn drop_without_recorded_definition_is_irreversible() {
        let up = Operation::DropColumn {
            table: "Customer".to_string(),
            column: "Name".to_string(),
            previous: None,
        };
        assert!(invert_operation(&up).is_irreversible());
    }

    #[test]
    fn renames_invert_by_swapping_names() {
        let up = Operation::RenameColumn {
            table: "Customer".to_string(),
            column: "Name".to_string(),
            new_name: "FullName".to_string(),
        };
        let down = invert_operation(&up);
        assert!(matches!(
            &down,
            Operation::RenameColumn { column, new_name, .. }
                if column == "FullName" && new_name == "Name"
        ));

        let up = Operation::RenameTable {
            table: "sales.Order".to_string(),
            new_name: "Purchase".to_string(),
        };
        let down = invert_operation(&up);
        assert!(matches!(
            &down,
            Operation::RenameTable { table, new_name }
                if table == "sales.Purchase" && new_name == "Order"
        ));
    }

    #[test]
    fn move_inverts_to_move_back() {
        let up = Operation::MoveTable {
            table: "Order".to_string(),
            new_schema: Some("sales".to_string()),
        };
        let down = invert_operation(&up);
        assert!(matches!(
            &down,
            Operation::MoveTable { table, new_schema: None } if table == "sales.Order"
        ));
    }

    #[test]
    fn widening_alter_inverts_narrowing_does_not() {
        let widen = Operation::AlterColumn {
            table: "Customer".to_string(),
            column: ColumnSnapshot::new("Name", ColumnType::Varchar(200)),
            previous: Some(ColumnSnapshot::new("Name", ColumnType::Varchar(100))),
        };
        let down = invert_operation(&widen);
        assert!(matches!(
            &down,
            Operation::AlterColumn { column, .. } if column.column_type == ColumnType::Varchar(100)
        ));

        let narrow = Operation::AlterColumn {
            table: "Customer".to_string(),
            column: ColumnSnapshot::new("Name", ColumnType::Varchar(50)),
            previous: Some(ColumnSnapshot::new("Name", ColumnType::Varchar(100))),
        };
        assert!(invert_operation(&narrow).is_irreversible());
    }

    #[test]
    fn raw_sql_is_irreversible() {
        let up = Operation::Sql {
            sql: "UPDATE Customer SET Active = 1".to_string(),
            suppress_transaction: false,
        };
        assert!(invert_operation(&up).is_irreversible());
    }

    #[test]
    fn list_inversion_reverses_order() {
        let fk = ForeignKeySnapshot::new("FK_Order_Customer", "Order", "Customer")
            .pair("CustomerId", "Id");
        let up = vec![
            Operation::CreateTable {
                table: "Order".to_string(),
                columns: vec![ColumnSnapshot::new("Id", ColumnType::Integer).identity()],
                primary_key: vec!["Id".to_string()],
            },
            Operation::AddForeignKey { foreign_key: fk },
        ];
        let down = invert_operations(&up);
        assert_eq!(down.len(), 2);
        // Forward tail becomes backward head.
        assert!(matches!(down[0], Operation::DropForeignKey { .. }));
        assert!(matches!(down[1], Operation::DropTable { .. }));
    }
}
