//! Replaying operations onto a snapshot.
//!
//! [`apply_operations`] computes the model that results from running an
//! ordered operation list against a starting model. It is the in-memory
//! twin of executing the generated SQL: the runner uses it to project the
//! last applied snapshot forward through pending migrations, and tests use
//! it to check that a migration's backward list really undoes its forward
//! list.

use crate::error::PlanError;
use crate::operation::Operation;
use crate::snapshot::{split_qualified, ModelSnapshot, TableSnapshot};

/// Applies an ordered operation list to a model, returning the new model.
///
/// The input model is not modified. The result is validated before being
/// returned, so a plan that leaves a foreign key or index dangling fails
/// here rather than surfacing later as a malformed snapshot.
///
/// # Errors
///
/// Returns [`PlanError`] if any operation references a missing object,
/// collides with an existing one, or is an irreversible placeholder.
pub fn apply_operations(
    model: &ModelSnapshot,
    operations: &[Operation],
) -> Result<ModelSnapshot, PlanError> {
    let mut next = model.clone();
    for op in operations {
        apply_operation(&mut next, op)?;
    }
    next.validate()?;
    Ok(next)
}

/// Applies a single operation in place.
///
/// # Errors
///
/// Returns [`PlanError`] if the operation cannot be applied to the model.
pub fn apply_operation(model: &mut ModelSnapshot, op: &Operation) -> Result<(), PlanError> {
    match op {
        Operation::CreateTable {
            table,
            columns,
            primary_key,
        } => {
            if model.tables.contains_key(table) {
                return Err(PlanError::DuplicateTable {
                    table: table.clone(),
                });
            }
            let (schema, name) = split_qualified(table);
            model.tables.insert(
                table.clone(),
                TableSnapshot {
                    schema: schema.map(str::to_string),
                    name: name.to_string(),
                    columns: columns.clone(),
                    primary_key: primary_key.clone(),
                    indexes: std::collections::BTreeMap::new(),
                },
            );
            Ok(())
        }

        Operation::DropTable { table, .. } => {
            if model.tables.remove(table).is_none() {
                return Err(missing_table(table, "drop table"));
            }
            Ok(())
        }

        Operation::MoveTable { table, new_schema } => {
            let mut moved = model
                .tables
                .remove(table)
                .ok_or_else(|| missing_table(table, "move table"))?;
            moved.schema = new_schema.clone();
            let new_key = moved.qualified_name();
            if model.tables.contains_key(&new_key) {
                return Err(PlanError::DuplicateTable { table: new_key });
            }
            model.tables.insert(new_key, moved);
            Ok(())
        }

        Operation::RenameTable { table, new_name } => {
            let mut renamed = model
                .tables
                .remove(table)
                .ok_or_else(|| missing_table(table, "rename table"))?;
            renamed.name = new_name.clone();
            let new_key = renamed.qualified_name();
            if model.tables.contains_key(&new_key) {
                return Err(PlanError::DuplicateTable { table: new_key });
            }
            model.tables.insert(new_key, renamed);
            Ok(())
        }

        Operation::AddColumn { table, column } => {
            let target = table_mut(model, table, "add column")?;
            if target.column_named(&column.name).is_some() {
                return Err(PlanError::DuplicateColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                });
            }
            target.columns.push(column.clone());
            Ok(())
        }

        Operation::DropColumn { table, column, .. } => {
            let target = table_mut(model, table, "drop column")?;
            let before = target.columns.len();
            target.columns.retain(|c| c.name != *column);
            if target.columns.len() == before {
                return Err(missing_column(table, column, "drop column"));
            }
            Ok(())
        }

        Operation::AlterColumn { table, column, .. } => {
            let target = table_mut(model, table, "alter column")?;
            let slot = target
                .columns
                .iter_mut()
                .find(|c| c.name == column.name)
                .ok_or_else(|| missing_column(table, &column.name, "alter column"))?;
            *slot = column.clone();
            Ok(())
        }

        Operation::RenameColumn {
            table,
            column,
            new_name,
        } => {
            let target = table_mut(model, table, "rename column")?;
            if target.column_named(new_name).is_some() {
                return Err(PlanError::DuplicateColumn {
                    table: table.clone(),
                    column: new_name.clone(),
                });
            }
            let slot = target
                .columns
                .iter_mut()
                .find(|c| c.name == *column)
                .ok_or_else(|| missing_column(table, column, "rename column"))?;
            slot.name = new_name.clone();
            // The store renames references inside the table with it.
            // Foreign keys are not touched here; a plan that renames a key
            // column always carries the matching drop/re-add pair.
            for pk in &mut target.primary_key {
                if pk == column {
                    *pk = new_name.clone();
                }
            }
            for index in target.indexes.values_mut() {
                for col in &mut index.columns {
                    if col == column {
                        *col = new_name.clone();
                    }
                }
            }
            Ok(())
        }

        Operation::AddForeignKey { foreign_key } => {
            if model.foreign_keys.contains_key(&foreign_key.name) {
                return Err(PlanError::DuplicateForeignKey {
                    name: foreign_key.name.clone(),
                });
            }
            model
                .foreign_keys
                .insert(foreign_key.name.clone(), foreign_key.clone());
            Ok(())
        }

        Operation::DropForeignKey { name, .. } => {
            if model.foreign_keys.remove(name).is_none() {
                return Err(PlanError::MissingForeignKey { name: name.clone() });
            }
            Ok(())
        }

        Operation::CreateIndex { table, index } => {
            let target = table_mut(model, table, "create index")?;
            if target.indexes.contains_key(&index.name) {
                return Err(PlanError::DuplicateIndex {
                    table: table.clone(),
                    index: index.name.clone(),
                });
            }
            target.indexes.insert(index.name.clone(), index.clone());
            Ok(())
        }

        Operation::DropIndex { table, index, .. } => {
            let target = table_mut(model, table, "drop index")?;
            if target.indexes.remove(index).is_none() {
                return Err(PlanError::MissingIndex {
                    table: table.clone(),
                    index: index.clone(),
                });
            }
            Ok(())
        }

        // Raw SQL is opaque to the model.
        Operation::Sql { .. } => Ok(()),

        Operation::Irreversible { description } => Err(PlanError::Irreversible {
            description: description.clone(),
        }),
    }
}

fn table_mut<'a>(
    model: &'a mut ModelSnapshot,
    table: &str,
    context: &str,
) -> Result<&'a mut TableSnapshot, PlanError> {
    model
        .tables
        .get_mut(table)
        .ok_or_else(|| missing_table(table, context))
}

fn missing_table(table: &str, context: &str) -> PlanError {
    PlanError::MissingTable {
        table: table.to_string(),
        context: context.to_string(),
    }
}

fn missing_column(table: &str, column: &str, context: &str) -> PlanError {
    PlanError::MissingColumn {
        table: table.to_string(),
        column: column.to_string(),
        context: context.to_string(),
    }
}
