//! Structural diffing of model snapshots.
//!
//! [`diff_models`] compares two snapshots and produces the unordered set of
//! operations that transforms the source schema into the target schema.
//! Tables are matched by qualified name, columns by name within a matched
//! table, indexes and foreign keys by their own names. Renames are never
//! inferred from the shapes alone; the caller states them up front in a
//! [`RenameLog`] and the differ matches through it.
//!
//! The differ is pure: it never touches a database and it never orders the
//! operations it emits. Ordering is the sorter's job.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::PlanError;
use crate::operation::Operation;
use crate::snapshot::{
    qualified, split_qualified, ColumnSnapshot, ModelSnapshot, TableSnapshot,
};

/// Explicit rename annotations supplied by the caller.
///
/// Without an entry here, a table or column that disappears under one name
/// and appears under another diffs as a drop plus a create.
#[derive(Debug, Clone, Default)]
pub struct RenameLog {
    tables: Vec<(String, String)>,
    columns: Vec<(String, String, String)>,
}

impl RenameLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the table known as `from` in the source is `to` in the
    /// target. Both are qualified names.
    #[must_use]
    pub fn table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.tables.push((from.into(), to.into()));
        self
    }

    /// Records that column `from` of `table` (target qualified name) is
    /// `to` in the target.
    #[must_use]
    pub fn column(
        mut self,
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.columns.push((table.into(), from.into(), to.into()));
        self
    }

    fn table_source(&self, target: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|(_, to)| to == target)
            .map(|(from, _)| from.as_str())
    }

    fn column_source(&self, table: &str, target: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(t, _, to)| t == table && to == target)
            .map(|(_, from, _)| from.as_str())
    }
}

/// Conditions the operation set cannot express, reported alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffWarning {
    /// The primary key of an existing table changed.
    PrimaryKeyChanged {
        /// Qualified table name.
        table: String,
    },
    /// Columns of an existing table were reordered without other changes.
    ColumnOrderChanged {
        /// Qualified table name.
        table: String,
    },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKeyChanged { table } => {
                write!(
                    f,
                    "primary key of '{table}' changed; rebuilding a primary key is not expressible as a migration operation"
                )
            }
            Self::ColumnOrderChanged { table } => {
                write!(
                    f,
                    "column order of '{table}' changed; column positions are not migrated"
                )
            }
        }
    }
}

/// The result of diffing two snapshots.
#[derive(Debug, Clone, Default)]
pub struct ModelDiff {
    /// Unordered operations transforming source into target.
    pub operations: Vec<Operation>,
    /// Changes the operation set cannot express.
    pub warnings: Vec<DiffWarning>,
}

impl ModelDiff {
    /// Returns `true` if the snapshots were structurally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.warnings.is_empty()
    }
}

/// Diffs two snapshots with no rename annotations.
///
/// # Errors
///
/// Returns [`PlanError`] if either snapshot fails validation.
pub fn diff_models(
    source: &ModelSnapshot,
    target: &ModelSnapshot,
) -> Result<ModelDiff, PlanError> {
    diff_models_with(source, target, &RenameLog::default())
}

/// Diffs two snapshots, matching renamed tables and columns through the
/// given log.
///
/// # Errors
///
/// Returns [`PlanError`] if either snapshot fails validation.
pub fn diff_models_with(
    source: &ModelSnapshot,
    target: &ModelSnapshot,
    renames: &RenameLog,
) -> Result<ModelDiff, PlanError> {
    source.validate()?;
    target.validate()?;

    let mut diff = ModelDiff::default();
    let mut consumed_sources: BTreeSet<&str> = BTreeSet::new();

    // Tables present in the target: matched (possibly under an old name)
    // or created.
    for (target_key, target_table) in &target.tables {
        let source_key = renames.table_source(target_key).unwrap_or(target_key);
        match source.tables.get(source_key) {
            Some(source_table) => {
                consumed_sources.insert(source_key);
                if source_key != target_key {
                    emit_table_rename(&mut diff, source_key, target_key);
                }
                diff_matched_table(&mut diff, source_table, target_table, target_key, renames);
            }
            None => emit_create_table(&mut diff, target_key, target_table),
        }
    }

    // Tables present only in the source are dropped. Their indexes go
    // implicitly with them; their foreign keys are picked up below.
    for (source_key, source_table) in &source.tables {
        if !consumed_sources.contains(source_key.as_str()) {
            diff.operations.push(Operation::DropTable {
                table: source_key.clone(),
                previous: Some(source_table.clone()),
            });
        }
    }

    // Foreign keys are matched globally by constraint name. A changed
    // constraint (including one whose endpoint table was renamed) is
    // dropped and re-added; the sorter already runs drops first and adds
    // last, so the re-add lands after any rename.
    for (name, target_fk) in &target.foreign_keys {
        match source.foreign_keys.get(name) {
            Some(source_fk) if source_fk == target_fk => {}
            Some(source_fk) => {
                diff.operations.push(Operation::DropForeignKey {
                    name: name.clone(),
                    previous: Some(source_fk.clone()),
                });
                diff.operations.push(Operation::AddForeignKey {
                    foreign_key: target_fk.clone(),
                });
            }
            None => diff.operations.push(Operation::AddForeignKey {
                foreign_key: target_fk.clone(),
            }),
        }
    }
    for (name, source_fk) in &source.foreign_keys {
        if !target.foreign_keys.contains_key(name) {
            diff.operations.push(Operation::DropForeignKey {
                name: name.clone(),
                previous: Some(source_fk.clone()),
            });
        }
    }

    Ok(diff)
}

fn emit_table_rename(diff: &mut ModelDiff, source_key: &str, target_key: &str) {
    let (source_schema, source_name) = split_qualified(source_key);
    let (target_schema, target_name) = split_qualified(target_key);
    let mut current = source_key.to_string();
    if source_name != target_name {
        diff.operations.push(Operation::RenameTable {
            table: current,
            new_name: target_name.to_string(),
        });
        current = qualified(source_schema, target_name);
    }
    if source_schema != target_schema {
        diff.operations.push(Operation::MoveTable {
            table: current,
            new_schema: target_schema.map(str::to_string),
        });
    }
}

fn emit_create_table(diff: &mut ModelDiff, key: &str, table: &TableSnapshot) {
    diff.operations.push(Operation::CreateTable {
        table: key.to_string(),
        columns: table.columns.clone(),
        primary_key: table.primary_key.clone(),
    });
    for index in table.indexes.values() {
        diff.operations.push(Operation::CreateIndex {
            table: key.to_string(),
            index: index.clone(),
        });
    }
}

fn diff_matched_table(
    diff: &mut ModelDiff,
    source: &TableSnapshot,
    target: &TableSnapshot,
    target_key: &str,
    renames: &RenameLog,
) {
    let mut consumed: BTreeSet<&str> = BTreeSet::new();
    // Target column name -> source column name, for matched columns.
    let mut matched: Vec<(&str, &str)> = Vec::new();

    for target_col in &target.columns {
        let source_name = renames
            .column_source(target_key, &target_col.name)
            .unwrap_or(&target_col.name);
        match source.column_named(source_name) {
            Some(source_col) => {
                consumed.insert(source_name);
                matched.push((target_col.name.as_str(), source_name));
                if source_name != target_col.name {
                    diff.operations.push(Operation::RenameColumn {
                        table: target_key.to_string(),
                        column: source_name.to_string(),
                        new_name: target_col.name.clone(),
                    });
                }
                if !same_definition(source_col, target_col) {
                    diff.operations.push(Operation::AlterColumn {
                        table: target_key.to_string(),
                        column: target_col.clone(),
                        previous: Some(source_col.clone()),
                    });
                }
            }
            None => diff.operations.push(Operation::AddColumn {
                table: target_key.to_string(),
                column: target_col.clone(),
            }),
        }
    }

    for source_col in &source.columns {
        if !consumed.contains(source_col.name.as_str()) {
            diff.operations.push(Operation::DropColumn {
                table: target_key.to_string(),
                column: source_col.name.clone(),
                previous: Some(source_col.clone()),
            });
        }
    }

    // A pure reorder of surviving columns produces no operations, only a
    // warning: column positions are not migrated.
    let target_order: Vec<&str> = matched.iter().map(|(t, _)| *t).collect();
    let source_order: Vec<&str> = source
        .columns
        .iter()
        .filter_map(|c| {
            matched
                .iter()
                .find(|(_, s)| *s == c.name)
                .map(|(t, _)| *t)
        })
        .collect();
    if target_order != source_order {
        diff.warnings.push(DiffWarning::ColumnOrderChanged {
            table: target_key.to_string(),
        });
    }

    // Primary key comparison maps the source's columns through any renames
    // so a renamed key column alone does not count as a key change.
    let source_pk: Vec<&str> = source
        .primary_key
        .iter()
        .map(|name| {
            matched
                .iter()
                .find(|(_, s)| *s == name)
                .map_or(name.as_str(), |(t, _)| *t)
        })
        .collect();
    let target_pk: Vec<&str> = target.primary_key.iter().map(String::as_str).collect();
    if source_pk != target_pk {
        diff.warnings.push(DiffWarning::PrimaryKeyChanged {
            table: target_key.to_string(),
        });
    }

    for (name, target_index) in &target.indexes {
        match source.indexes.get(name) {
            Some(source_index) if source_index == target_index => {}
            Some(source_index) => {
                diff.operations.push(Operation::DropIndex {
                    table: target_key.to_string(),
                    index: name.clone(),
                    previous: Some(source_index.clone()),
                });
                diff.operations.push(Operation::CreateIndex {
                    table: target_key.to_string(),
                    index: target_index.clone(),
                });
            }
            None => diff.operations.push(Operation::CreateIndex {
                table: target_key.to_string(),
                index: target_index.clone(),
            }),
        }
    }
    for (name, source_index) in &source.indexes {
        if !target.indexes.contains_key(name) {
            diff.operations.push(Operation::DropIndex {
                table: target_key.to_string(),
                index: name.clone(),
                previous: Some(source_index.clone()),
            });
        }
    }
}

fn same_definition(a: &ColumnSnapshot, b: &ColumnSnapshot) -> bool {
    a.column_type == b.column_type
        && a.nullable == b.nullable
        && a.default == b.default
        && a.identity == b.identity
}
