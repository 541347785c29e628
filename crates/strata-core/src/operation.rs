//! Schema change operations.
//!
//! [`Operation`] is the closed set of atomic schema changes the engine
//! understands. The differ emits them, the sorter orders them, the inverse
//! synthesizer flips them, and each dialect renders them as SQL. Keeping
//! the union closed means every consumer matches exhaustively and the
//! compiler flags any consumer missed when a new kind is added.
//!
//! Tables are identified by their schema-qualified name throughout
//! (`sales.Order`, or just `Order` in the default schema).

use serde::{Deserialize, Serialize};

use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot};

/// One atomic schema change.
///
/// Drop operations carry an optional `previous` payload describing the
/// object being removed. The differ always fills it in; it is what makes
/// the drop invertible. A drop deserialized without it still applies, but
/// its inverse degrades to [`Operation::Irreversible`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a table with its columns and primary key.
    ///
    /// Indexes and foreign keys of a new table travel as separate
    /// [`Operation::CreateIndex`] and [`Operation::AddForeignKey`]
    /// operations so the sorter can schedule them after their targets.
    CreateTable {
        /// Qualified table name.
        table: String,
        /// Columns in declaration order.
        columns: Vec<ColumnSnapshot>,
        /// Primary key column names.
        primary_key: Vec<String>,
    },

    /// Drop a table.
    DropTable {
        /// Qualified table name.
        table: String,
        /// The table as it existed before the drop.
        previous: Option<TableSnapshot>,
    },

    /// Move a table to a different schema.
    MoveTable {
        /// Current qualified table name.
        table: String,
        /// Destination schema, or `None` for the default schema.
        new_schema: Option<String>,
    },

    /// Rename a table within its schema.
    RenameTable {
        /// Current qualified table name.
        table: String,
        /// New bare table name.
        new_name: String,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Qualified table name.
        table: String,
        /// The column to add.
        column: ColumnSnapshot,
    },

    /// Drop a column.
    DropColumn {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
        /// The column as it existed before the drop.
        previous: Option<ColumnSnapshot>,
    },

    /// Change a column's type, nullability or default.
    AlterColumn {
        /// Qualified table name.
        table: String,
        /// The column's new definition.
        column: ColumnSnapshot,
        /// The column's definition before the change.
        previous: Option<ColumnSnapshot>,
    },

    /// Rename a column.
    RenameColumn {
        /// Qualified table name.
        table: String,
        /// Current column name.
        column: String,
        /// New column name.
        new_name: String,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// The constraint to add.
        foreign_key: ForeignKeySnapshot,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Constraint name.
        name: String,
        /// The constraint as it existed before the drop.
        previous: Option<ForeignKeySnapshot>,
    },

    /// Create an index.
    CreateIndex {
        /// Qualified table name.
        table: String,
        /// The index to create.
        index: IndexSnapshot,
    },

    /// Drop an index.
    DropIndex {
        /// Qualified table name.
        table: String,
        /// Index name.
        index: String,
        /// The index as it existed before the drop.
        previous: Option<IndexSnapshot>,
    },

    /// Raw SQL escape hatch for changes the closed set cannot express.
    Sql {
        /// The statement text, passed through verbatim.
        sql: String,
        /// Run outside the migration transaction (for statements the
        /// provider refuses to run inside one).
        suppress_transaction: bool,
    },

    /// Placeholder for an operation whose inverse could not be derived.
    ///
    /// Never emitted by the differ; only the inverse synthesizer produces
    /// it. Generating SQL for it is an error, which is how rollback through
    /// a lossy migration gets refused.
    Irreversible {
        /// What was lost, for the error message.
        description: String,
    },
}

impl Operation {
    /// Short human-readable form used in errors and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("create table '{table}'"),
            Self::DropTable { table, .. } => format!("drop table '{table}'"),
            Self::MoveTable { table, new_schema } => match new_schema {
                Some(schema) => format!("move table '{table}' to schema '{schema}'"),
                None => format!("move table '{table}' to default schema"),
            },
            Self::RenameTable { table, new_name } => {
                format!("rename table '{table}' to '{new_name}'")
            }
            Self::AddColumn { table, column } => {
                format!("add column '{table}.{}'", column.name)
            }
            Self::DropColumn { table, column, .. } => format!("drop column '{table}.{column}'"),
            Self::AlterColumn { table, column, .. } => {
                format!("alter column '{table}.{}'", column.name)
            }
            Self::RenameColumn {
                table,
                column,
                new_name,
            } => format!("rename column '{table}.{column}' to '{new_name}'"),
            Self::AddForeignKey { foreign_key } => {
                format!("add foreign key '{}'", foreign_key.name)
            }
            Self::DropForeignKey { name, .. } => format!("drop foreign key '{name}'"),
            Self::CreateIndex { table, index } => {
                format!("create index '{}' on '{table}'", index.name)
            }
            Self::DropIndex { table, index, .. } => {
                format!("drop index '{index}' on '{table}'")
            }
            Self::Sql { .. } => "raw SQL".to_string(),
            Self::Irreversible { description } => format!("irreversible ({description})"),
        }
    }

    /// Returns `true` if applying this operation can discard stored data.
    ///
    /// Dropping a table or column always can. Altering a column counts
    /// when the new type cannot hold every value of the old one; without
    /// the previous definition the answer is conservatively `true`.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::DropTable { .. } | Self::DropColumn { .. } => true,
            Self::AlterColumn {
                column, previous, ..
            } => previous.as_ref().map_or(true, |prev| {
                column.column_type.narrower_than(&prev.column_type)
                    || (!column.nullable && prev.nullable)
            }),
            _ => false,
        }
    }

    /// Returns `true` for the placeholder standing in for a lost inverse.
    #[must_use]
    pub fn is_irreversible(&self) -> bool {
        matches!(self, Self::Irreversible { .. })
    }
}
