//! Errors for planning and SQL generation.

use thiserror::Error;

/// Errors raised while validating snapshots, diffing, replaying operations
/// or ordering a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A table was created or renamed onto a name that already exists.
    #[error("table '{table}' already exists")]
    DuplicateTable {
        /// Qualified table name.
        table: String,
    },

    /// A table declares the same column name twice.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// An index was created with a name already used on the same table.
    #[error("index '{index}' already exists on table '{table}'")]
    DuplicateIndex {
        /// Qualified table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A foreign key was added with a constraint name already in use.
    #[error("foreign key '{name}' already exists")]
    DuplicateForeignKey {
        /// Constraint name.
        name: String,
    },

    /// An operation referenced a table that does not exist.
    #[error("table '{table}' not found ({context})")]
    MissingTable {
        /// Qualified table name.
        table: String,
        /// Where the reference came from.
        context: String,
    },

    /// An operation referenced a column that does not exist.
    #[error("column '{column}' not found in table '{table}' ({context})")]
    MissingColumn {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
        /// Where the reference came from.
        context: String,
    },

    /// An operation referenced an index that does not exist.
    #[error("index '{index}' not found on table '{table}'")]
    MissingIndex {
        /// Qualified table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// An operation referenced a foreign key that does not exist.
    #[error("foreign key '{name}' not found")]
    MissingForeignKey {
        /// Constraint name.
        name: String,
    },

    /// Ordering could not make progress because the remaining operations
    /// depend on each other.
    #[error("dependency cycle between operations: {}", nodes.join(", "))]
    DependencyCycle {
        /// Descriptions of the operations still blocked.
        nodes: Vec<String>,
    },

    /// An irreversible placeholder reached a stage that needs a real
    /// operation.
    #[error("operation is irreversible: {description}")]
    Irreversible {
        /// What was lost when the inverse was synthesized.
        description: String,
    },
}

/// Errors raised while rendering operations as SQL for a dialect.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The dialect cannot express this operation.
    #[error("operation '{operation}' is not supported by the {provider} provider")]
    Unsupported {
        /// Human-readable operation description.
        operation: String,
        /// Provider name (e.g. "sqlite").
        provider: String,
    },

    /// The operation lacks a recorded detail the SQL needs.
    #[error("cannot render {operation}: {missing}")]
    Incomplete {
        /// Human-readable operation description.
        operation: String,
        /// What was not recorded.
        missing: String,
    },

    /// An identifier in the operation is longer than the provider accepts.
    #[error("identifier '{identifier}' exceeds the {provider} limit of {limit} characters")]
    IdentifierTooLong {
        /// The offending identifier.
        identifier: String,
        /// The provider's maximum identifier length.
        limit: usize,
        /// Provider name (e.g. "postgres").
        provider: String,
    },

    /// The operation is a placeholder for a lost original and cannot be
    /// rendered at all.
    #[error("cannot generate SQL for irreversible operation: {description}")]
    Irreversible {
        /// Description of the original operation that cannot be undone.
        description: String,
    },
}
