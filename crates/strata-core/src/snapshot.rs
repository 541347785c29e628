//! Model snapshot types.
//!
//! A [`ModelSnapshot`] is an immutable description of one version of the
//! schema: tables with their columns, primary keys and indexes, plus the
//! foreign keys between tables. Snapshots are produced by the model layer,
//! compared structurally by the differ, and embedded (serialized) in the
//! migration history so later runs can reconstruct what was applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Column data types understood by the migration engine.
///
/// Dialects map these to provider-specific type names; the engine itself
/// only compares them structurally and reasons about relative capacity
/// (see [`ColumnType::narrower_than`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Small integer (16-bit).
    SmallInt,
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Variable-length character string with a maximum length.
    Varchar(u32),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Binary data.
    Binary,
    /// Date and time.
    Timestamp,
    /// Date only.
    Date,
    /// UUID.
    Uuid,
}

impl ColumnType {
    /// Returns `true` if changing a column from `other` to `self` risks
    /// truncating stored values: a shorter varchar, a decimal with less
    /// precision or scale, a smaller integer family member, or a change
    /// to an unrelated type family.
    #[must_use]
    pub fn narrower_than(&self, other: &Self) -> bool {
        match (self, other) {
            _ if self == other => false,
            (Self::Varchar(a), Self::Varchar(b)) => a < b,
            (Self::Varchar(_), Self::Text) => true,
            (Self::Text, Self::Varchar(_)) => false,
            (Self::Decimal(p1, s1), Self::Decimal(p2, s2)) => p1 < p2 || s1 < s2,
            (Self::SmallInt, Self::Integer | Self::BigInt)
            | (Self::Integer, Self::BigInt)
            | (Self::Real, Self::Double) => true,
            (Self::BigInt, Self::SmallInt | Self::Integer)
            | (Self::Integer, Self::SmallInt)
            | (Self::Double, Self::Real) => false,
            // Cross-family changes cannot be proven lossless.
            _ => true,
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

/// A column in a table snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: String,
    /// Data type.
    pub column_type: ColumnType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Whether the store generates values for this column (identity).
    pub identity: bool,
}

impl ColumnSnapshot {
    /// Creates a nullable column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            identity: false,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the column as store-generated (identity).
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index name, unique within its table.
    pub name: String,
    /// Columns covered, in index order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

impl IndexSnapshot {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A foreign key constraint between two tables.
///
/// Foreign keys live at snapshot level (not inside a table) and are
/// identified by their constraint name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name, unique within the snapshot.
    pub name: String,
    /// Qualified name of the referencing table.
    pub from_table: String,
    /// Qualified name of the referenced table.
    pub to_table: String,
    /// Pairs of (referencing column, referenced column).
    pub column_pairs: Vec<(String, String)>,
    /// Whether deletes cascade from the referenced table.
    pub cascade_delete: bool,
}

impl ForeignKeySnapshot {
    /// Creates a foreign key with no column pairs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        from_table: impl Into<String>,
        to_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_table: from_table.into(),
            to_table: to_table.into(),
            column_pairs: Vec::new(),
            cascade_delete: false,
        }
    }

    /// Adds a (referencing, referenced) column pair.
    #[must_use]
    pub fn pair(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.column_pairs.push((from.into(), to.into()));
        self
    }

    /// Enables ON DELETE CASCADE.
    #[must_use]
    pub fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }
}

/// A table in a model snapshot.
///
/// Column order is significant (it is the declaration order); indexes are
/// an unordered set keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Schema (namespace) the table lives in, or the provider default.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSnapshot>,
    /// Primary key column names.
    pub primary_key: Vec<String>,
    /// Indexes keyed by name.
    pub indexes: BTreeMap<String, IndexSnapshot>,
}

impl TableSnapshot {
    /// Creates an empty table in the default schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Places the table in the given schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSnapshot) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexSnapshot) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Returns the schema-qualified name used as the table's identity.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified(self.schema.as_deref(), &self.name)
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column_named(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One complete version of the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Tables keyed by qualified name.
    pub tables: BTreeMap<String, TableSnapshot>,
    /// Foreign keys keyed by constraint name.
    pub foreign_keys: BTreeMap<String, ForeignKeySnapshot>,
}

impl ModelSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, keyed by its qualified name.
    #[must_use]
    pub fn table(mut self, table: TableSnapshot) -> Self {
        self.tables.insert(table.qualified_name(), table);
        self
    }

    /// Adds a foreign key, keyed by its constraint name.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeySnapshot) -> Self {
        self.foreign_keys.insert(fk.name.clone(), fk);
        self
    }

    /// Looks up a table by qualified name.
    #[must_use]
    pub fn table_named(&self, qualified: &str) -> Option<&TableSnapshot> {
        self.tables.get(qualified)
    }

    /// Returns `true` if the snapshot describes no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.foreign_keys.is_empty()
    }

    /// Checks the snapshot's internal consistency.
    ///
    /// Well-formedness is a precondition of the differ and replay: duplicate
    /// column names, primary keys or indexes referencing missing columns,
    /// and foreign keys referencing missing tables or columns are all fatal
    /// input errors.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found as a [`PlanError`].
    pub fn validate(&self) -> Result<(), PlanError> {
        for (key, table) in &self.tables {
            for (i, column) in table.columns.iter().enumerate() {
                if table.columns[..i].iter().any(|c| c.name == column.name) {
                    return Err(PlanError::DuplicateColumn {
                        table: key.clone(),
                        column: column.name.clone(),
                    });
                }
            }
            for pk in &table.primary_key {
                if table.column_named(pk).is_none() {
                    return Err(PlanError::MissingColumn {
                        table: key.clone(),
                        column: pk.clone(),
                        context: "primary key".to_string(),
                    });
                }
            }
            for index in table.indexes.values() {
                for col in &index.columns {
                    if table.column_named(col).is_none() {
                        return Err(PlanError::MissingColumn {
                            table: key.clone(),
                            column: col.clone(),
                            context: format!("index '{}'", index.name),
                        });
                    }
                }
            }
        }
        for fk in self.foreign_keys.values() {
            let from = self.tables.get(&fk.from_table).ok_or_else(|| {
                PlanError::MissingTable {
                    table: fk.from_table.clone(),
                    context: format!("foreign key '{}'", fk.name),
                }
            })?;
            let to = self.tables.get(&fk.to_table).ok_or_else(|| {
                PlanError::MissingTable {
                    table: fk.to_table.clone(),
                    context: format!("foreign key '{}'", fk.name),
                }
            })?;
            for (from_col, to_col) in &fk.column_pairs {
                if from.column_named(from_col).is_none() {
                    return Err(PlanError::MissingColumn {
                        table: fk.from_table.clone(),
                        column: from_col.clone(),
                        context: format!("foreign key '{}'", fk.name),
                    });
                }
                if to.column_named(to_col).is_none() {
                    return Err(PlanError::MissingColumn {
                        table: fk.to_table.clone(),
                        column: to_col.clone(),
                        context: format!("foreign key '{}'", fk.name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Joins a schema and a bare table name into the qualified identity key.
#[must_use]
pub fn qualified(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

/// Splits a qualified name back into (schema, bare name).
#[must_use]
pub fn split_qualified(qualified: &str) -> (Option<&str>, &str) {
    match qualified.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, qualified),
    }
}
