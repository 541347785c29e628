//! Dialect-specific SQL generation.
//!
//! [`Dialect`] is the single seam between abstract operations and concrete
//! DDL. Each method renders one operation kind; ANSI-flavored defaults
//! cover the common ground and each provider overrides what it does
//! differently (type names, identity columns, missing ALTER support).
//! [`Dialect::generate`] dispatches exhaustively over the operation union,
//! so adding an operation kind breaks compilation here until every dialect
//! has an answer for it.
//!
//! Generation is pure string building with no cross-operation state; a
//! dialect never sees more than one operation at a time.

mod generic;
mod postgres;
mod sqlite;

pub use generic::GenericDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::GenerateError;
use crate::operation::Operation;
use crate::snapshot::{
    split_qualified, ColumnSnapshot, ColumnType, DefaultValue, ForeignKeySnapshot, IndexSnapshot,
};

/// Renders operations as SQL for one provider.
pub trait Dialect {
    /// Provider name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Maps a column type to the provider's type name.
    fn type_name(&self, ty: &ColumnType) -> String;

    /// Longest identifier the provider accepts, if it enforces a limit.
    fn max_identifier_length(&self) -> Option<usize> {
        None
    }

    /// Quotes an identifier.
    fn quote(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }

    /// Renders a possibly schema-qualified table reference.
    fn table_reference(&self, qualified: &str) -> String {
        let (schema, name) = split_qualified(qualified);
        match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(name)),
            None => self.quote(name),
        }
    }

    /// Clause marking a column as store-generated.
    fn identity_clause(&self) -> &'static str {
        "GENERATED BY DEFAULT AS IDENTITY"
    }

    /// Renders a default value as a SQL literal.
    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            // Single quotes are doubled for escaping.
            DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Expression(e) => e.clone(),
        }
    }

    /// Renders one column of a CREATE TABLE or ADD COLUMN.
    fn column_definition(&self, column: &ColumnSnapshot) -> String {
        let mut parts = vec![
            self.quote(&column.name),
            self.type_name(&column.column_type),
        ];
        if column.identity {
            parts.push(self.identity_clause().to_string());
        }
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", self.default_literal(default)));
        }
        parts.join(" ")
    }

    /// Renders a CREATE TABLE with inline primary key.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the table.
    fn create_table(
        &self,
        table: &str,
        columns: &[ColumnSnapshot],
        primary_key: &[String],
    ) -> Result<Vec<String>, GenerateError> {
        let mut lines: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if !primary_key.is_empty() {
            let cols = primary_key
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("PRIMARY KEY ({cols})"));
        }
        Ok(vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table_reference(table),
            lines.join(",\n    ")
        )])
    }

    /// Renders a DROP TABLE.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the drop.
    fn drop_table(&self, table: &str) -> Result<Vec<String>, GenerateError> {
        Ok(vec![format!("DROP TABLE {}", self.table_reference(table))])
    }

    /// Renders a schema move.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Unsupported`] when the provider has no
    /// schema namespaces, or when the default schema has no known name.
    fn move_table(
        &self,
        table: &str,
        new_schema: Option<&str>,
    ) -> Result<Vec<String>, GenerateError> {
        let Some(schema) = new_schema else {
            return Err(GenerateError::Unsupported {
                operation: format!("move table '{table}' to default schema"),
                provider: self.name().to_string(),
            });
        };
        Ok(vec![format!(
            "ALTER TABLE {} SET SCHEMA {}",
            self.table_reference(table),
            self.quote(schema)
        )])
    }

    /// Renders a table rename.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the rename.
    fn rename_table(&self, table: &str, new_name: &str) -> Result<Vec<String>, GenerateError> {
        Ok(vec![format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table_reference(table),
            self.quote(new_name)
        )])
    }

    /// Renders an ADD COLUMN.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the change.
    fn add_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
    ) -> Result<Vec<String>, GenerateError> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_reference(table),
            self.column_definition(column)
        )])
    }

    /// Renders a DROP COLUMN.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the change.
    fn drop_column(&self, table: &str, column: &str) -> Result<Vec<String>, GenerateError> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.table_reference(table),
            self.quote(column)
        )])
    }

    /// Renders a column redefinition as one statement per changed aspect.
    ///
    /// Without a recorded previous definition every aspect is restated.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Unsupported`] for aspects the provider
    /// cannot change in place (identity).
    fn alter_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
        previous: Option<&ColumnSnapshot>,
    ) -> Result<Vec<String>, GenerateError> {
        if previous.map_or(false, |p| p.identity != column.identity) {
            return Err(GenerateError::Unsupported {
                operation: format!("change identity of column '{table}.{}'", column.name),
                provider: self.name().to_string(),
            });
        }
        let t = self.table_reference(table);
        let c = self.quote(&column.name);
        let mut statements = Vec::new();
        if previous.map_or(true, |p| p.column_type != column.column_type) {
            statements.push(format!(
                "ALTER TABLE {t} ALTER COLUMN {c} SET DATA TYPE {}",
                self.type_name(&column.column_type)
            ));
        }
        if previous.map_or(true, |p| p.nullable != column.nullable) {
            statements.push(if column.nullable {
                format!("ALTER TABLE {t} ALTER COLUMN {c} DROP NOT NULL")
            } else {
                format!("ALTER TABLE {t} ALTER COLUMN {c} SET NOT NULL")
            });
        }
        if previous.map_or(true, |p| p.default != column.default) {
            statements.push(match &column.default {
                Some(value) => format!(
                    "ALTER TABLE {t} ALTER COLUMN {c} SET DEFAULT {}",
                    self.default_literal(value)
                ),
                None => format!("ALTER TABLE {t} ALTER COLUMN {c} DROP DEFAULT"),
            });
        }
        Ok(statements)
    }

    /// Renders a column rename.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the rename.
    fn rename_column(
        &self,
        table: &str,
        column: &str,
        new_name: &str,
    ) -> Result<Vec<String>, GenerateError> {
        Ok(vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.table_reference(table),
            self.quote(column),
            self.quote(new_name)
        )])
    }

    /// Renders an ADD CONSTRAINT ... FOREIGN KEY.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot add constraints to
    /// existing tables.
    fn add_foreign_key(&self, fk: &ForeignKeySnapshot) -> Result<Vec<String>, GenerateError> {
        let from_cols = fk
            .column_pairs
            .iter()
            .map(|(from, _)| self.quote(from))
            .collect::<Vec<_>>()
            .join(", ");
        let to_cols = fk
            .column_pairs
            .iter()
            .map(|(_, to)| self.quote(to))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({from_cols}) REFERENCES {} ({to_cols})",
            self.table_reference(&fk.from_table),
            self.quote(&fk.name),
            self.table_reference(&fk.to_table)
        );
        if fk.cascade_delete {
            sql.push_str(" ON DELETE CASCADE");
        }
        Ok(vec![sql])
    }

    /// Renders a DROP CONSTRAINT.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Incomplete`] when the constraint's
    /// referencing table was not recorded.
    fn drop_foreign_key(
        &self,
        name: &str,
        previous: Option<&ForeignKeySnapshot>,
    ) -> Result<Vec<String>, GenerateError> {
        let Some(previous) = previous else {
            return Err(GenerateError::Incomplete {
                operation: format!("drop foreign key '{name}'"),
                missing: "referencing table was not recorded".to_string(),
            });
        };
        Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.table_reference(&previous.from_table),
            self.quote(name)
        )])
    }

    /// Renders a CREATE INDEX.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the index.
    fn create_index(
        &self,
        table: &str,
        index: &IndexSnapshot,
    ) -> Result<Vec<String>, GenerateError> {
        let cols = index
            .columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let unique = if index.unique { "UNIQUE " } else { "" };
        Ok(vec![format!(
            "CREATE {unique}INDEX {} ON {} ({cols})",
            self.quote(&index.name),
            self.table_reference(table)
        )])
    }

    /// Renders a DROP INDEX.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the dialect cannot express the drop.
    fn drop_index(&self, table: &str, index: &str) -> Result<Vec<String>, GenerateError> {
        // The index lives in its table's schema.
        let (schema, _) = split_qualified(table);
        let reference = match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(index)),
            None => self.quote(index),
        };
        Ok(vec![format!("DROP INDEX {reference}")])
    }

    /// Renders one operation as its SQL statements.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when the dialect cannot express the
    /// operation, an identifier exceeds the provider's length limit, or
    /// the operation is an irreversible placeholder.
    fn generate(&self, op: &Operation) -> Result<Vec<String>, GenerateError> {
        if let Some(limit) = self.max_identifier_length() {
            if let Some(long) = identifiers(op).into_iter().find(|i| i.len() > limit) {
                return Err(GenerateError::IdentifierTooLong {
                    identifier: long.to_string(),
                    limit,
                    provider: self.name().to_string(),
                });
            }
        }
        match op {
            Operation::CreateTable {
                table,
                columns,
                primary_key,
            } => self.create_table(table, columns, primary_key),
            Operation::DropTable { table, .. } => self.drop_table(table),
            Operation::MoveTable { table, new_schema } => {
                self.move_table(table, new_schema.as_deref())
            }
            Operation::RenameTable { table, new_name } => self.rename_table(table, new_name),
            Operation::AddColumn { table, column } => self.add_column(table, column),
            Operation::DropColumn { table, column, .. } => self.drop_column(table, column),
            Operation::AlterColumn {
                table,
                column,
                previous,
            } => self.alter_column(table, column, previous.as_ref()),
            Operation::RenameColumn {
                table,
                column,
                new_name,
            } => self.rename_column(table, column, new_name),
            Operation::AddForeignKey { foreign_key } => self.add_foreign_key(foreign_key),
            Operation::DropForeignKey { name, previous } => {
                self.drop_foreign_key(name, previous.as_ref())
            }
            Operation::CreateIndex { table, index } => self.create_index(table, index),
            Operation::DropIndex { table, index, .. } => self.drop_index(table, index),
            Operation::Sql { sql, .. } => Ok(vec![sql.clone()]),
            Operation::Irreversible { description } => Err(GenerateError::Irreversible {
                description: description.clone(),
            }),
        }
    }
}

/// Collects every identifier an operation names, with qualified table
/// names split into their schema and name parts.
fn identifiers(op: &Operation) -> Vec<&str> {
    fn push_table<'a>(names: &mut Vec<&'a str>, qualified: &'a str) {
        let (schema, name) = split_qualified(qualified);
        if let Some(schema) = schema {
            names.push(schema);
        }
        names.push(name);
    }

    let mut names = Vec::new();
    match op {
        Operation::CreateTable { table, columns, .. } => {
            push_table(&mut names, table);
            names.extend(columns.iter().map(|c| c.name.as_str()));
        }
        Operation::DropTable { table, .. } => push_table(&mut names, table),
        Operation::MoveTable { table, new_schema } => {
            push_table(&mut names, table);
            if let Some(schema) = new_schema {
                names.push(schema);
            }
        }
        Operation::RenameTable { table, new_name } => {
            push_table(&mut names, table);
            names.push(new_name);
        }
        Operation::AddColumn { table, column } => {
            push_table(&mut names, table);
            names.push(&column.name);
        }
        Operation::DropColumn { table, column, .. } => {
            push_table(&mut names, table);
            names.push(column);
        }
        Operation::AlterColumn { table, column, .. } => {
            push_table(&mut names, table);
            names.push(&column.name);
        }
        Operation::RenameColumn {
            table,
            column,
            new_name,
        } => {
            push_table(&mut names, table);
            names.push(column);
            names.push(new_name);
        }
        Operation::AddForeignKey { foreign_key } => {
            names.push(&foreign_key.name);
            push_table(&mut names, &foreign_key.from_table);
            push_table(&mut names, &foreign_key.to_table);
            for (from, to) in &foreign_key.column_pairs {
                names.push(from);
                names.push(to);
            }
        }
        Operation::DropForeignKey { name, .. } => names.push(name),
        Operation::CreateIndex { table, index } => {
            push_table(&mut names, table);
            names.push(&index.name);
            names.extend(index.columns.iter().map(String::as_str));
        }
        Operation::DropIndex { table, index, .. } => {
            push_table(&mut names, table);
            names.push(index);
        }
        Operation::Sql { .. } | Operation::Irreversible { .. } => {}
    }
    names
}
