//! SQLite dialect.
//!
//! SQLite's ALTER TABLE covers renames, ADD COLUMN and DROP COLUMN and
//! nothing else: no ALTER COLUMN, no adding or dropping constraints on an
//! existing table, no schema namespaces. Those operations fail generation
//! here instead of producing SQL the engine would reject, so the refusal
//! happens before any transaction opens.

use super::Dialect;
use crate::error::GenerateError;
use crate::snapshot::{ColumnSnapshot, ColumnType, DefaultValue, ForeignKeySnapshot};

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

fn is_integer(ty: &ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
    )
}

impl SqliteDialect {
    fn unsupported(&self, operation: String) -> GenerateError {
        GenerateError::Unsupported {
            operation,
            provider: self.name().to_string(),
        }
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        match ty {
            // SQLite uses INTEGER for all integer widths.
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => {
                "INTEGER".to_string()
            }
            ColumnType::Real | ColumnType::Double => "REAL".to_string(),
            ColumnType::Decimal(_, _) => "NUMERIC".to_string(),
            // Dates, timestamps and UUIDs are stored as ISO-8601/hex text.
            ColumnType::Varchar(_)
            | ColumnType::Text
            | ColumnType::Timestamp
            | ColumnType::Date
            | ColumnType::Uuid => "TEXT".to_string(),
            ColumnType::Boolean => "INTEGER".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
        }
    }

    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            // Booleans are stored as integers.
            DefaultValue::Bool(true) => "1".to_string(),
            DefaultValue::Bool(false) => "0".to_string(),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Expression(e) => e.clone(),
        }
    }

    fn create_table(
        &self,
        table: &str,
        columns: &[ColumnSnapshot],
        primary_key: &[String],
    ) -> Result<Vec<String>, GenerateError> {
        // A single-column integer identity key becomes the rowid alias;
        // AUTOINCREMENT is only valid in that position.
        let inline_pk = primary_key.len() == 1
            && columns
                .iter()
                .any(|c| c.name == primary_key[0] && c.identity && is_integer(&c.column_type));
        let mut lines = Vec::with_capacity(columns.len() + 1);
        for column in columns {
            if inline_pk && column.name == primary_key[0] {
                lines.push(format!(
                    "{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL",
                    self.quote(&column.name)
                ));
            } else if column.identity {
                return Err(self.unsupported(format!(
                    "identity column '{table}.{}' outside a single-column integer key",
                    column.name
                )));
            } else {
                lines.push(self.column_definition(column));
            }
        }
        if !inline_pk && !primary_key.is_empty() {
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

    fn add_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
    ) -> Result<Vec<String>, GenerateError> {
        if column.identity {
            return Err(self.unsupported(format!(
                "add identity column '{table}.{}'",
                column.name
            )));
        }
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_reference(table),
            self.column_definition(column)
        )])
    }

    fn alter_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
        _previous: Option<&ColumnSnapshot>,
    ) -> Result<Vec<String>, GenerateError> {
        Err(self.unsupported(format!("alter column '{table}.{}'", column.name)))
    }

    fn move_table(
        &self,
        table: &str,
        _new_schema: Option<&str>,
    ) -> Result<Vec<String>, GenerateError> {
        Err(self.unsupported(format!("move table '{table}' between schemas")))
    }

    fn add_foreign_key(&self, fk: &ForeignKeySnapshot) -> Result<Vec<String>, GenerateError> {
        Err(self.unsupported(format!(
            "add foreign key '{}' to existing table '{}'",
            fk.name, fk.from_table
        )))
    }

    fn drop_foreign_key(
        &self,
        name: &str,
        _previous: Option<&ForeignKeySnapshot>,
    ) -> Result<Vec<String>, GenerateError> {
        Err(self.unsupported(format!("drop foreign key '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::IndexSnapshot;

    #[test]
    fn integer_identity_key_becomes_rowid_alias() {
        let sql = SqliteDialect
            .create_table(
                "Customer",
                &[
                    ColumnSnapshot::new("Id", ColumnType::Integer).identity(),
                    ColumnSnapshot::new("Name", ColumnType::Varchar(100)).not_null(),
                ],
                &["Id".to_string()],
            )
            .unwrap();
        let expected = "CREATE TABLE \"Customer\" (\n    \
                        \"Id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n    \
                        \"Name\" TEXT NOT NULL\n)";
        assert_eq!(sql, vec![expected.to_string()]);
    }

    #[test]
    fn composite_key_stays_at_table_level() {
        let sql = SqliteDialect
            .create_table(
                "OrderLine",
                &[
                    ColumnSnapshot::new("OrderId", ColumnType::Integer).not_null(),
                    ColumnSnapshot::new("LineNo", ColumnType::Integer).not_null(),
                ],
                &["OrderId".to_string(), "LineNo".to_string()],
            )
            .unwrap();
        assert!(sql[0].contains("PRIMARY KEY (\"OrderId\", \"LineNo\")"));
    }

    #[test]
    fn alter_column_is_unsupported() {
        let err = SqliteDialect
            .alter_column(
                "Customer",
                &ColumnSnapshot::new("Name", ColumnType::Text),
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Unsupported { provider, .. } if provider == "sqlite"
        ));
    }

    #[test]
    fn constraint_changes_on_existing_tables_are_unsupported() {
        let fk = ForeignKeySnapshot::new("FK_Order_Customer", "Order", "Customer")
            .pair("CustomerId", "Id");
        assert!(SqliteDialect.add_foreign_key(&fk).is_err());
        assert!(SqliteDialect
            .drop_foreign_key("FK_Order_Customer", Some(&fk))
            .is_err());
    }

    #[test]
    fn boolean_defaults_render_as_integers() {
        let column = ColumnSnapshot::new("Active", ColumnType::Boolean)
            .default_value(DefaultValue::Bool(true));
        assert_eq!(
            SqliteDialect.column_definition(&column),
            r#""Active" INTEGER DEFAULT 1"#
        );
    }

    #[test]
    fn index_rendering_uses_text_affinity_types_elsewhere() {
        let index = IndexSnapshot::new("IX_Customer_Name", vec!["Name".to_string()]);
        let sql = SqliteDialect.create_index("Customer", &index).unwrap();
        assert_eq!(
            sql,
            vec![r#"CREATE INDEX "IX_Customer_Name" ON "Customer" ("Name")"#.to_string()]
        );
    }
}
