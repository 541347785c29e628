//! PostgreSQL dialect.
//!
//! Postgres supports the full operation set; only type names and the name
//! of the default schema differ from the ANSI baseline.

use super::Dialect;
use crate::error::GenerateError;
use crate::snapshot::ColumnType;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    // NAMEDATALEN is 64; one byte goes to the terminator.
    fn max_identifier_length(&self) -> Option<usize> {
        Some(63)
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal(p, s) => format!("NUMERIC({p}, {s})"),
            ColumnType::Varchar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Timestamp => "TIMESTAMPTZ".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        }
    }

    fn move_table(
        &self,
        table: &str,
        new_schema: Option<&str>,
    ) -> Result<Vec<String>, GenerateError> {
        // The default schema has a name here.
        let schema = new_schema.unwrap_or("public");
        Ok(vec![format!(
            "ALTER TABLE {} SET SCHEMA {}",
            self.table_reference(table),
            self.quote(schema)
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ColumnSnapshot;

    #[test]
    fn type_names_are_postgres_spellings() {
        assert_eq!(PostgresDialect.type_name(&ColumnType::Binary), "BYTEA");
        assert_eq!(
            PostgresDialect.type_name(&ColumnType::Timestamp),
            "TIMESTAMPTZ"
        );
        assert_eq!(
            PostgresDialect.type_name(&ColumnType::Decimal(10, 2)),
            "NUMERIC(10, 2)"
        );
    }

    #[test]
    fn identity_columns_use_standard_identity_syntax() {
        let column = ColumnSnapshot::new("Id", ColumnType::BigInt).identity();
        assert_eq!(
            PostgresDialect.column_definition(&column),
            r#""Id" BIGINT GENERATED BY DEFAULT AS IDENTITY NOT NULL"#
        );
    }

    #[test]
    fn moving_to_the_default_schema_targets_public() {
        let sql = PostgresDialect.move_table("sales.Order", None).unwrap();
        assert_eq!(
            sql,
            vec![r#"ALTER TABLE "sales"."Order" SET SCHEMA "public""#.to_string()]
        );
    }

    #[test]
    fn dropping_a_schema_qualified_index_qualifies_the_index() {
        let sql = PostgresDialect
            .drop_index("sales.Order", "IX_Order_Number")
            .unwrap();
        assert_eq!(
            sql,
            vec![r#"DROP INDEX "sales"."IX_Order_Number""#.to_string()]
        );
    }
}
