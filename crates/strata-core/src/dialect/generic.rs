//! ANSI-flavored dialect.
//!
//! Uses standard type names and the trait's default rendering throughout.
//! Useful for scripting against providers without a dedicated dialect and
//! as the reference output in tests.

use super::Dialect;
use crate::snapshot::ColumnType;

/// Provider-neutral ANSI SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            ColumnType::Varchar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        }
    }
}
