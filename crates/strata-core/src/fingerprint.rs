//! Model fingerprinting.
//!
//! A fingerprint is a blake3 digest over a normalized byte stream of the
//! snapshot. Two snapshots that are structurally equal always hash to the
//! same value regardless of how they were built, so fingerprints can be
//! compared cheaply to decide whether the current model matches what the
//! history says was applied.

use blake3::Hasher;

use crate::snapshot::{
    ColumnSnapshot, ColumnType, DefaultValue, ForeignKeySnapshot, IndexSnapshot, ModelSnapshot,
    TableSnapshot,
};

/// Computes the hex fingerprint of a model snapshot.
#[must_use]
pub fn fingerprint(model: &ModelSnapshot) -> String {
    let mut hasher = Hasher::new();
    write_model(&mut hasher, model);
    hasher.finalize().to_hex().to_string()
}

/// Returns `true` if two snapshots have the same fingerprint.
#[must_use]
pub fn models_match(a: &ModelSnapshot, b: &ModelSnapshot) -> bool {
    fingerprint(a) == fingerprint(b)
}

fn write_model(h: &mut Hasher, model: &ModelSnapshot) {
    write_len(h, model.tables.len());
    for table in model.tables.values() {
        write_table(h, table);
    }
    write_len(h, model.foreign_keys.len());
    for fk in model.foreign_keys.values() {
        write_foreign_key(h, fk);
    }
}

fn write_table(h: &mut Hasher, table: &TableSnapshot) {
    write_opt_str(h, table.schema.as_deref());
    write_str(h, &table.name);
    write_len(h, table.columns.len());
    for column in &table.columns {
        write_column(h, column);
    }
    write_len(h, table.primary_key.len());
    for pk in &table.primary_key {
        write_str(h, pk);
    }
    write_len(h, table.indexes.len());
    for index in table.indexes.values() {
        write_index(h, index);
    }
}

fn write_column(h: &mut Hasher, column: &ColumnSnapshot) {
    write_str(h, &column.name);
    write_type(h, &column.column_type);
    h.update(&[u8::from(column.nullable), u8::from(column.identity)]);
    match &column.default {
        None => {
            h.update(&[0]);
        }
        Some(value) => {
            h.update(&[1]);
            write_default(h, value);
        }
    }
}

fn write_type(h: &mut Hasher, ty: &ColumnType) {
    // Each variant gets a fixed tag so reordering the enum keeps old
    // fingerprints stable only if the tags are kept stable too.
    match ty {
        ColumnType::SmallInt => h.update(&[0]),
        ColumnType::Integer => h.update(&[1]),
        ColumnType::BigInt => h.update(&[2]),
        ColumnType::Real => h.update(&[3]),
        ColumnType::Double => h.update(&[4]),
        ColumnType::Decimal(p, s) => h.update(&[5, *p, *s]),
        ColumnType::Varchar(len) => {
            h.update(&[6]);
            h.update(&len.to_le_bytes())
        }
        ColumnType::Text => h.update(&[7]),
        ColumnType::Boolean => h.update(&[8]),
        ColumnType::Binary => h.update(&[9]),
        ColumnType::Timestamp => h.update(&[10]),
        ColumnType::Date => h.update(&[11]),
        ColumnType::Uuid => h.update(&[12]),
    };
}

fn write_default(h: &mut Hasher, value: &DefaultValue) {
    match value {
        DefaultValue::Null => {
            h.update(&[0]);
        }
        DefaultValue::Bool(b) => {
            h.update(&[1, u8::from(*b)]);
        }
        DefaultValue::Integer(i) => {
            h.update(&[2]);
            h.update(&i.to_le_bytes());
        }
        DefaultValue::Float(f) => {
            h.update(&[3]);
            h.update(&f.to_bits().to_le_bytes());
        }
        DefaultValue::String(s) => {
            h.update(&[4]);
            write_str(h, s);
        }
        DefaultValue::Expression(e) => {
            h.update(&[5]);
            write_str(h, e);
        }
    }
}

fn write_index(h: &mut Hasher, index: &IndexSnapshot) {
    write_str(h, &index.name);
    write_len(h, index.columns.len());
    for col in &index.columns {
        write_str(h, col);
    }
    h.update(&[u8::from(index.unique)]);
}

fn write_foreign_key(h: &mut Hasher, fk: &ForeignKeySnapshot) {
    write_str(h, &fk.name);
    write_str(h, &fk.from_table);
    write_str(h, &fk.to_table);
    write_len(h, fk.column_pairs.len());
    for (from, to) in &fk.column_pairs {
        write_str(h, from);
        write_str(h, to);
    }
    h.update(&[u8::from(fk.cascade_delete)]);
}

fn write_str(h: &mut Hasher, s: &str) {
    write_len(h, s.len());
    h.update(s.as_bytes());
}

fn write_opt_str(h: &mut Hasher, s: Option<&str>) {
    match s {
        None => {
            h.update(&[0]);
        }
        Some(s) => {
            h.update(&[1]);
            write_str(h, s);
        }
    }
}

fn write_len(h: &mut Hasher, len: usize) {
    h.update(&(len as u64).to_le_bytes());
}
