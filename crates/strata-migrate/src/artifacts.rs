//! On-disk model and migration artifacts.
//!
//! The scaffolding workflow leaves two kinds of JSON files behind: one
//! model snapshot describing the current schema, and one file per
//! migration under a migrations directory. This module loads them for the
//! runner and the CLI; it never writes them.

use std::path::Path;

use strata_core::migration::Migration;
use strata_core::snapshot::ModelSnapshot;

use crate::error::{MigrateError, Result};

/// Loads and validates a model snapshot from a JSON file.
///
/// # Errors
///
/// Returns [`MigrateError::Io`] if the file cannot be read,
/// [`MigrateError::Json`] if it is not a valid snapshot, or
/// [`MigrateError::Plan`] if the snapshot fails structural validation.
pub fn load_model(path: &Path) -> Result<ModelSnapshot> {
    let text = std::fs::read_to_string(path).map_err(|source| MigrateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model: ModelSnapshot =
        serde_json::from_str(&text).map_err(|source| MigrateError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    model.validate()?;
    Ok(model)
}

/// Loads every `*.json` migration in a directory, sorted by id.
///
/// Files are discovered by extension; the migration's identity is the `id`
/// field inside the file, not the file name.
///
/// # Errors
///
/// Returns [`MigrateError::Io`] if the directory or a file cannot be read,
/// [`MigrateError::Json`] for unparseable files, or
/// [`MigrateError::DuplicateMigrationId`] when two files carry the same id.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let entries = std::fs::read_dir(dir).map_err(|source| MigrateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MigrateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|source| MigrateError::Io {
            path: path.clone(),
            source,
        })?;
        let migration: Migration =
            serde_json::from_str(&text).map_err(|source| MigrateError::Json {
                path: path.clone(),
                source,
            })?;
        migrations.push(migration);
    }

    migrations.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in migrations.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(MigrateError::DuplicateMigrationId {
                id: pair[0].id.clone(),
            });
        }
    }
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::operation::Operation;
    use strata_core::snapshot::{ColumnSnapshot, ColumnType, TableSnapshot};

    fn sample_model() -> ModelSnapshot {
        ModelSnapshot::new().table(
            TableSnapshot::new("Customer")
                .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
                .primary_key(vec!["Id".to_string()]),
        )
    }

    fn sample_migration(id: &str) -> Migration {
        Migration::new(
            id,
            "Init",
            vec![Operation::CreateTable {
                table: "Customer".to_string(),
                columns: vec![ColumnSnapshot::new("Id", ColumnType::Integer).identity()],
                primary_key: vec!["Id".to_string()],
            }],
            vec![Operation::DropTable {
                table: "Customer".to_string(),
                previous: None,
            }],
        )
    }

    #[test]
    fn model_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&sample_model()).unwrap()).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded, sample_model());
    }

    #[test]
    fn missing_model_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, MigrateError::Io { path: p, .. } if p == path));
    }

    #[test]
    fn malformed_model_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_model(&path).unwrap_err(),
            MigrateError::Json { .. }
        ));
    }

    #[test]
    fn migrations_load_sorted_regardless_of_file_names() {
        let dir = tempfile::tempdir().unwrap();
        // File names deliberately out of id order.
        let later = sample_migration("20260201000000_Later");
        let earlier = sample_migration("20260101000000_Earlier");
        std::fs::write(
            dir.path().join("a.json"),
            serde_json::to_string(&later).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            serde_json::to_string(&earlier).unwrap(),
        )
        .unwrap();
        // Non-JSON files are ignored.
        std::fs::write(dir.path().join("README.md"), "notes").unwrap();

        let loaded = load_migrations(dir.path()).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["20260101000000_Earlier", "20260201000000_Later"]);
    }

    #[test]
    fn duplicate_ids_across_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = sample_migration("20260101000000_Init");
        std::fs::write(
            dir.path().join("one.json"),
            serde_json::to_string(&m).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("two.json"),
            serde_json::to_string(&m).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            load_migrations(dir.path()).unwrap_err(),
            MigrateError::DuplicateMigrationId { id } if id == "20260101000000_Init"
        ));
    }

    #[test]
    fn empty_directory_yields_no_migrations() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_migrations(dir.path()).unwrap().is_empty());
    }
}
