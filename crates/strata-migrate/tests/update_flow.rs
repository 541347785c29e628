//! End-to-end update flow: artifacts on disk, runner against a database.
//!
//! These tests write model and migration JSON files the way the
//! scaffolding workflow would, load them back, and drive the runner
//! through an upgrade, a rollback and a script over the same set.

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use strata_core::dialect::{GenericDialect, SqliteDialect};
use strata_core::diff::diff_models;
use strata_core::migration::Migration;
use strata_core::snapshot::{ColumnSnapshot, ColumnType, ModelSnapshot, TableSnapshot};
use strata_migrate::prelude::*;

async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

fn model_v1() -> ModelSnapshot {
    ModelSnapshot::new().table(
        TableSnapshot::new("Customer")
            .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
            .column(ColumnSnapshot::new("Name", ColumnType::Varchar(100)).not_null())
            .primary_key(vec!["Id".to_string()]),
    )
}

fn model_v2() -> ModelSnapshot {
    model_v1().table(
        TableSnapshot::new("Order")
            .column(ColumnSnapshot::new("Id", ColumnType::Integer).identity())
            .column(ColumnSnapshot::new("Total", ColumnType::Decimal(10, 2)).not_null())
            .primary_key(vec!["Id".to_string()]),
    )
}

fn write_artifacts(dir: &Path) -> (ModelSnapshot, Vec<Migration>) {
    let diff1 = diff_models(&ModelSnapshot::new(), &model_v1()).unwrap();
    let m1 = Migration::from_diff("20260101000000_CreateCustomer", "CreateCustomer", diff1)
        .unwrap();
    let diff2 = diff_models(&model_v1(), &model_v2()).unwrap();
    let m2 = Migration::from_diff("20260201000000_AddOrder", "AddOrder", diff2).unwrap();

    let migrations_dir = dir.join("migrations");
    std::fs::create_dir(&migrations_dir).unwrap();
    std::fs::write(
        migrations_dir.join(format!("{}.json", m1.id)),
        serde_json::to_string_pretty(&m1).unwrap(),
    )
    .unwrap();
    std::fs::write(
        migrations_dir.join(format!("{}.json", m2.id)),
        serde_json::to_string_pretty(&m2).unwrap(),
    )
    .unwrap();

    let model_path = dir.join("model.json");
    std::fs::write(
        &model_path,
        serde_json::to_string_pretty(&model_v2()).unwrap(),
    )
    .unwrap();

    let model = load_model(&model_path).unwrap();
    let migrations = load_migrations(&migrations_dir).unwrap();
    (model, migrations)
}

#[tokio::test]
async fn artifacts_drive_a_full_upgrade_and_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let (model, migrations) = write_artifacts(dir.path());
    assert_eq!(migrations.len(), 2);

    let pool = create_test_pool().await;
    let runner = MigrationRunner::new(pool.clone(), SqliteDialect, RunnerOptions::default());

    // Upgrade to latest.
    let report = runner
        .update(&migrations, &model, &UpdateTarget::Latest)
        .await
        .unwrap();
    assert_eq!(report.applied.len(), 2);
    assert!(runner.pending_migrations(&migrations).await.unwrap().is_empty());
    assert!(!runner
        .has_pending_model_changes(&migrations, &model)
        .await
        .unwrap());

    // The history rows carry the snapshots the migrations produced.
    let history = HistoryStore::new(pool.clone());
    let applied = history.applied_migrations("default").await.unwrap();
    assert_eq!(applied.last().unwrap().model, model_v2());

    // Roll everything back.
    let report = runner
        .update(&migrations, &model, &UpdateTarget::Initial)
        .await
        .unwrap();
    assert_eq!(report.reverted.len(), 2);
    assert!(history.applied_migrations("default").await.unwrap().is_empty());
}

#[tokio::test]
async fn locked_update_succeeds_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let (model, migrations) = write_artifacts(dir.path());

    let pool = create_test_pool().await;
    let runner = MigrationRunner::new(pool.clone(), SqliteDialect, RunnerOptions::default())
        .with_lock(TableLock::new(pool.clone()));

    runner
        .update(&migrations, &model, &UpdateTarget::Latest)
        .await
        .unwrap();
    // The lock was released at the end of the run.
    TableLock::new(pool).acquire().await.unwrap();
}

#[test]
fn script_matches_the_loaded_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let (_, migrations) = write_artifacts(dir.path());

    let script = script_migrations(
        &GenericDialect,
        "default",
        &migrations,
        &UpdateTarget::Initial,
        &UpdateTarget::Latest,
    )
    .unwrap();

    assert!(script.contains("CREATE TABLE \"Customer\""));
    assert!(script.contains("CREATE TABLE \"Order\""));
    assert!(script.contains("INSERT INTO \"__strata_history\""));
}
