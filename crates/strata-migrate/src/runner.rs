//! Migration runner.
//!
//! The runner reconciles a set of local migrations against the history
//! table and moves the database to a requested target: forward through the
//! pending migrations, or backward through applied ones. Each migration's
//! statements and its history row share one transaction, so a failure
//! leaves no trace of the failing migration while everything committed
//! earlier in the run stays committed.
//!
//! A run moves through [`RunState`]s: planning reads history and decides
//! what to do without opening a transaction, applying executes one
//! transaction per migration, and the run ends `Committed` (all requested
//! work done) or `RolledBack` (stopped at the first failure).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

use strata_core::apply::apply_operations;
use strata_core::diff::diff_models;
use strata_core::dialect::Dialect;
use strata_core::fingerprint::fingerprint;
use strata_core::migration::{migration_id, Migration};
use strata_core::operation::Operation;
use strata_core::snapshot::ModelSnapshot;

use crate::error::{MigrateError, Result};
use crate::history::{HistoryRow, HistoryStore, CREATE_HISTORY_TABLE_SQL};
use crate::lock::{NoLock, RunLock};

/// Where an update run should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateTarget {
    /// Apply every pending migration.
    Latest,
    /// Revert every applied migration (empty database).
    Initial,
    /// Move forward or backward to the named migration.
    Migration(String),
}

impl UpdateTarget {
    /// Parses the conventional command-line forms: `latest`, `0` (or the
    /// empty string) for the initial database, anything else as an id.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "" | "0" => Self::Initial,
            "latest" => Self::Latest,
            id => Self::Migration(id.to_string()),
        }
    }
}

/// Phases of a run, for logging and the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing started yet.
    Idle,
    /// Reading history and deciding what to do; no transaction open.
    Planning,
    /// Executing migrations, one transaction each.
    Applying,
    /// All requested migrations applied or reverted.
    Committed,
    /// Stopped at the first failure; the failing transaction was undone.
    RolledBack,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Terminal state, always [`RunState::Committed`] on success.
    pub state: RunState,
    /// Ids applied, in execution order.
    pub applied: Vec<String>,
    /// Ids reverted, in execution order (newest first).
    pub reverted: Vec<String>,
    /// `true` if a cancellation request stopped the run between migrations.
    pub interrupted: bool,
}

impl RunReport {
    fn committed() -> Self {
        Self {
            state: RunState::Committed,
            applied: Vec::new(),
            reverted: Vec::new(),
            interrupted: false,
        }
    }
}

/// Requests that a run stop before its next migration.
///
/// Cancellation never interrupts an in-flight transaction; the migration
/// being applied when the request arrives still commits or rolls back
/// whole.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Asks the runner to stop before the next migration.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Behavior switches for a runner.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Context key isolating this model's history rows.
    pub context_key: String,
    /// Synthesize a migration for model changes no local migration covers,
    /// instead of failing with pending-model-changes.
    pub automatic_migrations: bool,
    /// Let an automatic migration drop tables or columns.
    pub allow_data_loss: bool,
    /// Roll back through irreversible operations, skipping them.
    pub allow_irreversible: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            context_key: "default".to_string(),
            automatic_migrations: false,
            allow_data_loss: false,
            allow_irreversible: false,
        }
    }
}

/// One SQL statement ready to execute.
#[derive(Debug, Clone)]
struct Statement {
    sql: String,
    /// Runs outside the migration's transaction at its sequence position.
    suppressed: bool,
}

/// What to do with the history table once a migration's statements ran.
enum HistoryStep {
    Append(Box<HistoryRow>),
    Delete(String),
}

/// Applies and reverts migrations against one database.
pub struct MigrationRunner<D: Dialect, L: RunLock = NoLock> {
    pool: SqlitePool,
    dialect: D,
    history: HistoryStore,
    options: RunnerOptions,
    lock: L,
    cancelled: Arc<AtomicBool>,
}

impl<D: Dialect> MigrationRunner<D> {
    /// Creates a runner without an advisory lock.
    #[must_use]
    pub fn new(pool: SqlitePool, dialect: D, options: RunnerOptions) -> Self {
        let history = HistoryStore::new(pool.clone());
        Self {
            pool,
            dialect,
            history,
            options,
            lock: NoLock,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<D: Dialect, L: RunLock> MigrationRunner<D, L> {
    /// Replaces the advisory lock collaborator.
    #[must_use]
    pub fn with_lock<M: RunLock>(self, lock: M) -> MigrationRunner<D, M> {
        MigrationRunner {
            pool: self.pool,
            dialect: self.dialect,
            history: self.history,
            options: self.options,
            lock,
            cancelled: self.cancelled,
        }
    }

    /// Returns a handle that can stop the run between migrations.
    #[must_use]
    pub fn cancellation(&self) -> CancellationHandle {
        CancellationHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Returns the ids of local migrations not yet recorded in history.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] on duplicate local ids or history failures.
    pub async fn pending_migrations(&self, local: &[Migration]) -> Result<Vec<String>> {
        self.history.ensure_table().await?;
        let local = sorted_locals(local)?;
        let applied = self.applied_ids().await?;
        Ok(local
            .iter()
            .filter(|m| !applied.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect())
    }

    /// Returns `true` if the current model contains changes no local
    /// migration accounts for.
    ///
    /// The last applied snapshot is advanced through every pending
    /// migration; the result must land exactly on the current model.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] on duplicate local ids, unreplayable
    /// migrations or history failures.
    pub async fn has_pending_model_changes(
        &self,
        local: &[Migration],
        model: &ModelSnapshot,
    ) -> Result<bool> {
        self.history.ensure_table().await?;
        let local = sorted_locals(local)?;
        let applied = self
            .history
            .applied_migrations(&self.options.context_key)
            .await?;
        let advanced = advance_through_pending(&local, &applied)?;
        Ok(fingerprint(&advanced) != fingerprint(model))
    }

    /// Moves the database to the target: applies pending migrations, or
    /// reverts applied ones when the target is behind the current head.
    ///
    /// # Errors
    ///
    /// Returns the planning, generation or execution error that stopped the
    /// run; see [`MigrateError`] for the taxonomy. Execution errors report
    /// the migrations already committed in this run.
    pub async fn update(
        &self,
        local: &[Migration],
        model: &ModelSnapshot,
        target: &UpdateTarget,
    ) -> Result<RunReport> {
        self.lock.acquire().await?;
        let outcome = self.run(local, model, target).await;
        if let Err(error) = self.lock.release().await {
            warn!(%error, "failed to release run lock");
        }
        outcome
    }

    /// Renders the SQL an [`update`](Self::update) from `from` to `to`
    /// would execute, without touching the database.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] if a boundary id is unknown, a dialect
    /// cannot render an operation, or a downgrade crosses an irreversible
    /// migration.
    pub fn script(
        &self,
        local: &[Migration],
        from: &UpdateTarget,
        to: &UpdateTarget,
    ) -> Result<String> {
        script_migrations(&self.dialect, &self.options.context_key, local, from, to)
    }

    async fn run(
        &self,
        local: &[Migration],
        model: &ModelSnapshot,
        target: &UpdateTarget,
    ) -> Result<RunReport> {
        debug!(
            state = ?RunState::Planning,
            context = %self.options.context_key,
            "planning migration run"
        );
        self.history.ensure_table().await?;
        let local = sorted_locals(local)?;
        let applied = self
            .history
            .applied_migrations(&self.options.context_key)
            .await?;

        match target {
            UpdateTarget::Latest => {
                let plan = self.upgrade_plan(&local, &applied, model, None)?;
                self.apply_all(&applied, &plan).await
            }
            UpdateTarget::Initial => {
                let plan = self.revert_plan(&local, &applied, None)?;
                self.revert_all(&plan).await
            }
            UpdateTarget::Migration(id) => {
                if applied.iter().any(|row| row.migration_id == *id) {
                    let plan = self.revert_plan(&local, &applied, Some(id))?;
                    self.revert_all(&plan).await
                } else if local.iter().any(|m| m.id == *id) {
                    let plan = self.upgrade_plan(&local, &applied, model, Some(id))?;
                    self.apply_all(&applied, &plan).await
                } else {
                    Err(MigrateError::TargetNotFound { target: id.clone() })
                }
            }
        }
    }

    /// Picks the pending migrations to apply and checks the model drift
    /// gate. `upto` limits the plan to ids up to and including the target.
    fn upgrade_plan(
        &self,
        local: &[&Migration],
        applied: &[HistoryRow],
        model: &ModelSnapshot,
        upto: Option<&str>,
    ) -> Result<Vec<Migration>> {
        let advanced = advance_through_pending(local, applied)?;
        let applied_ids: BTreeSet<&str> =
            applied.iter().map(|r| r.migration_id.as_str()).collect();
        let mut plan: Vec<Migration> = local
            .iter()
            .filter(|m| !applied_ids.contains(m.id.as_str()))
            .filter(|m| upto.is_none_or(|limit| m.id.as_str() <= limit))
            .map(|m| (*m).clone())
            .collect();

        if fingerprint(&advanced) != fingerprint(model) {
            if self.options.automatic_migrations && upto.is_none() {
                let auto = self.automatic_migration(&advanced, model)?;
                info!(id = %auto.id, "synthesized automatic migration for uncaptured model changes");
                plan.push(auto);
            } else {
                return Err(MigrateError::PendingModelChanges {
                    model: fingerprint(model),
                    migrations: fingerprint(&advanced),
                });
            }
        }
        Ok(plan)
    }

    /// Manufactures one migration from the model delta the local set does
    /// not cover.
    fn automatic_migration(
        &self,
        from: &ModelSnapshot,
        to: &ModelSnapshot,
    ) -> Result<Migration> {
        let diff = diff_models(from, to)?;
        if !self.options.allow_data_loss {
            if let Some(op) = diff.operations.iter().find(|op| op.is_destructive()) {
                return Err(MigrateError::AutomaticDataLoss {
                    operation: op.describe(),
                });
            }
        }
        let id = migration_id(Utc::now(), "AutomaticMigration");
        Ok(Migration::from_diff(id, "AutomaticMigration", diff)?)
    }

    /// Collects the applied migrations to revert, newest first, stopping
    /// at `keep` (exclusive). Every one must exist locally (its down list
    /// lives there) and be reversible unless the override is set.
    fn revert_plan(
        &self,
        local: &[&Migration],
        applied: &[HistoryRow],
        keep: Option<&str>,
    ) -> Result<Vec<Migration>> {
        let mut plan = Vec::new();
        for row in applied.iter().rev() {
            if keep == Some(row.migration_id.as_str()) {
                break;
            }
            let Some(migration) = local.iter().find(|m| m.id == row.migration_id) else {
                return Err(MigrateError::MissingLocalMigration {
                    id: row.migration_id.clone(),
                });
            };
            if !self.options.allow_irreversible {
                if let Some(op) = migration
                    .down_operations
                    .iter()
                    .find(|op| op.is_irreversible())
                {
                    return Err(MigrateError::IrreversibleMigration {
                        id: migration.id.clone(),
                        operation: op.describe(),
                    });
                }
            }
            plan.push((*migration).clone());
        }
        Ok(plan)
    }

    async fn apply_all(
        &self,
        applied: &[HistoryRow],
        migrations: &[Migration],
    ) -> Result<RunReport> {
        let mut running = applied.last().map(|r| r.model.clone()).unwrap_or_default();
        let mut report = RunReport::committed();
        debug!(state = ?RunState::Applying, count = migrations.len(), "applying migrations");

        for migration in migrations {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("cancellation requested; no further migrations will start");
                report.interrupted = true;
                break;
            }
            // Everything fallible happens before the transaction opens.
            let next = apply_operations(&running, &migration.up_operations)?;
            let statements = statements_for(&self.dialect, &migration.up_operations)?;
            info!(id = %migration.id, statements = statements.len(), "applying migration");

            let row = HistoryRow::new(
                migration.id.as_str(),
                self.options.context_key.as_str(),
                next.clone(),
            );
            self.execute_migration(
                &migration.id,
                &statements,
                HistoryStep::Append(Box::new(row)),
                &report.applied,
            )
            .await?;
            report.applied.push(migration.id.clone());
            running = next;
        }

        info!(state = ?RunState::Committed, applied = report.applied.len(), "run committed");
        Ok(report)
    }

    async fn revert_all(&self, migrations: &[Migration]) -> Result<RunReport> {
        let mut report = RunReport::committed();
        debug!(state = ?RunState::Applying, count = migrations.len(), "reverting migrations");

        for migration in migrations {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("cancellation requested; no further migrations will start");
                report.interrupted = true;
                break;
            }
            let mut operations = Vec::with_capacity(migration.down_operations.len());
            for op in &migration.down_operations {
                if op.is_irreversible() {
                    // Only reachable with the explicit override.
                    warn!(
                        id = %migration.id,
                        operation = %op.describe(),
                        "skipping irreversible operation on override"
                    );
                } else {
                    operations.push(op.clone());
                }
            }
            let statements = statements_for(&self.dialect, &operations)?;
            info!(id = %migration.id, statements = statements.len(), "reverting migration");

            self.execute_migration(
                &migration.id,
                &statements,
                HistoryStep::Delete(migration.id.clone()),
                &report.reverted,
            )
            .await?;
            report.reverted.push(migration.id.clone());
        }

        info!(state = ?RunState::Committed, reverted = report.reverted.len(), "run committed");
        Ok(report)
    }

    /// Runs one migration's statements and its history mutation in a
    /// transaction. A statement flagged to run outside the transaction
    /// commits the work before it first; SQLite holds a database-wide
    /// write lock, so running it on a parallel connection would deadlock
    /// instead.
    async fn execute_migration(
        &self,
        id: &str,
        statements: &[Statement],
        step: HistoryStep,
        committed: &[String],
    ) -> Result<()> {
        let mut tx: Option<Transaction<'_, Sqlite>> = Some(self.pool.begin().await?);

        for (index, statement) in statements.iter().enumerate() {
            debug!(sql = %statement.sql, "executing statement");
            if statement.suppressed {
                if let Some(open) = tx.take() {
                    open.commit().await?;
                }
                if let Err(source) = sqlx::query(&statement.sql).execute(&self.pool).await {
                    return Err(self.sql_failure(id, index, statement, committed, source));
                }
            } else {
                let mut open = match tx.take() {
                    Some(open) => open,
                    None => self.pool.begin().await?,
                };
                if let Err(source) = sqlx::query(&statement.sql).execute(&mut *open).await {
                    roll_back(open).await;
                    return Err(self.sql_failure(id, index, statement, committed, source));
                }
                tx = Some(open);
            }
        }

        let mut open = match tx.take() {
            Some(open) => open,
            None => self.pool.begin().await?,
        };
        let recorded = match step {
            HistoryStep::Append(row) => HistoryStore::append(&mut open, &row).await,
            HistoryStep::Delete(migration_id) => {
                HistoryStore::delete(&mut open, &migration_id).await
            }
        };
        if let Err(error) = recorded {
            roll_back(open).await;
            return Err(error);
        }
        open.commit().await?;
        Ok(())
    }

    fn sql_failure(
        &self,
        id: &str,
        statement_index: usize,
        statement: &Statement,
        committed: &[String],
        source: sqlx::Error,
    ) -> MigrateError {
        warn!(
            state = ?RunState::RolledBack,
            id,
            statement_index,
            context = %self.options.context_key,
            "statement failed; migration rolled back"
        );
        MigrateError::SqlExecution {
            id: id.to_string(),
            statement_index,
            sql: statement.sql.clone(),
            committed: committed.to_vec(),
            source,
        }
    }

    async fn applied_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .history
            .applied_migrations(&self.options.context_key)
            .await?
            .into_iter()
            .map(|row| row.migration_id)
            .collect())
    }
}

/// Renders the SQL text an update from `from` to `to` would execute,
/// including the history table's own bookkeeping statements.
///
/// `from` names the boundary assumed already applied; the script covers
/// everything between the boundaries, downgrading when `from` is ahead of
/// `to`.
///
/// # Errors
///
/// Returns [`MigrateError`] if a boundary id is not a local migration, a
/// dialect cannot render an operation, or a downgrade crosses an
/// irreversible migration.
pub fn script_migrations(
    dialect: &dyn Dialect,
    context_key: &str,
    local: &[Migration],
    from: &UpdateTarget,
    to: &UpdateTarget,
) -> Result<String> {
    let local = sorted_locals(local)?;
    let from_count = boundary(&local, from)?;
    let to_count = boundary(&local, to)?;

    let mut out = String::new();
    if to_count >= from_count {
        out.push_str("-- strata upgrade script\n");
        out.push_str(CREATE_HISTORY_TABLE_SQL.trim());
        out.push_str(";\n\n");

        // Replay up to the boundary to know each scripted row's snapshot.
        let mut model = ModelSnapshot::new();
        for migration in &local[..from_count] {
            model = apply_operations(&model, &migration.up_operations)?;
        }
        for migration in &local[from_count..to_count] {
            out.push_str(&format!("-- Migration: {}\n", migration.id));
            for statement in statements_for(dialect, &migration.up_operations)? {
                out.push_str(&statement.sql);
                out.push_str(";\n");
            }
            model = apply_operations(&model, &migration.up_operations)?;
            let row = HistoryRow::new(migration.id.as_str(), context_key, model.clone());
            out.push_str(&row.insert_sql(dialect)?);
            out.push_str(";\n\n");
        }
    } else {
        out.push_str("-- strata downgrade script\n\n");
        for migration in local[to_count..from_count].iter().rev() {
            out.push_str(&format!("-- Revert migration: {}\n", migration.id));
            for statement in statements_for(dialect, &migration.down_operations)? {
                out.push_str(&statement.sql);
                out.push_str(";\n");
            }
            let row = HistoryRow::new(migration.id.as_str(), context_key, ModelSnapshot::new());
            out.push_str(&row.delete_sql(dialect));
            out.push_str(";\n\n");
        }
    }
    Ok(out)
}

/// Maps a script boundary to "how many local migrations are applied".
fn boundary(local: &[&Migration], target: &UpdateTarget) -> Result<usize> {
    match target {
        UpdateTarget::Initial => Ok(0),
        UpdateTarget::Latest => Ok(local.len()),
        UpdateTarget::Migration(id) => local
            .iter()
            .position(|m| m.id == *id)
            .map(|i| i + 1)
            .ok_or_else(|| MigrateError::TargetNotFound { target: id.clone() }),
    }
}

/// Sorts local migrations by id and rejects duplicates.
fn sorted_locals(local: &[Migration]) -> Result<Vec<&Migration>> {
    let mut sorted: Vec<&Migration> = local.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in sorted.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(MigrateError::DuplicateMigrationId {
                id: pair[0].id.clone(),
            });
        }
    }
    Ok(sorted)
}

/// Projects the last applied snapshot through every pending migration.
fn advance_through_pending(
    local: &[&Migration],
    applied: &[HistoryRow],
) -> Result<ModelSnapshot> {
    let applied_ids: BTreeSet<&str> = applied.iter().map(|r| r.migration_id.as_str()).collect();
    let mut model = applied.last().map(|r| r.model.clone()).unwrap_or_default();
    for migration in local {
        if !applied_ids.contains(migration.id.as_str()) {
            model = apply_operations(&model, &migration.up_operations)?;
        }
    }
    Ok(model)
}

/// Generates every statement for an operation list up front, so dialect
/// errors surface before any transaction opens.
fn statements_for(dialect: &dyn Dialect, operations: &[Operation]) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    for op in operations {
        let suppressed = matches!(
            op,
            Operation::Sql {
                suppress_transaction: true,
                ..
            }
        );
        for sql in dialect.generate(op)? {
            statements.push(Statement { sql, suppressed });
        }
    }
    Ok(statements)
}

/// Rolls a transaction back, logging instead of masking the original error.
async fn roll_back(tx: Transaction<'_, Sqlite>) {
    if let Err(error) = tx.rollback().await {
        warn!(%error, "transaction rollback failed");
    }
}
