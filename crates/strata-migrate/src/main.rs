//! strata-migrate CLI
//!
//! Command-line tool for applying, reverting and scripting migrations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use strata_core::dialect::{Dialect, GenericDialect, PostgresDialect, SqliteDialect};
use strata_core::diff::diff_models;
use strata_migrate::lock::TableLock;
use strata_migrate::prelude::*;

/// Model-diff based schema migrations.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:strata.db")]
    database: String,

    /// Current model snapshot file.
    #[arg(long, default_value = "model.json")]
    model: PathBuf,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Context key isolating this model's history rows.
    #[arg(short, long, default_value = "default")]
    context: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply or revert migrations to reach a target.
    Update {
        /// Target migration id, "latest" (default), or "0" for an empty
        /// database.
        #[arg(default_value = "latest")]
        target: String,

        /// Synthesize an automatic migration for uncaptured model changes.
        #[arg(long)]
        auto: bool,

        /// Let an automatic migration drop tables or columns.
        #[arg(long)]
        allow_data_loss: bool,

        /// Roll back through irreversible operations, skipping them.
        #[arg(long)]
        force: bool,

        /// Hold an advisory lock in the database for the run.
        #[arg(long)]
        lock: bool,
    },

    /// List migrations not yet applied to the database.
    Pending,

    /// Report whether the model has changes no migration captures.
    Check,

    /// Print the SQL an update between two targets would execute.
    Script {
        /// Boundary assumed already applied ("0" for none).
        #[arg(long, default_value = "0")]
        from: String,

        /// Boundary to script to.
        #[arg(long, default_value = "latest")]
        to: String,

        /// SQL dialect: generic, sqlite or postgres.
        #[arg(long, default_value = "generic")]
        dialect: String,
    },

    /// Diff two model files and print the operations and their SQL.
    Plan {
        /// Model snapshot before the change.
        before: PathBuf,

        /// Model snapshot after the change.
        after: PathBuf,

        /// SQL dialect: generic, sqlite or postgres.
        #[arg(long, default_value = "generic")]
        dialect: String,
    },
}

fn dialect_by_name(name: &str) -> anyhow::Result<Box<dyn Dialect>> {
    match name {
        "generic" => Ok(Box::new(GenericDialect)),
        "sqlite" => Ok(Box::new(SqliteDialect)),
        "postgres" => Ok(Box::new(PostgresDialect)),
        other => anyhow::bail!("unknown dialect '{other}' (expected generic, sqlite or postgres)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Update {
            target,
            auto,
            allow_data_loss,
            force,
            lock,
        } => {
            let model = load_model(&cli.model)?;
            let migrations = load_migrations(&cli.migrations_dir)?;
            let target = UpdateTarget::parse(&target);

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&cli.database)
                .await?;
            let options = RunnerOptions {
                context_key: cli.context,
                automatic_migrations: auto,
                allow_data_loss,
                allow_irreversible: force,
            };
            let runner = MigrationRunner::new(pool.clone(), SqliteDialect, options);

            let report = if lock {
                runner
                    .with_lock(TableLock::new(pool))
                    .update(&migrations, &model, &target)
                    .await?
            } else {
                runner.update(&migrations, &model, &target).await?
            };

            for id in &report.applied {
                println!("applied   {id}");
            }
            for id in &report.reverted {
                println!("reverted  {id}");
            }
            if report.interrupted {
                info!("run interrupted by cancellation; database left between migrations");
            } else if report.applied.is_empty() && report.reverted.is_empty() {
                info!("database is already at the requested target");
            }
        }

        Commands::Pending => {
            let migrations = load_migrations(&cli.migrations_dir)?;
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&cli.database)
                .await?;
            let options = RunnerOptions {
                context_key: cli.context,
                ..RunnerOptions::default()
            };
            let runner = MigrationRunner::new(pool, SqliteDialect, options);

            let pending = runner.pending_migrations(&migrations).await?;
            if pending.is_empty() {
                info!("no pending migrations");
            } else {
                for id in &pending {
                    println!("{id}");
                }
            }
        }

        Commands::Check => {
            let model = load_model(&cli.model)?;
            let migrations = load_migrations(&cli.migrations_dir)?;
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&cli.database)
                .await?;
            let options = RunnerOptions {
                context_key: cli.context,
                ..RunnerOptions::default()
            };
            let runner = MigrationRunner::new(pool, SqliteDialect, options);

            if runner
                .has_pending_model_changes(&migrations, &model)
                .await?
            {
                println!("model has changes not captured by any migration");
                std::process::exit(1);
            }
            println!("model and migrations are in sync");
        }

        Commands::Script { from, to, dialect } => {
            let migrations = load_migrations(&cli.migrations_dir)?;
            let dialect = dialect_by_name(&dialect)?;
            let script = script_migrations(
                dialect.as_ref(),
                &cli.context,
                &migrations,
                &UpdateTarget::parse(&from),
                &UpdateTarget::parse(&to),
            )?;
            print!("{script}");
        }

        Commands::Plan {
            before,
            after,
            dialect,
        } => {
            let before = load_model(&before)?;
            let after = load_model(&after)?;
            let dialect = dialect_by_name(&dialect)?;

            let diff = diff_models(&before, &after)?;
            if diff.is_empty() {
                info!("models are identical");
                return Ok(());
            }
            for warning in &diff.warnings {
                info!("warning: {warning}");
            }
            for op in &diff.operations {
                println!("-- {}", op.describe());
                for sql in dialect.generate(op)? {
                    println!("{sql};");
                }
            }
        }
    }

    Ok(())
}
