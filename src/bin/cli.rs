use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use taskboard::automation::scheduler::{record_run, DUE_DATE_JOB};
use taskboard::automation::AutomationEngine;
use taskboard::events::init_event_bus;
use taskboard::notifications::SqliteNotificationSink;

#[derive(Parser, Debug)]
#[command(author, version, about = "taskboard maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Run the due-date automation sweep once and print the outcomes
    Sweep {
        /// Record the run so the server's scheduler skips today's sweep
        #[arg(long)]
        record: bool,
    },
    /// Write the OpenAPI document as JSON
    Openapi {
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The binary may run outside the repo root (containers), so fall back to
    // the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Sweep { record } => {
            let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
            let pool = taskboard::db::init(&database_url).await?;
            run_sweep(&pool, record).await?;
        }
        Commands::Openapi { out, port } => {
            let doc = taskboard::docs::build_openapi(port);
            let json = serde_json::to_string_pretty(&doc)?;
            match out {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

async fn run_sweep(pool: &SqlitePool, record: bool) -> anyhow::Result<()> {
    let (bus, _) = init_event_bus();
    let notifier = std::sync::Arc::new(SqliteNotificationSink::new(pool.clone(), bus));
    let engine = AutomationEngine::new(pool.clone(), notifier);

    let now = Utc::now();
    let report = engine.sweep_due_passed(now).await?;

    println!("cutoff: {}", report.cutoff);
    println!("overdue tasks: {}", report.tasks_scanned);
    println!("{:<10} {:<38} {:<38} {}", "Outcome", "Rule", "Task", "Detail");
    for outcome in &report.outcomes {
        let (label, detail) = match &outcome.status {
            taskboard::automation::OutcomeStatus::Applied => ("applied", String::new()),
            taskboard::automation::OutcomeStatus::Skipped { reason } => ("skipped", reason.clone()),
            taskboard::automation::OutcomeStatus::Failed { error } => ("failed", error.clone()),
        };
        println!("{:<10} {:<38} {:<38} {}", label, outcome.rule_id, outcome.task_id, detail);
    }

    if record {
        record_run(pool, DUE_DATE_JOB, now.date_naive(), Utc::now()).await?;
        println!("Recorded run for {}", now.date_naive());
    }

    if report.failures() > 0 {
        anyhow::bail!("{} rule(s) failed during the sweep", report.failures());
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    // sqlx reads the version from the digits before the first underscore
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = migrations_dir().join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

fn migrations_dir() -> PathBuf {
    let local = Path::new("./migrations");
    if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let path = migrations_dir();
    let display = path.display().to_string();
    sqlx::migrate::Migrator::new(path)
        .await
        .with_context(|| format!("failed to load migrations from {display}"))
}
