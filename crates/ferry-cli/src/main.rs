use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferry_core::{FerryConfig, TaskId};
use ferry_scheduler::Schedule;
use ferry_store::MetadataStore;
use tracing::{info, warn};

mod app;

use app::App;

#[derive(Parser)]
#[command(
    name = "ferry",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("FERRY_GIT_SHA"), ")"),
    about = "Copy rows between relational databases on a schedule"
)]
struct Cli {
    /// Config file (default: $FERRY_CONFIG, then ~/.ferry/ferry.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register connections, start the scheduler and run until Ctrl-C
    Serve,
    /// Execute one sync task now and print the outcome
    Run {
        task_id: TaskId,
    },
    /// Probe a stored connection with `SELECT 1`
    Check {
        /// Connection name
        name: String,
    },
    /// List enabled connection descriptors (passwords omitted)
    Connections,
    /// Show run history for a task, newest first
    Logs {
        task_id: TaskId,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Enable a sync task
    Enable {
        task_id: TaskId,
    },
    /// Disable a sync task
    Disable {
        task_id: TaskId,
    },
    /// Set a task's schedule expression ("" runs it on demand only)
    Schedule {
        task_id: TaskId,
        expression: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ferry=info,ferry_connect=info,ferry_sync=info,ferry_scheduler=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit flag > FERRY_CONFIG env > ~/.ferry/ferry.toml
    let config_path = cli
        .config
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("FERRY_CONFIG").ok());
    let config = FerryConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        FerryConfig::default()
    });

    let app = App::build(config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&app).await,
        Commands::Run { task_id } => run_once(&app, task_id).await,
        Commands::Check { name } => check(&app, &name).await,
        Commands::Connections => connections(&app),
        Commands::Logs { task_id, limit } => logs(&app, task_id, limit),
        Commands::Enable { task_id } => set_enabled(&app, task_id, true),
        Commands::Disable { task_id } => set_enabled(&app, task_id, false),
        Commands::Schedule {
            task_id,
            expression,
        } => set_schedule(&app, task_id, &expression),
    }
}

async fn serve(app: &App) -> anyhow::Result<()> {
    let connections = app.load_connections().await?;
    match app.scheduler.start().await {
        Ok(tasks) => info!(connections, tasks, "ferry running"),
        Err(e) => warn!(code = e.code(), error = %e, "scheduler started without loaded tasks"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");
    app.shutdown().await;
    Ok(())
}

async fn run_once(app: &App, task_id: TaskId) -> anyhow::Result<()> {
    app.load_connections().await?;
    let result = app.engine.execute_task(task_id).await;
    app.registry.close().await;
    let outcome = result.with_context(|| format!("sync task {task_id} failed"))?;
    println!(
        "task {} run {}: synced {} rows in {} ms",
        outcome.task_id, outcome.run_id, outcome.rows_affected, outcome.duration_ms
    );
    Ok(())
}

async fn check(app: &App, name: &str) -> anyhow::Result<()> {
    let descriptor = app
        .store
        .load_connection_descriptors()?
        .into_iter()
        .find(|d| d.name == name)
        .with_context(|| format!("no connection named '{name}'"))?;
    ferry_connect::test_connection(&app.connector(), &descriptor).await?;
    println!("{name}: ok");
    Ok(())
}

fn connections(app: &App) -> anyhow::Result<()> {
    let descriptors: Vec<_> = app
        .store
        .load_connection_descriptors()?
        .into_iter()
        .filter(|d| d.enabled)
        .collect();
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

fn logs(app: &App, task_id: TaskId, limit: usize) -> anyhow::Result<()> {
    let records = app.store.list_run_records(task_id, limit, 0)?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn set_enabled(app: &App, task_id: TaskId, enabled: bool) -> anyhow::Result<()> {
    app.store.set_task_enabled(task_id, enabled)?;
    println!(
        "task {task_id} {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn set_schedule(app: &App, task_id: TaskId, expression: &str) -> anyhow::Result<()> {
    let expression = expression.trim();
    if !expression.is_empty() {
        Schedule::parse(expression)?;
    }
    app.store.set_task_schedule(task_id, expression)?;
    println!("task {task_id} schedule set to '{expression}'");
    Ok(())
}
