use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketflow_core::{ConnectionParams, PipelineConfig, WarehouseConfig, WarehouseKind};
use marketflow_engine::{RunOrchestrator, RunOutcome, TransformGraph, WarehouseMetadataSink};
use marketflow_jinja::FileTemplateStore;
use marketflow_warehouse::{SqliteProvider, SqliteWarehouse, StaticProvider, WarehouseProvider};

/// MarketFlow - dependency-ordered market data pipeline
#[derive(Parser)]
#[command(name = "marketflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: marketflow.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one pipeline run
    Run,

    /// Run the pipeline repeatedly on the configured schedule
    Schedule {
        /// Start the first run immediately instead of after one interval
        #[arg(long)]
        now: bool,
    },

    /// Print the transform execution order without touching the warehouse
    Plan,
}

/// Environment variable names for one set of server credentials
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
struct CredentialVars {
    host: &'static str,
    database: &'static str,
    user: &'static str,
    password: &'static str,
    port: &'static str,
}

const WAREHOUSE_VARS: CredentialVars = CredentialVars {
    host: "SERVER_NAME",
    database: "DATABASE_NAME",
    user: "DB_USERNAME",
    password: "DB_PASSWORD",
    port: "PORT",
};

const METADATA_VARS: CredentialVars = CredentialVars {
    host: "LOGGING_SERVER_NAME",
    database: "LOGGING_DATABASE_NAME",
    user: "LOGGING_USERNAME",
    password: "LOGGING_PASSWORD",
    port: "LOGGING_PORT",
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine; variables may come from the environment
    let _ = dotenvy::dotenv();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from("marketflow.toml"));
    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Cannot load pipeline config {}", config_path.display()))?;

    if cli.verbose {
        eprintln!("{} {} ({})", "Using pipeline".cyan(), config.name, config_path.display());
    }

    match cli.command {
        Commands::Run => run_command(&config, cli.verbose).await,
        Commands::Schedule { now } => schedule_command(&config, now, cli.verbose).await,
        Commands::Plan => plan_command(&config, cli.verbose),
    }
}

/// Run command - one run, non-zero exit on failure
async fn run_command(config: &PipelineConfig, verbose: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, verbose)?;
    let outcome = orchestrator.run(&config.name, config).await;
    print_outcome(&outcome);

    match outcome.into_result() {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("Pipeline '{}' failed: {}", config.name, e)),
    }
}

/// Schedule command - run every `run_seconds`, checking every `poll_seconds`
///
/// Runs never overlap: the next due time is only checked once the current
/// run has returned. A failed run is reported and the schedule continues.
async fn schedule_command(config: &PipelineConfig, now: bool, verbose: bool) -> Result<()> {
    if config.schedule.run_seconds == 0 || config.schedule.poll_seconds == 0 {
        return Err(anyhow::anyhow!(
            "schedule.run_seconds and schedule.poll_seconds must be positive"
        ));
    }

    let orchestrator = build_orchestrator(config, verbose)?;
    let interval = Duration::from_secs(config.schedule.run_seconds);
    let poll = Duration::from_secs(config.schedule.poll_seconds);

    let mut next_due = if now { Instant::now() } else { Instant::now() + interval };
    eprintln!(
        "{} '{}' every {}s (polling every {}s, Ctrl-C to stop)",
        "Scheduling".cyan(),
        config.name,
        config.schedule.run_seconds,
        config.schedule.poll_seconds
    );

    loop {
        if Instant::now() >= next_due {
            let outcome = orchestrator.run(&config.name, config).await;
            print_outcome(&outcome);
            if let Some(e) = &outcome.error {
                tracing::error!(pipeline = %config.name, error = %e, "Scheduled run failed");
            }
            next_due += interval;
            // Skip slots missed while a long run was in progress
            while next_due <= Instant::now() {
                next_due += interval;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "Stopping scheduler".yellow());
                return Ok(());
            }
        }
    }
}

/// Plan command - show the transform order
fn plan_command(config: &PipelineConfig, verbose: bool) -> Result<()> {
    let template_dir = config.template_dir();
    if verbose {
        eprintln!("{} {}", "Loading templates from:".cyan(), template_dir.display());
    }
    let templates = FileTemplateStore::new(&template_dir)?;
    let graph = TransformGraph::from_config(config, &templates)?;
    let order = graph.execution_order()?;

    println!("{}", format!("Pipeline: {}", config.name).bold());
    println!();
    println!("{}", "Raw sources:".bold());
    if config.sources.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for source in &config.sources {
        println!("  {} ({:?}, {})", source.name.green(), source.kind, source.load_method);
    }

    println!();
    println!("{}", "Transforms:".bold());
    if order.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (position, node) in order.iter().enumerate() {
        let deps = graph.dependencies(node.name());
        let after = if deps.is_empty() {
            String::new()
        } else {
            format!(" after {}", deps.join(", "))
        };
        println!(
            "  {}. {} -> {}{}",
            position + 1,
            node.name().green(),
            node.target_table(),
            after.dimmed()
        );
    }

    Ok(())
}

fn build_orchestrator(config: &PipelineConfig, verbose: bool) -> Result<RunOrchestrator> {
    if verbose {
        eprintln!("{} {:?} warehouse", "Using".cyan(), config.warehouse.kind);
    }
    let provider = warehouse_provider(config, &config.warehouse, &WAREHOUSE_VARS)?;
    let metadata_provider = match &config.metadata.warehouse {
        Some(metadata_warehouse) => warehouse_provider(config, metadata_warehouse, &METADATA_VARS)?,
        None => provider.clone(),
    };

    let templates = FileTemplateStore::new(config.template_dir())
        .with_context(|| format!("Cannot open template directory {}", config.template_dir().display()))?;
    let sink = WarehouseMetadataSink::new(metadata_provider, config.metadata.table.clone());

    let orchestrator = RunOrchestrator::new(provider, Arc::new(templates), Arc::new(sink))
        .with_configured_sources(config, |var| std::env::var(var).ok())?;
    Ok(orchestrator)
}

fn warehouse_provider(
    config: &PipelineConfig,
    warehouse: &WarehouseConfig,
    vars: &CredentialVars,
) -> Result<Arc<dyn WarehouseProvider>> {
    match warehouse.kind {
        WarehouseKind::Sqlite => {
            let path = warehouse
                .path
                .as_deref()
                .unwrap_or_else(|| Path::new("marketflow.db"));
            if path == Path::new(":memory:") {
                // One shared database for the whole process
                let shared = Arc::new(SqliteWarehouse::in_memory()?);
                Ok(Arc::new(StaticProvider::new(shared)))
            } else {
                Ok(Arc::new(SqliteProvider::new(config.resolve_path(path))))
            }
        }
        WarehouseKind::Postgres => postgres_provider(warehouse, vars),
    }
}

#[cfg(feature = "postgres")]
fn postgres_provider(warehouse: &WarehouseConfig, vars: &CredentialVars) -> Result<Arc<dyn WarehouseProvider>> {
    let params = connection_params(vars, |name| std::env::var(name).ok())?;
    Ok(Arc::new(marketflow_warehouse::PostgresProvider::new(params, warehouse.tls)))
}

#[cfg(not(feature = "postgres"))]
fn postgres_provider(_warehouse: &WarehouseConfig, _vars: &CredentialVars) -> Result<Arc<dyn WarehouseProvider>> {
    Err(anyhow::anyhow!(
        "PostgreSQL support not compiled in. Rebuild with --features postgres"
    ))
}

/// Read server credentials through `lookup`
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
fn connection_params(
    vars: &CredentialVars,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConnectionParams> {
    let required = |name: &str| {
        lookup(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Environment variable {} is not set", name))
    };

    let port = match lookup(vars.port) {
        Some(port) if !port.is_empty() => port
            .parse::<u16>()
            .with_context(|| format!("{} must be a port number, got '{}'", vars.port, port))?,
        _ => 5432,
    };

    Ok(ConnectionParams {
        host: required(vars.host)?,
        port,
        database: required(vars.database)?,
        user: required(vars.user)?,
        password: required(vars.password)?,
    })
}

fn print_outcome(outcome: &RunOutcome) {
    let run_id = outcome
        .record
        .run_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    for (source, rows) in &outcome.loaded {
        eprintln!("  {} {} ({} rows)", "loaded".cyan(), source, rows);
    }
    for (transform, rows) in &outcome.executed {
        eprintln!("  {} {} ({} rows)", "built".cyan(), transform, rows);
    }
    for transform in &outcome.skipped {
        eprintln!("  {} {}", "skipped".yellow(), transform);
    }

    if outcome.is_success() {
        eprintln!(
            "{} {} run {}",
            "✓ Succeeded".green(),
            outcome.record.pipeline_name,
            run_id
        );
    } else {
        eprintln!(
            "{} {} run {}",
            "✗ Failed".red(),
            outcome.record.pipeline_name,
            run_id
        );
        if let Some(e) = &outcome.error {
            eprintln!("    {}", e.to_string().red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn connection_params_from_logging_vars() {
        let vars = env(&[
            ("LOGGING_SERVER_NAME", "db.internal"),
            ("LOGGING_DATABASE_NAME", "logs"),
            ("LOGGING_USERNAME", "etl"),
            ("LOGGING_PASSWORD", "secret"),
            ("LOGGING_PORT", "6543"),
        ]);
        let params = connection_params(&METADATA_VARS, |name| vars.get(name).cloned()).unwrap();
        assert_eq!(params.host, "db.internal");
        assert_eq!(params.port, 6543);
        assert_eq!(params.database, "logs");
    }

    #[test]
    fn connection_params_default_port() {
        let vars = env(&[
            ("SERVER_NAME", "localhost"),
            ("DATABASE_NAME", "market"),
            ("DB_USERNAME", "etl"),
            ("DB_PASSWORD", "secret"),
        ]);
        let params = connection_params(&WAREHOUSE_VARS, |name| vars.get(name).cloned()).unwrap();
        assert_eq!(params.port, 5432);
    }

    #[test]
    fn connection_params_missing_password() {
        let vars = env(&[
            ("SERVER_NAME", "localhost"),
            ("DATABASE_NAME", "market"),
            ("DB_USERNAME", "etl"),
        ]);
        let err = connection_params(&WAREHOUSE_VARS, |name| vars.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains("DB_PASSWORD"));
    }

    #[test]
    fn connection_params_bad_port() {
        let vars = env(&[
            ("SERVER_NAME", "localhost"),
            ("DATABASE_NAME", "market"),
            ("DB_USERNAME", "etl"),
            ("DB_PASSWORD", "secret"),
            ("PORT", "fifty"),
        ]);
        assert!(connection_params(&WAREHOUSE_VARS, |name| vars.get(name).cloned()).is_err());
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn postgres_requires_feature() {
        let mut config = PipelineConfig::new("market_pipeline");
        config.warehouse.kind = WarehouseKind::Postgres;
        let result = warehouse_provider(&config, &config.warehouse, &WAREHOUSE_VARS);
        assert!(result.is_err());
    }
}
