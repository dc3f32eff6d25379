//! Diad - Election-Day Vote Recording Service
//!
//! Serves the event registry, vote recording and finalization jobs over
//! HTTP, backed by a single SQLite database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diad::api::{AppState, HttpServer};
use diad::clock::{Clock, SystemClock};
use diad::config::{DiadConfig, LoggingConfig};
use diad::error::{Error, Result};
use diad::event::EventRegistry;
use diad::finalize::{FinalizationJob, Job, JobStatus, WorkerPool};
use diad::id::{EventId, UserId};
use diad::store::Store;

/// Diad - Election-Day Vote Recording Service
#[derive(Parser)]
#[command(name = "diad")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "diad.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "diad.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show service configuration
    Info,

    /// Run finalization for one event and wait for it
    Finalize {
        /// Election event id
        #[arg(long)]
        event: i64,

        /// User recorded as `validated_by` in the history
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = DiadConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or_else(|| logging.level.clone());
    init_logging(&level, &logging);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Finalize { event, user } => {
            run_finalize(cli.config, EventId(event), UserId(user)).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format.as_str() {
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn load_config(config_path: &Path) -> Result<DiadConfig> {
    DiadConfig::from_file(config_path).map_err(|e| {
        tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
        e
    })
}

/// Start the service
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting Diad...");

    let config = load_config(&config_path)?;
    let offset = config.utc_offset()?;
    tracing::info!(
        "Campaign timezone UTC{}, activation policy {:?}",
        offset,
        config.events.activation_policy
    );

    let store = Arc::new(Store::open(config.data_dir())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(offset));

    let finalizer = Arc::new(FinalizationJob::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.finalization.chunk_size,
    ));
    let (jobs, pool) = WorkerPool::start(finalizer, &config.finalization);
    tracing::info!("Started {} finalization workers", config.finalization.workers);

    let state = Arc::new(AppState::new(
        store,
        clock,
        config.events.activation_policy,
        jobs,
    ));
    let server = HttpServer::new(config.api.clone(), state);

    tokio::select! {
        result = server.start(), if config.api.enabled => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Dropping the server releases the last dispatcher; workers drain the queue
    drop(server);
    pool.join().await;

    tracing::info!("Diad stopped");
    Ok(())
}

/// Generate a sample configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# Diad Configuration
# Generated configuration file

[server]
data_dir = "/var/lib/diad"
# Campaign timezone as minutes east of UTC (-300 = UTC-5)
utc_offset_minutes = -300

[api]
enabled = true
bind_address = "0.0.0.0:8080"
cors_enabled = false

[logging]
level = "info"
format = "pretty"

[events]
# deactivate_others | reject
activation_policy = "deactivate_others"

[finalization]
chunk_size = 500
workers = 2
queue_capacity = 1000
max_attempts = 3
retry_backoff_ms = 1000
status_retention_secs = 3600
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to set the data directory and campaign timezone.");
    println!("Then start with: diad --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match DiadConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Data Directory: {}", config.data_dir().display());
            println!("  API: {}", config.api.bind_address);
            println!("  Timezone: UTC{}", config.utc_offset()?);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show service information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = DiadConfig::from_file(&config_path)?;

    println!("Diad Service Information");
    println!("========================");
    println!();
    println!("Data Directory:   {}", config.data_dir().display());
    println!("Database:         {}", config.database_path().display());
    println!("Timezone:         UTC{}", config.utc_offset()?);
    println!();
    println!("API Configuration:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);
    println!("  CORS:           {}", config.api.cors_enabled);
    println!();
    println!("Events:");
    println!("  Activation:     {:?}", config.events.activation_policy);
    println!();
    println!("Finalization:");
    println!("  Chunk Size:     {}", config.finalization.chunk_size);
    println!("  Workers:        {}", config.finalization.workers);
    println!("  Max Attempts:   {}", config.finalization.max_attempts);
    println!("  Retry Backoff:  {} ms", config.finalization.retry_backoff_ms);
    println!("  Status Kept:    {} s", config.finalization.status_retention_secs);

    Ok(())
}

/// Run one finalization job against the local database
async fn run_finalize(config_path: PathBuf, event_id: EventId, validated_by: UserId) -> Result<()> {
    let config = load_config(&config_path)?;
    let store = Arc::new(Store::open(config.data_dir())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.utc_offset()?));

    let registry = EventRegistry::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.events.activation_policy,
    );
    match registry.get_event(event_id).await {
        Ok(event) if event.is_active => {
            eprintln!("✗ Event {} is still active; deactivate it before finalizing", event_id);
            return Err(Error::EventStillActive(event_id));
        }
        Ok(_) | Err(Error::EventNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let finalizer = Arc::new(FinalizationJob::new(store, clock, config.finalization.chunk_size));
    let (jobs, pool) = WorkerPool::start(finalizer, &config.finalization);

    let ticket = jobs.dispatch(Job::FinalizeEvent { event_id, validated_by }).await?;
    let status = ticket.wait().await?;
    drop(jobs);
    pool.join().await;

    match status {
        JobStatus::Succeeded { attempts, report } if report.skipped => {
            println!("Event {} does not exist; nothing to do ({} attempt(s))", event_id, attempts);
            Ok(())
        }
        JobStatus::Succeeded { attempts, report } => {
            println!("✓ Event {} finalized", event_id);
            println!("  Marked did_not_vote: {}", report.marked);
            println!("  Chunks:              {}", report.chunks);
            println!("  Attempts:            {}", attempts);
            Ok(())
        }
        JobStatus::Failed { attempts, error } => {
            eprintln!("✗ Finalization failed after {} attempt(s): {}", attempts, error);
            Err(Error::Internal(error))
        }
        other => Err(Error::Internal(format!("unexpected job status: {:?}", other))),
    }
}
