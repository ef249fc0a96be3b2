//! zebrunner-reporter CLI - drives the reporting core from recorded events.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use zebrunner_reporter::api::ZebrunnerClient;
use zebrunner_reporter::config::{self, Settings};
use zebrunner_reporter::events::{parse_events, replay};
use zebrunner_reporter::framework::TestItem;
use zebrunner_reporter::logs::LogShipper;
use zebrunner_reporter::orchestrator::ReportingService;

#[derive(Parser)]
#[command(name = "zebrunner-reporter")]
#[command(about = "Report test lifecycle events to a Zebrunner reporting service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "zebrunner.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines lifecycle event file against the service
    Replay {
        /// Event file, one JSON event per line
        events: PathBuf,
    },

    /// Narrow a JSON array of collected items to the configured rerun context
    Filter {
        /// Item file, a JSON array of test items
        items: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let shipper = LogShipper::new();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(shipper.layer())
        .try_init()?;

    match cli.command {
        Commands::Replay { events } => replay_events(&cli.config, &events, shipper).await,
        Commands::Filter { items } => filter_items(&cli.config, &items).await,
        Commands::Validate => validate_config(&cli.config),
    }
}

/// Loads the config file, falling back to defaults plus environment
/// overrides when it does not exist.
fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        let settings = config::load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        return Ok(settings);
    }

    let mut settings = Settings::default();
    settings.apply_env(|key| std::env::var(key).ok())?;
    info!(
        "No config file at {}; using environment settings",
        path.display()
    );
    Ok(settings)
}

async fn replay_events(config_path: &Path, events_path: &Path, shipper: LogShipper) -> Result<()> {
    let settings = load_settings(config_path)?;
    let content = std::fs::read_to_string(events_path)
        .with_context(|| format!("Failed to read events from {}", events_path.display()))?;
    let events = parse_events(&content)?;

    let client = ZebrunnerClient::from_config(&settings.server)?;
    let mut service = ReportingService::new(settings, client).with_log_shipper(shipper);
    let summary = replay(&mut service, events).await;

    println!(
        "Replayed {} events ({} tests)",
        summary.events, summary.tests
    );
    Ok(())
}

async fn filter_items(config_path: &Path, items_path: &Path) -> Result<()> {
    let settings = load_settings(config_path)?;
    let content = std::fs::read_to_string(items_path)
        .with_context(|| format!("Failed to read items from {}", items_path.display()))?;
    let items: Vec<TestItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse items from {}", items_path.display()))?;

    let client = ZebrunnerClient::from_config(&settings.server)?;
    let mut service = ReportingService::new(settings, client);
    let kept = service.filter_items(items).await;

    for item in &kept {
        println!("{}", item.node_id);
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let settings = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    settings.validate()?;

    println!("Configuration is valid!");
    println!("  Enabled: {}", settings.enabled);
    println!("  Project: {}", settings.project_key);
    println!(
        "  Server: {}",
        settings.server.hostname.as_deref().unwrap_or("<unset>")
    );
    println!("  Run: {}", settings.run.display_name);
    println!("  Send logs: {}", settings.send_logs);
    if settings.run.context.is_some() {
        println!("  Rerun context: configured");
    }

    Ok(())
}
