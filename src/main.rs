use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use snapshot_rotator::config::{self, expand_tilde, resolve_share_account, BackupPlan, Config};
use snapshot_rotator::managers::coordinator::{AwsProviderFactory, RunCoordinator, RunSettings};
use snapshot_rotator::managers::logging;
use snapshot_rotator::managers::rotation::EngineOptions;
use snapshot_rotator::utils::RunLock;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "snapshot-rotator")]
#[command(about = "Tag-driven EBS and RDS snapshot rotation", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot and rotate the resources named by an invocation event
    Run {
        /// Event JSON file, or "-" for stdin
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// List what would be created and deleted without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Check an invocation event and show the resolved plan
    Validate {
        /// Event JSON file, or "-" for stdin
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(expand_tilde(path))
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::default(),
    };

    // File logging only when a config file says where; stdout stays JSON-only
    let _log_guard = if cli.config.is_some() {
        Some(logging::init_logging(&logging::LoggingConfig::from_global(
            &config.global,
        ))?)
    } else {
        logging::init_console_logging();
        None
    };

    match cli.command {
        Commands::Run { event, dry_run } => handle_run(&config, event.as_deref(), dry_run),
        Commands::Validate { event } => handle_validate(&config, event.as_deref()),
    }
}

fn resolve(event_path: Option<&Path>) -> Result<(serde_json::Value, BackupPlan)> {
    let payload = config::load_event(event_path)?;
    let event = config::parse_event(&payload)?;
    let plan = config::resolve_plan(&event, Utc::now())?;
    Ok((payload, plan))
}

fn handle_run(config: &Config, event_path: Option<&Path>, dry_run: bool) -> Result<ExitCode> {
    let (payload, plan) = resolve(event_path)?;

    let _lock = if plan.is_noop() {
        None
    } else {
        Some(RunLock::acquire(
            &expand_tilde(&config.global.lock_directory),
            &RunLock::schedule_name(&plan.region, &plan.period),
        )?)
    };

    if dry_run {
        info!("Dry run: no snapshots will be created or deleted");
    }

    let settings = RunSettings {
        share_account: resolve_share_account(&config.global),
        engine: EngineOptions {
            creation_failure: config.global.creation_failure,
            dry_run,
        },
        notifications_enabled: config.notifications.enabled,
    };

    let coordinator = RunCoordinator::new(
        AwsProviderFactory::new(config.global.endpoint_url.clone()),
        settings,
    );
    let outcome = coordinator.execute_plan(payload, &plan)?;

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn handle_validate(config: &Config, event_path: Option<&Path>) -> Result<ExitCode> {
    let (_, plan) = resolve(event_path)?;

    println!("✓ Event is valid\n");
    println!("Period:       {}", plan.period);
    println!("Region:       {}", plan.region);
    if plan.is_noop() {
        println!("Date suffix:  (not used)");
    } else {
        println!("Date suffix:  {}", plan.date_suffix);
    }
    println!("Keep count:   {}", plan.keep_count);

    match &plan.volume_filter {
        Some(filter) => println!("EC2 volumes:  {}", filter),
        None => println!("EC2 volumes:  (not configured)"),
    }
    match &plan.database_filter {
        Some(filter) => println!("RDS:          {}", filter),
        None => println!("RDS:          (not configured)"),
    }

    println!(
        "Success SNS:  {}",
        plan.success_topic.as_deref().unwrap_or("(none)")
    );
    println!(
        "Error SNS:    {}",
        plan.error_topic.as_deref().unwrap_or("(none)")
    );
    println!(
        "Share with:   {}",
        resolve_share_account(&config.global).as_deref().unwrap_or("(none)")
    );

    if plan.is_noop() {
        println!("\nNo tag filter configured; a run would change nothing.");
    }

    Ok(ExitCode::SUCCESS)
}
