//! `joule`: control a Joule circulator through a TCP bridge.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use joule_coordinator::{
    ConfigError, CoordinatorError, DeviceCoordinator, DisplayUnit, FileStore, Snapshot,
    UnknownUnit,
};
use joule_metrics::{describe_metrics, InMemoryRecorder};
use joule_transport::TcpTransport;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Control a Joule sous-vide circulator.
#[derive(Parser, Debug)]
#[command(name = "joule")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bridge address (`host:port`), overrides the config file.
    #[arg(short, long, global = true)]
    bridge: Option<String>,

    /// Preference file, overrides the config file.
    #[arg(long, global = true)]
    preferences: Option<PathBuf>,

    /// How long to wait for a data point, in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print the collected metrics as JSON before exiting.
    #[arg(long, global = true)]
    metrics: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Read the current state once.
    Status {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Start a cook.
    Start {
        /// Target temperature in the display unit. Defaults to the stored target.
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Cook time in minutes (0 = no limit).
        #[arg(short, long)]
        minutes: Option<u32>,
    },
    /// Stop the current cook.
    Stop,
    /// Poll continuously and print every update until interrupted.
    Watch {
        /// Poll interval in milliseconds, overrides the config file.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Show or change the display unit (F or C).
    Unit {
        /// New unit.
        unit: Option<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Unit(#[from] UnknownUnit),

    #[error("JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_logging(verbose: u8) {
    let env_filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("joule=info")),
        1 => EnvFilter::new("joule=debug"),
        _ => EnvFilter::new("joule=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Install an in-memory recorder so emitted metrics can be dumped on exit.
fn init_metrics() -> Option<Arc<InMemoryRecorder>> {
    let recorder = Arc::new(InMemoryRecorder::new());
    if metrics::set_global_recorder(Arc::clone(&recorder)).is_err() {
        warn!("metrics recorder already installed");
        return None;
    }
    describe_metrics();
    Some(recorder)
}

fn print_metrics(recorder: &InMemoryRecorder) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&recorder.snapshot())?);
    Ok(())
}

/// Merge the config file with command-line overrides.
fn load_config(args: &Args) -> Result<CliConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };
    if let Some(bridge) = &args.bridge {
        config.bridge = bridge.clone();
    }
    if let Some(preferences) = &args.preferences {
        config.preferences = preferences.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.coordinator.notification_timeout_ms = timeout_ms;
    }
    if let Command::Watch {
        interval_ms: Some(interval_ms),
    } = args.command
    {
        config.coordinator.poll_interval_ms = interval_ms;
    }
    config.validate()?;
    Ok(config)
}

fn format_snapshot(snapshot: &Snapshot) -> String {
    let unit = snapshot.display_unit;
    let step = snapshot
        .program_step
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = if snapshot.duration_seconds == 0 {
        "no limit".to_string()
    } else {
        format!("{} min", snapshot.duration_seconds / 60)
    };
    format!(
        "bath {:.1}{unit}  target {:.1}{unit}  {}  step {}  remaining {} min  duration {}",
        snapshot.current_temperature_display(),
        snapshot.target_temperature_display(),
        if snapshot.is_operating { "running" } else { "idle" },
        step,
        snapshot.time_remaining_seconds / 60,
        duration,
    )
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(&args)?;
    debug!("using bridge {} ({})", config.bridge, config.coordinator.name);

    let transport = TcpTransport::new(config.bridge.clone(), config.coordinator.connect_timeout());
    let store = Arc::new(FileStore::new(config.preferences.clone()));
    let coordinator = DeviceCoordinator::new(transport, config.coordinator.clone(), store)?;

    match args.command {
        Command::Status { json } => {
            let snapshot = coordinator.refresh().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("{}", format_snapshot(&snapshot));
            }
        }
        Command::Start {
            temperature,
            minutes,
        } => {
            if let Some(value) = temperature {
                coordinator.set_target_temperature_display(value)?;
            }
            if let Some(minutes) = minutes {
                coordinator.set_duration(minutes.saturating_mul(60))?;
            }
            coordinator.start_with_stored().await?;
            println!("{}", format_snapshot(&coordinator.read_snapshot()));
        }
        Command::Stop => {
            coordinator.stop().await?;
            println!("{}", format_snapshot(&coordinator.read_snapshot()));
        }
        Command::Watch { .. } => {
            let mut updates = coordinator.subscribe();
            let poller = coordinator.spawn_poller();
            info!(
                "watching {} every {:?}",
                config.bridge,
                config.coordinator.poll_interval()
            );
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = *updates.borrow_and_update();
                        println!("{}", format_snapshot(&snapshot));
                    }
                    signal = tokio::signal::ctrl_c() => {
                        signal?;
                        info!("interrupted");
                        break;
                    }
                }
            }
            poller.abort();
            coordinator.disconnect().await?;
        }
        Command::Unit { unit } => {
            if let Some(unit) = unit {
                let unit: DisplayUnit = unit.parse()?;
                coordinator.set_display_unit(unit)?;
            }
            println!("{}", coordinator.read_snapshot().display_unit);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    let recorder = init_metrics();
    let dump_metrics = args.metrics;

    let result = run(args).await;
    if let (true, Some(recorder)) = (dump_metrics, &recorder) {
        if let Err(e) = print_metrics(recorder) {
            error!("{}", e);
        }
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
