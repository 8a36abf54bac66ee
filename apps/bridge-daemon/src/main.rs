//! # Attendance Bridge Daemon
//!
//! Keeps the local terminal server's employees in step with the cloud and
//! forwards its punches upward.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attendance-bridge [--config bridge.toml] [run]                        │
//! │      load config → open store → spawn scheduler → wait for signal      │
//! │                                                                         │
//! │  attendance-bridge trigger <kind> [--lookback-mins N]                  │
//! │      load config → open store → run one trigger → print result         │
//! │                                                                         │
//! │  kinds: heartbeat backfill users upload retention reset-auth           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `BRIDGE_DISABLE_SCHEDULER=1` makes `run` exit without scheduling
//! anything (used when a second instance shares the host).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bridge_db::{Database, DbConfig};
use bridge_sync::config::MAX_LOOKBACK_MINS;
use bridge_sync::{scheduler, BridgeConfig, SyncOrchestrator, Trigger};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "attendance-bridge", version, about = "Local terminal server to cloud attendance bridge")]
struct Cli {
    /// Path to bridge.toml (defaults to the platform config directory).
    #[arg(long, short, env = "BRIDGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run every trigger on its schedule until stopped.
    Run,

    /// Run a single trigger and exit.
    Trigger {
        #[arg(value_enum)]
        kind: TriggerKind,

        /// Backfill window in minutes.
        #[arg(
            long,
            default_value_t = 35,
            value_parser = clap::value_parser!(u64).range(1..=MAX_LOOKBACK_MINS)
        )]
        lookback_mins: u64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerKind {
    Heartbeat,
    Backfill,
    Users,
    Upload,
    Retention,
    ResetAuth,
}

impl TriggerKind {
    fn into_trigger(self, lookback_mins: u64) -> Trigger {
        match self {
            TriggerKind::Heartbeat => Trigger::Heartbeat,
            TriggerKind::Backfill => Trigger::Backfill {
                lookback: chrono::Duration::minutes(lookback_mins.min(MAX_LOOKBACK_MINS) as i64),
            },
            TriggerKind::Users => Trigger::UserSync,
            TriggerKind::Upload => Trigger::ForcedUpload,
            TriggerKind::Retention => Trigger::RetentionSweep,
            TriggerKind::ResetAuth => Trigger::ResetAuth,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_service(config).await,
        Command::Trigger {
            kind,
            lookback_mins,
        } => run_once(config, kind.into_trigger(lookback_mins)).await,
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default of `info` (with sqlx quietened).
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn open_database(config: &BridgeConfig) -> anyhow::Result<Database> {
    let path = &config.database.path;
    let db = Database::new(DbConfig::new(path))
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    info!(path = %path.display(), "Database ready");
    Ok(db)
}

async fn run_service(config: BridgeConfig) -> anyhow::Result<()> {
    if scheduler_disabled(|key| std::env::var(key).ok()) {
        info!("BRIDGE_DISABLE_SCHEDULER is set, not scheduling any trigger");
        return Ok(());
    }

    let db = open_database(&config).await?;
    let orchestrator = Arc::new(SyncOrchestrator::new(config.clone(), db.clone())?);

    let handle = scheduler::spawn(orchestrator, scheduler::plan(&config.schedule));
    info!(
        tasks = handle.task_count(),
        local = %config.local.base_url,
        cloud = %config.cloud.base_url,
        "Attendance bridge running"
    );

    shutdown_signal().await;

    handle.shutdown().await;
    db.close().await;
    info!("Attendance bridge stopped");
    Ok(())
}

async fn run_once(config: BridgeConfig, trigger: Trigger) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let orchestrator = SyncOrchestrator::new(config, db.clone())?;

    let result = orchestrator.run(trigger).await;
    db.close().await;

    let report = result.with_context(|| format!("trigger {} failed", trigger))?;
    println!("{}: {}", trigger, report);
    Ok(())
}

fn scheduler_disabled<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup("BRIDGE_DISABLE_SCHEDULER")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping scheduler...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["attendance-bridge"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_trigger_parsing() {
        let cli = Cli::try_parse_from([
            "attendance-bridge",
            "trigger",
            "backfill",
            "--lookback-mins",
            "420",
            "--config",
            "/etc/bridge.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/bridge.toml")));
        match cli.command {
            Some(Command::Trigger {
                kind,
                lookback_mins,
            }) => {
                assert_eq!(
                    kind.into_trigger(lookback_mins),
                    Trigger::Backfill {
                        lookback: chrono::Duration::hours(7)
                    }
                );
            }
            other => panic!("unexpected command {other:?}"),
        }

        let reset = Cli::try_parse_from(["attendance-bridge", "trigger", "reset-auth"]).unwrap();
        assert!(matches!(
            reset.command,
            Some(Command::Trigger {
                kind: TriggerKind::ResetAuth,
                ..
            })
        ));
    }

    #[test]
    fn test_lookback_mins_is_bounded() {
        let parse = |mins: String| {
            Cli::try_parse_from([
                "attendance-bridge".to_string(),
                "trigger".to_string(),
                "backfill".to_string(),
                "--lookback-mins".to_string(),
                mins,
            ])
        };

        assert!(parse("0".into()).is_err());
        assert!(parse((MAX_LOOKBACK_MINS + 1).to_string()).is_err());
        assert!(parse(u64::MAX.to_string()).is_err());

        let cli = parse(MAX_LOOKBACK_MINS.to_string()).unwrap();
        match cli.command {
            Some(Command::Trigger {
                kind,
                lookback_mins,
            }) => {
                assert_eq!(
                    kind.into_trigger(lookback_mins),
                    Trigger::Backfill {
                        lookback: chrono::Duration::days(366)
                    }
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_trigger_is_rejected() {
        assert!(Cli::try_parse_from(["attendance-bridge", "trigger", "payroll"]).is_err());
    }

    #[test]
    fn test_scheduler_disable_flag() {
        assert!(scheduler_disabled(|_| Some("1".into())));
        assert!(!scheduler_disabled(|_| Some("0".into())));
        assert!(!scheduler_disabled(|_| None));
    }
}
