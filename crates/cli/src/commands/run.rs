//! `run` command implementation.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use config_loader::{BlueprintOverrides, ConfigLoader};
use contracts::SessionBlueprint;
use session::{SessionManager, SessionReport, SimulatedSourceFactory};

use super::{describe_sinks, ensure_config_exists};
use crate::cli::RunArgs;
use crate::error::{self, CliError};
use crate::summary;

/// Why a recording ended
#[derive(Debug, Clone, Copy)]
enum StopReason {
    Signal,
    Duration,
    SourceFinished,
}

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    let blueprint = prepare_blueprint(args).context("Failed to prepare configuration")?;

    info!(
        data_dir = %blueprint.data_dir.display(),
        frequency_hz = blueprint.source.frequency_hz,
        sinks = ?blueprint.enabled_sinks(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, &args.participant);
        return Ok(());
    }

    let report = record(blueprint, args)
        .await
        .context("Recording failed")?;

    info!(
        produced = report.source.produced,
        distributed = report.distributed,
        dropped = report.total_dropped(),
        duration_secs = report.duration.as_secs_f64(),
        "Recording finished"
    );
    if let Some(ref error) = report.source.error {
        warn!(error = %error, "Source ended with an error");
    }
    for name in report.failed_sinks() {
        warn!(sink = %name, "Sink never opened its destination");
    }

    if args.json {
        let json = serde_json::to_string_pretty(&summary::ReportView::from(&report))
            .context("Failed to serialize session report")?;
        println!("{}", json);
    } else {
        summary::print_summary(&report);
    }

    Ok(())
}

/// File (or defaults) plus command-line overrides
fn prepare_blueprint(args: &RunArgs) -> error::Result<SessionBlueprint> {
    match &args.config {
        Some(path) => {
            ensure_config_exists(path)?;
            info!(config = %path.display(), "Loading configuration");
        }
        None => info!("No configuration file given, using defaults"),
    }

    let overrides = BlueprintOverrides {
        data_dir: args.data_dir.clone(),
        frequency_hz: args.frequency,
        seed: args.seed,
    };
    let blueprint = ConfigLoader::load_with_overrides(args.config.as_deref(), &overrides)?;
    if !overrides.is_empty() {
        info!(overrides = ?overrides, "Applied command-line overrides");
    }
    Ok(blueprint)
}

/// Start one recording and stop it on signal, timeout or end of source
async fn record(blueprint: SessionBlueprint, args: &RunArgs) -> error::Result<SessionReport> {
    let factory = match args.max_samples {
        0 => SimulatedSourceFactory::new(),
        count => SimulatedSourceFactory::new().with_max_samples(count),
    };
    let duration = (args.duration > 0).then(|| Duration::from_secs(args.duration));

    let mut manager = SessionManager::new(blueprint, factory);
    let participant_dir: PathBuf = manager.set_participant(&args.participant)?;
    manager.start_recording().await?;

    info!(
        participant = %args.participant,
        dir = %participant_dir.display(),
        duration_secs = ?duration.map(|d| d.as_secs()),
        "Recording (Ctrl+C to stop)"
    );

    let reason = wait_for_stop(&manager, duration).await;
    info!(reason = ?reason, "Stopping recording");

    manager
        .stop_recording()
        .await?
        .ok_or_else(|| CliError::shutdown("recording was not active at shutdown"))
}

async fn wait_for_stop(manager: &SessionManager, duration: Option<Duration>) -> StopReason {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    let source_done = async {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            ticker.tick().await;
            if manager.runner().map_or(true, |runner| runner.source_finished()) {
                break;
            }
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {
            warn!("Received shutdown signal");
            StopReason::Signal
        }
        _ = deadline => StopReason::Duration,
        _ = source_done => StopReason::SourceFinished,
    }
}

/// Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &SessionBlueprint, participant: &str) {
    println!("\n=== Configuration Summary ===\n");
    println!(
        "Output: {}",
        blueprint.data_dir.join(participant.trim()).display()
    );
    println!(
        "Source: simulated, {} Hz, {}x{} px",
        blueprint.source.frequency_hz,
        blueprint.source.screen_width_px,
        blueprint.source.screen_height_px
    );

    let sinks = describe_sinks(blueprint);
    println!("\nSinks ({}):", sinks.len());
    for (name, target) in sinks {
        println!("  - {}: {}", name, target);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    use crate::cli::{Cli, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["gaze-capture", "run", "--participant", "p01"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let args = run_args(&["--frequency", "0"]);
        let err = prepare_blueprint(&args).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_overrides_apply_to_defaults() {
        let args = run_args(&["--data-dir", "/tmp/gaze", "--seed", "7"]);
        let blueprint = prepare_blueprint(&args).unwrap();
        assert_eq!(blueprint.data_dir, PathBuf::from("/tmp/gaze"));
        assert_eq!(blueprint.source.seed, Some(7));
    }

    #[test]
    fn test_missing_config_is_not_a_parse_error() {
        let args = run_args(&["--config", "/nonexistent/gaze.toml", "--seed", "7"]);
        let err = prepare_blueprint(&args).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn test_record_stops_when_source_finishes() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let args = run_args(&["--data-dir", data_dir, "--max-samples", "30", "--frequency", "500"]);

        let mut blueprint = prepare_blueprint(&args).unwrap();
        blueprint.sinks.broadcast.enabled = false;
        blueprint.sinks.csv.enabled = true;

        let report = record(blueprint, &args).await.unwrap();
        assert_eq!(report.source.produced, 30);
        assert_eq!(report.sink("csv").unwrap().metrics.write_count, 30);
        assert_eq!(report.output_dir, dir.path().join("p01"));
    }
}
