//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Gaze Capture - eye-tracking sample recording and streaming
#[derive(Parser, Debug)]
#[command(
    name = "gaze-capture",
    author,
    version,
    about = "Gaze sample capture and streaming pipeline",
    long_about = "Records gaze samples for a participant and streams them to the configured outputs.\n\n\
                  Samples fan out to CSV and Parquet files, a ZeroMQ PUB socket, and an HTTP \n\
                  endpoint receiving protobuf bundles."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "GAZE_CAPTURE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "GAZE_CAPTURE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Prometheus port, only for `run`
    pub fn metrics_port(&self) -> Option<u16> {
        match &self.command {
            Commands::Run(args) if args.metrics_port != 0 => Some(args.metrics_port),
            _ => None,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one session with the simulated source
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults if omitted
    #[arg(short, long, env = "GAZE_CAPTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Participant id; recordings go to <data-dir>/<participant>
    #[arg(short, long, env = "GAZE_CAPTURE_PARTICIPANT")]
    pub participant: String,

    /// Override the recording root directory
    #[arg(long, env = "GAZE_CAPTURE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the simulated sampling frequency (Hz)
    #[arg(long, env = "GAZE_CAPTURE_FREQUENCY")]
    pub frequency: Option<f64>,

    /// Seed for the simulated source
    #[arg(long, env = "GAZE_CAPTURE_SEED")]
    pub seed: Option<u64>,

    /// Recording length in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "GAZE_CAPTURE_DURATION")]
    pub duration: u64,

    /// Stop after this many samples (0 = unlimited)
    #[arg(long, default_value = "0", env = "GAZE_CAPTURE_MAX_SAMPLES")]
    pub max_samples: u64,

    /// Validate configuration and exit without recording
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "GAZE_CAPTURE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print the session report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml", env = "GAZE_CAPTURE_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "GAZE_CAPTURE_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show simulated source parameters
    #[arg(long)]
    pub source: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
