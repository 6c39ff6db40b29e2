//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_session;
pub use validate::run_validate;

use std::path::Path;

use config_loader::ConfigLoader;
use contracts::SessionBlueprint;

use crate::error::{CliError, Result};

/// A missing file is reported apart from parse and validation errors
fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(())
}

fn load_blueprint(path: &Path) -> Result<SessionBlueprint> {
    ensure_config_exists(path)?;
    Ok(ConfigLoader::load_from_path(path)?)
}

/// Enabled sinks with a one-line description of where they write
fn describe_sinks(blueprint: &SessionBlueprint) -> Vec<(&'static str, String)> {
    let sinks = &blueprint.sinks;
    blueprint
        .enabled_sinks()
        .into_iter()
        .map(|name| {
            let target = match name {
                "csv" => format!("{}_<timestamp>.csv", sinks.csv.file_prefix),
                "parquet" => format!(
                    "{}_<timestamp>.parquet (flush every {} rows, queue {}, {})",
                    sinks.parquet.file_prefix,
                    sinks.parquet.max_buffer_size,
                    sinks.parquet.queue_size,
                    if sinks.parquet.drop_when_full {
                        "drop when full"
                    } else {
                        "block when full"
                    }
                ),
                "broadcast" => format!(
                    "PUB {} (hwm {})",
                    sinks.broadcast.endpoint, sinks.broadcast.high_water_mark
                ),
                _ => format!(
                    "POST {} (bundles of {} / {}s, {} concurrent, {} attempts)",
                    sinks.remote.server_url,
                    sinks.remote.bundle_size,
                    sinks.remote.max_bundle_interval_s,
                    sinks.remote.max_concurrent_sends,
                    sinks.remote.retry_attempts
                ),
            };
            (name, target)
        })
        .collect()
}
