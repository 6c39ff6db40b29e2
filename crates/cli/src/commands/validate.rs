//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::SessionBlueprint;

use super::load_blueprint;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    data_dir: String,
    frequency_hz: f64,
    sinks: Vec<&'static str>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    data_dir: blueprint.data_dir.display().to_string(),
                    frequency_hz: blueprint.source.frequency_hz,
                    sinks: blueprint.enabled_sinks(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SessionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let sinks = &blueprint.sinks;
    // one second of samples
    let per_second = blueprint.source.frequency_hz.ceil() as usize;

    if blueprint.pipeline.branch_queue_capacity < per_second {
        warnings.push(format!(
            "pipeline.branch_queue_capacity ({}) holds less than one second of samples",
            blueprint.pipeline.branch_queue_capacity
        ));
    }

    if sinks.parquet.enabled && !sinks.parquet.drop_when_full {
        warnings.push(
            "sinks.parquet.drop_when_full is false - a slow disk stalls every other sink"
                .to_string(),
        );
    }

    if sinks.broadcast.enabled {
        if sinks.broadcast.endpoint.contains("0.0.0.0") || sinks.broadcast.endpoint.contains('*')
        {
            warnings.push(format!(
                "sinks.broadcast.endpoint ({}) listens on all interfaces",
                sinks.broadcast.endpoint
            ));
        }
        if sinks.broadcast.high_water_mark < per_second {
            warnings.push(format!(
                "sinks.broadcast.high_water_mark ({}) holds less than one second of samples",
                sinks.broadcast.high_water_mark
            ));
        }
    }

    if sinks.remote.enabled && sinks.remote.retry_attempts == 1 {
        warnings.push("sinks.remote.retry_attempts is 1 - failed bundles are not retried".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Data dir: {}", summary.data_dir);
            println!("  Frequency: {} Hz", summary.frequency_hz);
            println!("  Sinks: {}", summary.sinks.join(", "));
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn validate_str(content: &str) -> ValidationResult {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        })
    }

    #[test]
    fn test_default_config_warns_about_open_endpoint() {
        let result = validate_str("data_dir = \"./recordings\"\n");
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("all interfaces"));
        assert_eq!(result.summary.unwrap().sinks, vec!["parquet", "broadcast"]);
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let result = validate_str("[sinks.parquet]\nmax_buffer_size = 10\nqueue_size = 5\n");
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&ValidateArgs {
            config: "/nonexistent/config.toml".into(),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }
}
