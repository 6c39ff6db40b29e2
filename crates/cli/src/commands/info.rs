//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::SessionBlueprint;

use super::{describe_sinks, load_blueprint};
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    data_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceInfo>,
    pipeline: PipelineInfo,
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SourceInfo {
    frequency_hz: f64,
    screen_width_px: u32,
    screen_height_px: u32,
    radius: f64,
    center: (f64, f64),
    speed_rev_per_s: f64,
    invalid_probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct PipelineInfo {
    source_queue_capacity: usize,
    branch_queue_capacity: usize,
}

#[derive(Serialize)]
struct SinkInfo {
    name: &'static str,
    target: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &SessionBlueprint, args: &InfoArgs) -> ConfigInfo {
    let source = args.source.then(|| {
        let s = &blueprint.source;
        SourceInfo {
            frequency_hz: s.frequency_hz,
            screen_width_px: s.screen_width_px,
            screen_height_px: s.screen_height_px,
            radius: s.radius,
            center: s.center,
            speed_rev_per_s: s.speed_rev_per_s,
            invalid_probability: s.invalid_probability,
            seed: s.seed,
        }
    });

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        data_dir: blueprint.data_dir.display().to_string(),
        source,
        pipeline: PipelineInfo {
            source_queue_capacity: blueprint.pipeline.source_queue_capacity,
            branch_queue_capacity: blueprint.pipeline.branch_queue_capacity,
        },
        sinks: describe_sinks(blueprint)
            .into_iter()
            .map(|(name, target)| SinkInfo { name, target })
            .collect(),
    }
}

fn print_config_info(blueprint: &SessionBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Gaze Capture Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Session");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   └─ Data dir: {}", blueprint.data_dir.display());

    let source = &blueprint.source;
    println!("\n👁  Source (simulated)");
    if args.source {
        println!("   ├─ Frequency: {} Hz", source.frequency_hz);
        println!(
            "   ├─ Screen: {}x{} px",
            source.screen_width_px, source.screen_height_px
        );
        println!(
            "   ├─ Path: radius {} around ({}, {}), {} rev/s",
            source.radius, source.center.0, source.center.1, source.speed_rev_per_s
        );
        println!("   ├─ Invalid probability: {}", source.invalid_probability);
        match source.seed {
            Some(seed) => println!("   └─ Seed: {}", seed),
            None => println!("   └─ Seed: random"),
        }
    } else {
        println!("   └─ Frequency: {} Hz", source.frequency_hz);
    }

    println!("\n⚙️  Queues");
    println!(
        "   ├─ Source: {}",
        blueprint.pipeline.source_queue_capacity
    );
    println!(
        "   └─ Per branch: {}",
        blueprint.pipeline.branch_queue_capacity
    );

    let sinks = describe_sinks(blueprint);
    println!("\n📤 Sinks ({})", sinks.len());
    for (i, (name, target)) in sinks.iter().enumerate() {
        let is_last = i == sinks.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        println!("   {} {}: {}", prefix, name, target);
    }

    println!();
}
