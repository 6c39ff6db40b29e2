//! Session report rendering.

use std::collections::BTreeMap;

use serde::Serialize;
use session::SessionReport;

/// JSON form of a session report
#[derive(Serialize)]
pub struct ReportView<'a> {
    output_dir: String,
    started_at: String,
    duration_secs: f64,
    samples_per_second: f64,
    source: SourceView<'a>,
    distributed: u64,
    total_dropped: u64,
    sinks: Vec<SinkView<'a>>,
}

#[derive(Serialize)]
struct SourceView<'a> {
    name: &'a str,
    produced: u64,
    dropped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct SinkView<'a> {
    name: &'a str,
    started: bool,
    written: u64,
    failed: u64,
    dropped: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<&'static str, u64>,
}

impl<'a> From<&'a SessionReport> for ReportView<'a> {
    fn from(report: &'a SessionReport) -> Self {
        Self {
            output_dir: report.output_dir.display().to_string(),
            started_at: report.started_at.to_rfc3339(),
            duration_secs: report.duration.as_secs_f64(),
            samples_per_second: report.samples_per_second(),
            source: SourceView {
                name: &report.source.name,
                produced: report.source.produced,
                dropped: report.source.dropped,
                error: report.source.error.as_deref(),
            },
            distributed: report.distributed,
            total_dropped: report.total_dropped(),
            sinks: report
                .sinks
                .iter()
                .map(|sink| SinkView {
                    name: &sink.name,
                    started: sink.started,
                    written: sink.metrics.write_count,
                    failed: sink.metrics.failure_count,
                    dropped: sink.metrics.dropped_count,
                    extra: sink.extra.iter().copied().collect(),
                })
                .collect(),
        }
    }
}

/// Print detailed summary
pub fn print_summary(report: &SessionReport) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Session Statistics                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📊 Overview");
    println!("   ├─ Output: {}", report.output_dir.display());
    println!("   ├─ Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   ├─ Duration: {:.2}s", report.duration.as_secs_f64());
    println!("   ├─ Samples produced: {}", report.source.produced);
    println!("   ├─ Samples distributed: {}", report.distributed);
    println!("   ├─ Rate: {:.2} Hz", report.samples_per_second());
    println!("   └─ Dropped (total): {}", report.total_dropped());

    if report.source.dropped > 0 || report.source.error.is_some() {
        println!("\n⚠️  Source ({})", report.source.name);
        println!("   ├─ Rejected by full queue: {}", report.source.dropped);
        println!(
            "   └─ Error: {}",
            report.source.error.as_deref().unwrap_or("none")
        );
    }

    println!("\n📤 Sinks ({})", report.sinks.len());
    for (i, sink) in report.sinks.iter().enumerate() {
        let is_last = i == report.sinks.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let status = if sink.started { "" } else { " [failed to start]" };

        println!("   {} {}{}", prefix, sink.name, status);
        println!(
            "   {}  ├─ written: {}, failed: {}, dropped: {}",
            child_prefix,
            sink.metrics.write_count,
            sink.metrics.failure_count,
            sink.metrics.dropped_count
        );
        for (key, value) in &sink.extra {
            println!("   {}  ├─ {}: {}", child_prefix, key, value);
        }
        println!("   {}  └─ send latency (µs): {}", child_prefix, sink.send_latency_us);
    }

    println!();
}
