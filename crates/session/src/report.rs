//! Session report - what one recording produced

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatcher::SinkReport;

/// Source side of the report
#[derive(Debug, Clone, Default)]
pub struct SourceSummary {
    pub name: String,
    pub produced: u64,
    /// Callback samples rejected by a full source queue
    pub dropped: u64,
    pub error: Option<String>,
}

/// Final account of one session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub source: SourceSummary,
    /// Samples the distributor fanned out
    pub distributed: u64,
    /// Per branch, in start order
    pub sinks: Vec<SinkReport>,
}

impl SessionReport {
    pub fn sink(&self, name: &str) -> Option<&SinkReport> {
        self.sinks.iter().find(|sink| sink.name == name)
    }

    /// Branches that never opened their destination
    pub fn failed_sinks(&self) -> Vec<&str> {
        self.sinks
            .iter()
            .filter(|sink| !sink.started)
            .map(|sink| sink.name.as_str())
            .collect()
    }

    pub fn total_dropped(&self) -> u64 {
        self.source.dropped + self.sinks.iter().map(|s| s.metrics.dropped_count).sum::<u64>()
    }

    /// Source throughput over the session
    pub fn samples_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.source.produced as f64 / secs
        } else {
            0.0
        }
    }

    /// No source error, nothing dropped, every sink started
    pub fn is_clean(&self) -> bool {
        self.source.error.is_none() && self.total_dropped() == 0 && self.failed_sinks().is_empty()
    }
}
