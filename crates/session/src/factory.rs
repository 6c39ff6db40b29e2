//! Session factory - fresh source and branches per recording
//!
//! Everything that can be rejected at construction (buffer sizes, bundling,
//! retry settings) is built first; workers are only spawned once the whole
//! set is known to be valid.

use std::path::Path;

use acquisition::{SampleSource, SimulatedSource};
use contracts::{SessionBlueprint, SourceConfig};
use dispatcher::sinks::{
    BroadcastSink, BroadcastSinkConfig, ColumnarFileSink, ColumnarSinkConfig, FileSink,
    FileSinkConfig, HttpTransport, RemoteBranch, RemoteSink, RemoteSinkConfig, RetryPolicy,
};
use dispatcher::{Branch, BundlerConfig, SinkHandle};
use tracing::info;

use crate::error::SessionError;

/// Creates the source for each new session
pub trait SourceFactory: Send + Sync {
    type Source: SampleSource + 'static;

    fn create(&self, config: &SourceConfig) -> Self::Source;
}

/// Simulated circular gaze path
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSourceFactory {
    max_samples: Option<u64>,
}

impl SimulatedSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop each source on its own after `count` samples
    pub fn with_max_samples(mut self, count: u64) -> Self {
        self.max_samples = Some(count);
        self
    }
}

impl SourceFactory for SimulatedSourceFactory {
    type Source = SimulatedSource;

    fn create(&self, config: &SourceConfig) -> SimulatedSource {
        let source = SimulatedSource::new(config);
        match self.max_samples {
            Some(count) => source.with_max_samples(count),
            None => source,
        }
    }
}

/// Constructed but not yet running output
enum PlannedBranch {
    Csv(FileSink),
    Parquet(ColumnarFileSink),
    Broadcast(BroadcastSink),
    Remote(BundlerConfig, RemoteSink<HttpTransport>),
}

/// Build and spawn every enabled branch, in `enabled_sinks` order
///
/// # Errors
/// No sink enabled, or a sink rejected its parameters
pub fn build_branches(
    blueprint: &SessionBlueprint,
    output_dir: &Path,
) -> Result<Vec<Branch>, SessionError> {
    let planned = plan(blueprint, output_dir)?;
    let capacity = blueprint.pipeline.branch_queue_capacity;

    let branches: Vec<Branch> = planned
        .into_iter()
        .map(|planned| match planned {
            PlannedBranch::Csv(sink) => SinkHandle::spawn(sink, capacity).into(),
            PlannedBranch::Parquet(sink) => SinkHandle::spawn(sink, capacity).into(),
            PlannedBranch::Broadcast(sink) => SinkHandle::spawn(sink, capacity).into(),
            PlannedBranch::Remote(bundler, sink) => {
                RemoteBranch::spawn("remote", bundler, sink, capacity).into()
            }
        })
        .collect();

    info!(
        branches = ?branches.iter().map(Branch::name).collect::<Vec<_>>(),
        output_dir = %output_dir.display(),
        "Session branches created"
    );
    Ok(branches)
}

fn plan(blueprint: &SessionBlueprint, output_dir: &Path) -> Result<Vec<PlannedBranch>, SessionError> {
    let sinks = &blueprint.sinks;
    let mut planned = Vec::new();

    if sinks.csv.enabled {
        let config = FileSinkConfig::new(output_dir, sinks.csv.file_prefix.clone());
        planned.push(PlannedBranch::Csv(FileSink::new("csv", config)));
    }

    if sinks.parquet.enabled {
        let config = ColumnarSinkConfig {
            directory: output_dir.to_path_buf(),
            file_prefix: sinks.parquet.file_prefix.clone(),
            queue_size: sinks.parquet.queue_size,
            max_buffer_size: sinks.parquet.max_buffer_size,
            drop_when_full: sinks.parquet.drop_when_full,
        };
        planned.push(PlannedBranch::Parquet(ColumnarFileSink::new("parquet", config)?));
    }

    if sinks.broadcast.enabled {
        let config = BroadcastSinkConfig {
            endpoint: sinks.broadcast.endpoint.clone(),
            high_water_mark: sinks.broadcast.high_water_mark,
        };
        planned.push(PlannedBranch::Broadcast(BroadcastSink::new("broadcast", config)));
    }

    if sinks.remote.enabled {
        let remote = &sinks.remote;
        let bundler = BundlerConfig::new(remote.bundle_size, remote.max_bundle_interval()?)?;
        let config = RemoteSinkConfig {
            max_concurrent_sends: remote.max_concurrent_sends,
            retry: RetryPolicy {
                attempts: remote.retry_attempts,
                backoff_factor: remote.backoff_factor()?,
                request_timeout: remote.request_timeout()?,
            },
        };
        let transport = HttpTransport::new(remote.server_url.clone())?;
        let sink = RemoteSink::new("remote", transport, config)?;
        planned.push(PlannedBranch::Remote(bundler, sink));
    }

    if planned.is_empty() {
        return Err(SessionError::NoSinks);
    }
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_branches_follow_enabled_order() {
        let dir = tempdir().unwrap();
        let mut blueprint = SessionBlueprint::default();
        blueprint.sinks.csv.enabled = true;
        blueprint.sinks.broadcast.endpoint = "tcp://127.0.0.1:0".into();
        blueprint.sinks.remote.enabled = true;

        let branches = build_branches(&blueprint, dir.path()).unwrap();
        let names: Vec<_> = branches.iter().map(Branch::name).collect();
        assert_eq!(names, blueprint.enabled_sinks());

        for branch in branches {
            branch.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_nothing_enabled_is_rejected() {
        let dir = tempdir().unwrap();
        let mut blueprint = SessionBlueprint::default();
        blueprint.sinks.parquet.enabled = false;
        blueprint.sinks.broadcast.enabled = false;

        let Err(err) = build_branches(&blueprint, dir.path()) else {
            panic!("expected an error with every sink disabled");
        };
        assert!(matches!(err, SessionError::NoSinks));
    }

    #[tokio::test]
    async fn test_invalid_parquet_sizes_fail_before_anything_starts() {
        let dir = tempdir().unwrap();
        let mut blueprint = SessionBlueprint::default();
        blueprint.sinks.csv.enabled = true;
        blueprint.sinks.parquet.queue_size = blueprint.sinks.parquet.max_buffer_size;

        let Err(err) = build_branches(&blueprint, dir.path()) else {
            panic!("expected invalid parquet sizes to be rejected");
        };
        assert!(matches!(err, SessionError::Dispatcher(_)));
        // the CSV sink was never started
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_simulated_factory_applies_limit() {
        let factory = SimulatedSourceFactory::new().with_max_samples(10);
        let source = factory.create(&SourceConfig::default());
        assert_eq!(source.name(), "simulated");
    }
}
