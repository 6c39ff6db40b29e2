//! Runner - lifecycle of one recording session
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! Start order: branches (sinks open concurrently), source, distributor.
//! Stop order: source stop + join (it ends the stream), distributor drains
//! and forwards `EndOfStream`, then every branch closes concurrently.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use acquisition::{source_channel, SourceHandle};
use contracts::SessionBlueprint;
use dispatcher::{Branch, Distributor, DistributorStats};

use crate::error::SessionError;
use crate::factory::{build_branches, SimulatedSourceFactory, SourceFactory};
use crate::report::{SessionReport, SourceSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tasks of a running session
struct ActiveSession {
    source: SourceHandle,
    distributor: JoinHandle<DistributorStats>,
    branches: Vec<Branch>,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Owns source, distributor and branches for one session at a time
pub struct Runner<F = SimulatedSourceFactory> {
    blueprint: SessionBlueprint,
    output_dir: PathBuf,
    factory: F,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl<F: SourceFactory> Runner<F> {
    pub fn new(blueprint: SessionBlueprint, output_dir: impl Into<PathBuf>, factory: F) -> Self {
        Self {
            blueprint,
            output_dir: output_dir.into(),
            factory,
            state: SessionState::Stopped,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the source has ended its stream on its own (or was never started)
    pub fn source_finished(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |active| active.source.is_finished())
    }

    /// Start every enabled sink, then the source, then the distributor
    ///
    /// A no-op (with a warning) unless stopped.
    ///
    /// # Errors
    /// Invalid sink parameters, or no sink could open its destination.
    /// The runner is back in `Stopped` afterwards.
    #[instrument(name = "session_start", skip(self), fields(output_dir = %self.output_dir.display()))]
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Stopped {
            warn!(state = %self.state, "Session already active, start ignored");
            return Ok(());
        }
        self.state = SessionState::Starting;

        match self.launch().await {
            Ok(active) => {
                self.active = Some(active);
                self.state = SessionState::Running;
                info!("Session running");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Stopped;
                error!(error = %e, "Session failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<ActiveSession, SessionError> {
        let mut branches = build_branches(&self.blueprint, &self.output_dir)?;

        // Workers open their sinks in parallel; collect the outcomes
        let mut failures = Vec::new();
        for branch in branches.iter_mut() {
            if let Err(e) = branch.wait_started().await {
                warn!(sink = %branch.name(), error = %e, "Sink unavailable for this session");
                failures.push(e.to_string());
            }
        }

        if failures.len() == branches.len() {
            for branch in branches {
                branch.shutdown().await;
            }
            return Err(SessionError::AllSinksFailed { failures });
        }

        let (tx, rx) = source_channel("source", self.blueprint.pipeline.source_queue_capacity);
        let source = SourceHandle::spawn(self.factory.create(&self.blueprint.source), tx);

        let mut distributor = Distributor::new(rx, CancellationToken::new());
        for branch in &branches {
            distributor.add_output(branch.name(), branch.sender());
        }
        let distributor = distributor.spawn();

        Ok(ActiveSession {
            source,
            distributor,
            branches,
            started_at: Utc::now(),
            started: Instant::now(),
        })
    }

    /// Drain and close everything; returns the report of the finished session
    ///
    /// A no-op returning `None` when nothing is running.
    #[instrument(name = "session_stop", skip(self), fields(output_dir = %self.output_dir.display()))]
    pub async fn stop(&mut self) -> Result<Option<SessionReport>, SessionError> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };
        self.state = SessionState::Stopping;

        active.source.stop();
        let source = active.source.join().await;
        if let Some(e) = &source.error {
            warn!(source = %source.name, error = %e, "Source ended with an error");
        }

        let distributed = match active.distributor.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Distributor task failed");
                DistributorStats::default()
            }
        };

        let mut closing = JoinSet::new();
        for (index, branch) in active.branches.into_iter().enumerate() {
            closing.spawn(async move { (index, branch.shutdown().await) });
        }
        let mut sinks = Vec::with_capacity(closing.len());
        while let Some(joined) = closing.join_next().await {
            match joined {
                Ok(closed) => sinks.push(closed),
                Err(e) => error!(error = %e, "Branch shutdown task failed"),
            }
        }
        sinks.sort_by_key(|(index, _)| *index);

        let report = SessionReport {
            output_dir: self.output_dir.clone(),
            started_at: active.started_at,
            duration: active.started.elapsed(),
            source: SourceSummary {
                name: source.name,
                produced: source.stats.produced,
                dropped: source.stats.dropped,
                error: source.error.map(|e| e.to_string()),
            },
            distributed: distributed.items,
            sinks: sinks.into_iter().map(|(_, report)| report).collect(),
        };

        self.state = SessionState::Stopped;
        info!(
            produced = report.source.produced,
            distributed = report.distributed,
            dropped = report.total_dropped(),
            duration_secs = report.duration.as_secs_f64(),
            "Session stopped"
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use acquisition::{SampleSender, SampleSource};
    use contracts::{ContractError, Sample, SourceConfig};
    use tempfile::tempdir;

    /// Emits `count` samples as fast as the queue allows
    struct CountingSource {
        count: i64,
    }

    impl SampleSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&mut self, out: SampleSender, stop: CancellationToken) -> Result<(), ContractError> {
            for ts in 0..self.count {
                if stop.is_cancelled() {
                    break;
                }
                out.send(Sample::new(1_700_000_000_000 + ts, ts, ts)).await?;
            }
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    struct CountingFactory {
        count: i64,
    }

    impl SourceFactory for CountingFactory {
        type Source = CountingSource;

        fn create(&self, _config: &SourceConfig) -> CountingSource {
            CountingSource { count: self.count }
        }
    }

    fn file_blueprint() -> SessionBlueprint {
        let mut blueprint = SessionBlueprint::default();
        blueprint.sinks.csv.enabled = true;
        blueprint.sinks.broadcast.enabled = false;
        blueprint.sinks.parquet.max_buffer_size = 16;
        blueprint.sinks.parquet.queue_size = 256;
        blueprint.sinks.parquet.drop_when_full = false;
        blueprint.pipeline.source_queue_capacity = 32;
        blueprint.pipeline.branch_queue_capacity = 8;
        blueprint
    }

    async fn wait_for_source<F: SourceFactory>(runner: &Runner<F>) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !runner.source_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_session_delivers_every_sample() {
        let dir = tempdir().unwrap();
        let mut runner = Runner::new(file_blueprint(), dir.path(), CountingFactory { count: 500 });
        assert_eq!(runner.state(), SessionState::Stopped);

        runner.start().await.unwrap();
        assert!(runner.is_running());
        wait_for_source(&runner).await;

        let report = runner.stop().await.unwrap().unwrap();
        assert_eq!(runner.state(), SessionState::Stopped);
        assert_eq!(report.source.produced, 500);
        assert_eq!(report.distributed, 500);
        for name in ["csv", "parquet"] {
            let sink = report.sink(name).unwrap();
            assert!(sink.started, "{name}");
            assert_eq!(sink.metrics.write_count, 500, "{name}");
            assert_eq!(sink.metrics.dropped_count, 0, "{name}");
        }
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_stop_twice_is_a_noop() {
        let dir = tempdir().unwrap();
        let mut runner = Runner::new(file_blueprint(), dir.path(), CountingFactory { count: 10 });
        runner.start().await.unwrap();

        assert!(runner.stop().await.unwrap().is_some());
        assert!(runner.stop().await.unwrap().is_none());
        assert_eq!(runner.state(), SessionState::Stopped);

        // one CSV and one Parquet file, each closed once
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_start_while_running_is_ignored() {
        let dir = tempdir().unwrap();
        let mut runner = Runner::new(file_blueprint(), dir.path(), CountingFactory { count: 10 });
        runner.start().await.unwrap();
        runner.start().await.unwrap();
        assert!(runner.is_running());

        let report = runner.stop().await.unwrap().unwrap();
        assert_eq!(report.sinks.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_before_source_ends() {
        let dir = tempdir().unwrap();
        let mut blueprint = file_blueprint();
        blueprint.sinks.csv.enabled = false;
        blueprint.source.frequency_hz = 200.0;
        let mut runner = Runner::new(blueprint, dir.path(), SimulatedSourceFactory::new());

        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = runner.stop().await.unwrap().unwrap();

        let parquet = report.sink("parquet").unwrap();
        assert!(report.source.produced > 0);
        assert_eq!(parquet.metrics.write_count, report.source.produced);
    }

    #[tokio::test]
    async fn test_failed_sink_does_not_stop_the_others() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut blueprint = file_blueprint();
        blueprint.sinks.parquet.enabled = false;
        blueprint.sinks.broadcast.enabled = true;
        blueprint.sinks.broadcast.endpoint = "tcp://127.0.0.1:0".into();
        // csv cannot create its directory under a plain file
        let mut runner = Runner::new(blueprint, blocker.join("sub"), CountingFactory { count: 50 });

        runner.start().await.unwrap();
        wait_for_source(&runner).await;
        let report = runner.stop().await.unwrap().unwrap();

        let csv = report.sink("csv").unwrap();
        assert!(!csv.started);
        assert_eq!(csv.metrics.dropped_count, 50);
        let broadcast = report.sink("broadcast").unwrap();
        assert!(broadcast.started);
        assert_eq!(broadcast.metrics.write_count, 50);
        assert_eq!(report.failed_sinks(), vec!["csv"]);
    }

    #[tokio::test]
    async fn test_all_sinks_failing_aborts_start() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut runner = Runner::new(file_blueprint(), blocker.join("sub"), CountingFactory { count: 5 });
        let err = runner.start().await.unwrap_err();
        match err {
            SessionError::AllSinksFailed { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.state(), SessionState::Stopped);
        assert!(runner.stop().await.unwrap().is_none());
    }
}
