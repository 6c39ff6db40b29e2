//! SinkHandle - manages a sink with isolated queue and worker task
//!
//! The worker never stops consuming before `EndOfStream`: after a failed
//! start or write the sink is disabled and further samples are counted as
//! dropped, so the distributor is never held up by a dead sink.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use contracts::{ContractError, SampleItem, SampleSink, StreamItem};
use observability::{RunningStats, StatsSummary};

use crate::metrics::{SinkMetrics, SinkReport};

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send samples to worker
    tx: mpsc::Sender<SampleItem>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Start result, consumed by `wait_started`
    started_rx: Option<oneshot::Receiver<Result<(), ContractError>>>,
    started: Option<bool>,
    /// Worker task handle
    worker_handle: JoinHandle<WorkerOutcome>,
}

struct WorkerOutcome {
    started: bool,
    send_latency_us: StatsSummary,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// The worker starts the sink immediately.
    pub fn spawn<S: SampleSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (started_tx, started_rx) = oneshot::channel();
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name, started_tx).await
        });

        Self {
            name,
            tx,
            metrics,
            started_rx: Some(started_rx),
            started: None,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue feeding the worker (registered with the distributor)
    pub fn sender(&self) -> mpsc::Sender<SampleItem> {
        self.tx.clone()
    }

    /// Await the outcome of `start`
    ///
    /// # Errors
    /// The sink's open error; the worker keeps draining regardless
    pub async fn wait_started(&mut self) -> Result<(), ContractError> {
        let Some(rx) = self.started_rx.take() else {
            return match self.started {
                Some(false) => Err(ContractError::sink_open(&self.name, "start failed")),
                _ => Ok(()),
            };
        };

        let result = rx.await.unwrap_or_else(|_| {
            Err(ContractError::sink_open(&self.name, "worker exited before start"))
        });
        self.started = Some(result.is_ok());
        result
    }

    /// Wait for the worker to consume `EndOfStream` and close the sink
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> SinkReport {
        // Drop sender so the worker also exits if no end marker ever comes
        drop(self.tx);

        let outcome = match self.worker_handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                WorkerOutcome {
                    started: self.started.unwrap_or(false),
                    send_latency_us: StatsSummary::default(),
                }
            }
        };
        debug!(sink = %self.name, "SinkHandle shutdown complete");

        SinkReport {
            name: self.name,
            metrics: self.metrics.snapshot(),
            send_latency_us: outcome.send_latency_us,
            started: outcome.started,
            extra: Vec::new(),
        }
    }
}

/// Worker task that starts, feeds and closes one sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics, started_tx),
    fields(sink = %name)
)]
async fn sink_worker<S: SampleSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SampleItem>,
    metrics: Arc<SinkMetrics>,
    name: String,
    started_tx: oneshot::Sender<Result<(), ContractError>>,
) -> WorkerOutcome {
    let start = sink.start().await;
    let started = start.is_ok();
    match &start {
        Ok(()) => info!(sink = %name, "Sink started"),
        Err(e) => {
            metrics.inc_failure_count();
            error!(sink = %name, error = %e, "Sink failed to start, discarding its input");
        }
    }
    // Receiver may be gone if nobody waits for the start result
    let _ = started_tx.send(start);

    let mut healthy = started;
    let mut latency = RunningStats::default();

    while let Some(item) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        let sample = match item {
            StreamItem::Data(sample) => sample,
            StreamItem::EndOfStream => break,
        };

        if !healthy {
            metrics.inc_dropped_count();
            continue;
        }

        let begin = Instant::now();
        match sink.send(sample).await {
            Ok(()) => {
                metrics.inc_write_count();
                latency.push(begin.elapsed().as_secs_f64() * 1_000_000.0);
                observability::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_sink_write(&name, false);
                error!(sink = %name, error = %e, "Write failed, sink disabled");
                healthy = false;
            }
        }
    }

    // Cleanup: close exactly once, only if the destination was opened
    if started {
        if let Err(e) = sink.close().await {
            error!(sink = %name, error = %e, "Close failed on shutdown");
        }
    }

    let internal_drops = sink.dropped_count();
    metrics.add_dropped(internal_drops);
    let snapshot = metrics.snapshot();
    if snapshot.dropped_count > 0 {
        observability::record_sink_drop(&name, snapshot.dropped_count);
    }

    info!(
        sink = %name,
        written = snapshot.write_count,
        failed = snapshot.failure_count,
        dropped = snapshot.dropped_count,
        "Sink worker stopped"
    );

    WorkerOutcome {
        started,
        send_latency_us: StatsSummary::from(&latency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Sample;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    #[derive(Default)]
    struct MockSink {
        name: String,
        written: Arc<std::sync::Mutex<Vec<i64>>>,
        closes: Arc<AtomicU64>,
        fail_start: bool,
        fail_after: Option<usize>,
        delay_ms: u64,
    }

    impl SampleSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self) -> Result<(), ContractError> {
            if self.fail_start {
                return Err(ContractError::sink_open(&self.name, "mock open failure"));
            }
            Ok(())
        }

        async fn send(&mut self, sample: Arc<Sample>) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let mut written = self.written.lock().unwrap();
            if self.fail_after.is_some_and(|n| written.len() >= n) {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            written.push(sample.device_timestamp_us);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.closes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn data(ts: i64) -> SampleItem {
        StreamItem::Data(Arc::new(Sample::new(0, ts, ts)))
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let sink = MockSink {
            name: "test".to_string(),
            ..Default::default()
        };
        let written = Arc::clone(&sink.written);
        let closes = Arc::clone(&sink.closes);

        let mut handle = SinkHandle::spawn(sink, 10);
        handle.wait_started().await.unwrap();

        let tx = handle.sender();
        for i in 0..5 {
            tx.send(data(i)).await.unwrap();
        }
        tx.send(StreamItem::EndOfStream).await.unwrap();

        let report = handle.shutdown().await;
        assert!(report.started);
        assert_eq!(report.metrics.write_count, 5);
        assert_eq!(report.send_latency_us.count, 5);
        assert_eq!(*written.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(closes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failed_start_drains_and_never_closes() {
        let sink = MockSink {
            name: "broken".to_string(),
            fail_start: true,
            ..Default::default()
        };
        let closes = Arc::clone(&sink.closes);

        let mut handle = SinkHandle::spawn(sink, 2);
        assert!(handle.wait_started().await.is_err());
        // second call reports the cached outcome
        assert!(handle.wait_started().await.is_err());

        let tx = handle.sender();
        for i in 0..10 {
            tx.send(data(i)).await.unwrap();
        }
        tx.send(StreamItem::EndOfStream).await.unwrap();

        let report = handle.shutdown().await;
        assert!(!report.started);
        assert_eq!(report.metrics.dropped_count, 10);
        assert_eq!(report.metrics.write_count, 0);
        assert_eq!(closes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let sink = MockSink {
            name: "failing".to_string(),
            fail_after: Some(2),
            ..Default::default()
        };
        let closes = Arc::clone(&sink.closes);

        let handle = SinkHandle::spawn(sink, 10);
        let tx = handle.sender();
        for i in 0..6 {
            tx.send(data(i)).await.unwrap();
        }
        tx.send(StreamItem::EndOfStream).await.unwrap();

        let report = handle.shutdown().await;
        assert_eq!(report.metrics.write_count, 2);
        assert_eq!(report.metrics.failure_count, 1);
        // the failing sample is not counted as dropped, the rest are
        assert_eq!(report.metrics.dropped_count, 3);
        assert_eq!(closes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_applies_backpressure() {
        let sink = MockSink {
            name: "slow".to_string(),
            delay_ms: 100,
            ..Default::default()
        };
        let handle = SinkHandle::spawn(sink, 2);
        let tx = handle.sender();

        // Queue of 2 accepts two items before the worker frees room
        for i in 0..2 {
            tx.try_send(data(i)).unwrap();
        }
        assert!(tx.try_send(data(2)).is_err());

        tx.send(data(2)).await.unwrap();
        tx.send(StreamItem::EndOfStream).await.unwrap();

        let report = handle.shutdown().await;
        assert_eq!(report.metrics.write_count, 3);
        assert_eq!(report.metrics.dropped_count, 0);
    }
}
