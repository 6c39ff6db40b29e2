//! Bundler - size/time windowed batching in front of the remote sink
//!
//! A bundle closes when it holds `bundle_size` samples or when
//! `max_interval` has elapsed since its first sample, whichever comes first.
//! Empty bundles are never emitted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use contracts::{Bundle, BundleItem, Sample, SampleItem, StreamItem};
use observability::{RunningStats, StatsSummary};

use crate::error::DispatcherError;

/// Validated bundling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundlerConfig {
    bundle_size: usize,
    max_interval: Duration,
}

impl BundlerConfig {
    /// # Errors
    /// `bundle_size` of zero or a zero `max_interval`
    pub fn new(bundle_size: usize, max_interval: Duration) -> Result<Self, DispatcherError> {
        if bundle_size == 0 {
            return Err(DispatcherError::invalid_config(
                "bundler",
                "bundle_size must be > 0",
            ));
        }
        if max_interval.is_zero() {
            return Err(DispatcherError::invalid_config(
                "bundler",
                "max_interval must be > 0",
            ));
        }
        Ok(Self {
            bundle_size,
            max_interval,
        })
    }

    pub fn bundle_size(&self) -> usize {
        self.bundle_size
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

/// Counters returned when the bundler exits
#[derive(Debug, Clone, Default)]
pub struct BundlerStats {
    pub samples: u64,
    pub bundles: u64,
    /// Bundles closed by the deadline rather than by size
    pub timed_out: u64,
    /// Samples discarded because the downstream sink was gone
    pub discarded: u64,
    pub bundle_size: StatsSummary,
}

/// Rebatches a sample stream into bundles
pub struct Bundler {
    config: BundlerConfig,
    input: mpsc::Receiver<SampleItem>,
    output: mpsc::Sender<BundleItem>,
}

impl Bundler {
    pub fn new(
        config: BundlerConfig,
        input: mpsc::Receiver<SampleItem>,
        output: mpsc::Sender<BundleItem>,
    ) -> Self {
        Self {
            config,
            input,
            output,
        }
    }

    /// Run until `EndOfStream` (or a closed input), then terminate downstream
    #[instrument(
        name = "bundler_run",
        skip(self),
        fields(bundle_size = self.config.bundle_size, max_interval_ms = self.config.max_interval.as_millis() as u64)
    )]
    pub async fn run(mut self) -> BundlerStats {
        info!("Bundler started");
        let mut state = BundleState::new(self.config.bundle_size);
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                // Nothing pending: wait as long as it takes
                None => self.input.recv().await,
                Some(at) => match timeout_at(at, self.input.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        state.stats.timed_out += 1;
                        self.emit(&mut state).await;
                        deadline = None;
                        continue;
                    }
                },
            };

            match next {
                Some(StreamItem::Data(sample)) => {
                    state.stats.samples += 1;
                    if state.current.is_empty() {
                        deadline = Some(Instant::now() + self.config.max_interval);
                    }
                    state.current.push(sample);
                    if state.current.len() >= self.config.bundle_size {
                        self.emit(&mut state).await;
                        deadline = None;
                    }
                }
                Some(StreamItem::EndOfStream) | None => {
                    self.emit(&mut state).await;
                    if self.output.send(StreamItem::EndOfStream).await.is_err() {
                        debug!("Downstream gone before end of stream");
                    }
                    break;
                }
            }
        }

        let stats = state.finish();
        info!(
            samples = stats.samples,
            bundles = stats.bundles,
            timed_out = stats.timed_out,
            discarded = stats.discarded,
            bundle_size = %stats.bundle_size,
            "Bundler stopped"
        );
        stats
    }

    /// Spawn as a background task
    pub fn spawn(self) -> JoinHandle<BundlerStats> {
        tokio::spawn(self.run())
    }

    async fn emit(&mut self, state: &mut BundleState) {
        let samples = std::mem::take(&mut state.current);
        let count = samples.len();
        let Some(bundle) = Bundle::new(samples) else {
            return;
        };
        state.current.reserve(self.config.bundle_size);

        if state.downstream_closed {
            state.stats.discarded += count as u64;
            return;
        }

        match self.output.send(StreamItem::Data(bundle)).await {
            Ok(()) => {
                state.stats.bundles += 1;
                state.sizes.push(count as f64);
                observability::record_bundle_emitted(count);
            }
            Err(_) => {
                warn!("Remote sink gone, discarding bundles from now on");
                state.downstream_closed = true;
                state.stats.discarded += count as u64;
            }
        }
    }
}

struct BundleState {
    current: Vec<Arc<Sample>>,
    stats: BundlerStats,
    sizes: RunningStats,
    downstream_closed: bool,
}

impl BundleState {
    fn new(bundle_size: usize) -> Self {
        Self {
            current: Vec::with_capacity(bundle_size),
            stats: BundlerStats::default(),
            sizes: RunningStats::default(),
            downstream_closed: false,
        }
    }

    fn finish(self) -> BundlerStats {
        BundlerStats {
            bundle_size: StatsSummary::from(&self.sizes),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep_until;

    fn sample(ts: i64) -> SampleItem {
        StreamItem::Data(Arc::new(Sample::new(0, ts, ts)))
    }

    fn timestamps(bundle: &Bundle) -> Vec<i64> {
        bundle.samples().iter().map(|s| s.device_timestamp_us).collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(BundlerConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(BundlerConfig::new(3, Duration::ZERO).is_err());
        assert!(BundlerConfig::new(3, Duration::from_millis(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_closes_first_bundle_deadline_closes_second() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let config = BundlerConfig::new(3, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        let task = Bundler::new(config, in_rx, out_tx).spawn();

        tokio::spawn(async move {
            for (ts, at_ms) in [(0, 0), (1, 100), (2, 200), (3, 1500)] {
                sleep_until(start + Duration::from_millis(at_ms)).await;
                in_tx.send(sample(ts)).await.unwrap();
            }
            sleep_until(start + Duration::from_secs(5)).await;
            in_tx.send(StreamItem::EndOfStream).await.unwrap();
        });

        let first = out_rx.recv().await.unwrap().into_data().unwrap();
        assert_eq!(timestamps(&first), vec![0, 1, 2]);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");

        let second = out_rx.recv().await.unwrap().into_data().unwrap();
        assert_eq!(timestamps(&second), vec![3]);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2600), "{elapsed:?}");

        assert!(out_rx.recv().await.unwrap().is_end());
        assert!(out_rx.recv().await.is_none());

        let stats = task.await.unwrap();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.bundles, 2);
        assert_eq!(stats.timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_input_emits_nothing() {
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let config = BundlerConfig::new(3, Duration::from_millis(100)).unwrap();
        let task = Bundler::new(config, in_rx, out_tx).spawn();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(out_rx.try_recv().is_err());

        in_tx.send(StreamItem::EndOfStream).await.unwrap();
        assert!(out_rx.recv().await.unwrap().is_end());
        assert_eq!(task.await.unwrap().bundles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_flushes_partial_bundle() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let config = BundlerConfig::new(60, Duration::from_secs(1)).unwrap();
        let task = Bundler::new(config, in_rx, out_tx).spawn();

        for ts in 0..5 {
            in_tx.send(sample(ts)).await.unwrap();
        }
        in_tx.send(StreamItem::EndOfStream).await.unwrap();

        let bundle = out_rx.recv().await.unwrap().into_data().unwrap();
        assert_eq!(timestamps(&bundle), vec![0, 1, 2, 3, 4]);
        assert!(out_rx.recv().await.unwrap().is_end());
        assert_eq!(task.await.unwrap().timed_out, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_empty_bundles_across_many_windows() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let config = BundlerConfig::new(4, Duration::from_millis(50)).unwrap();
        let task = Bundler::new(config, in_rx, out_tx).spawn();

        for ts in 0..10 {
            in_tx.send(sample(ts)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(70)).await;
        }
        in_tx.send(StreamItem::EndOfStream).await.unwrap();

        let mut seen = Vec::new();
        while let Some(item) = out_rx.recv().await {
            match item {
                StreamItem::Data(bundle) => {
                    assert!(!bundle.is_empty());
                    seen.extend(timestamps(&bundle));
                }
                StreamItem::EndOfStream => break,
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        task.await.unwrap();
    }
}
