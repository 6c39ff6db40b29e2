//! RemoteSink - bundle upload over HTTP
//!
//! Each bundle is an independent unit of work: encoded once, then posted with
//! retry and exponential backoff. A semaphore bounds the number of bundles in
//! flight; acquiring it blocks the input, which is the branch's backpressure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{BundleItem, SampleItem, StreamItem};
use observability::{RunningStats, StatsSummary};

use crate::bundler::{Bundler, BundlerConfig, BundlerStats};
use crate::error::{DispatcherError, TransportError};
use crate::metrics::{MetricsSnapshot, SinkReport};

/// Delivers one encoded bundle
#[trait_variant::make(BundleTransport: Send)]
pub trait LocalBundleTransport {
    /// One delivery attempt
    async fn post(&self, payload: Bytes) -> Result<(), TransportError>;
}

/// POSTs bundles as `application/octet-stream`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// # Errors
    /// The HTTP client could not be built
    pub fn new(url: impl Into<String>) -> Result<Self, DispatcherError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DispatcherError::sink_creation("remote", e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BundleTransport for HttpTransport {
    async fn post(&self, payload: Bytes) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Retry schedule for one bundle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub attempts: u32,
    pub backoff_factor: Duration,
    /// Per-attempt limit, independent of the backoff
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (0-based): `factor * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of delivering one bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Delivery {
    delivered: bool,
    attempts: u32,
    samples: usize,
}

/// Post with retries; never fails, the outcome says whether it was delivered
async fn send_with_retry<T: BundleTransport>(
    transport: &T,
    payload: Bytes,
    policy: RetryPolicy,
) -> (bool, u32) {
    let attempts = policy.attempts.max(1);
    for attempt in 0..attempts {
        let result = match timeout(policy.request_timeout, transport.post(payload.clone())).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        observability::record_remote_attempt(result.is_ok());

        match result {
            Ok(()) => return (true, attempt + 1),
            Err(e) => {
                warn!(attempt = attempt + 1, of = attempts, error = %e, "Bundle upload failed");
                if attempt + 1 < attempts {
                    sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }
    (false, attempts)
}

/// Remote sink settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteSinkConfig {
    pub max_concurrent_sends: usize,
    pub retry: RetryPolicy,
}

/// Counters returned when the sink exits
#[derive(Debug, Clone, Default)]
pub struct RemoteStats {
    pub bundles_received: u64,
    pub bundles_sent: u64,
    pub bundles_dropped: u64,
    pub samples_sent: u64,
    pub samples_dropped: u64,
    pub attempts: u64,
    /// Time from first attempt to outcome, per bundle (µs)
    pub delivery_latency_us: StatsSummary,
}

/// Consumes bundles and uploads them concurrently
pub struct RemoteSink<T> {
    name: String,
    transport: Arc<T>,
    config: RemoteSinkConfig,
    cancel: CancellationToken,
}

impl<T: BundleTransport + Sync + 'static> RemoteSink<T> {
    /// # Errors
    /// Zero concurrency or zero attempts
    pub fn new(
        name: impl Into<String>,
        transport: T,
        config: RemoteSinkConfig,
    ) -> Result<Self, DispatcherError> {
        if config.max_concurrent_sends == 0 {
            return Err(DispatcherError::invalid_config(
                "remote sink",
                "max_concurrent_sends must be > 0",
            ));
        }
        if config.retry.attempts == 0 {
            return Err(DispatcherError::invalid_config(
                "remote sink",
                "retry_attempts must be >= 1",
            ));
        }
        Ok(Self {
            name: name.into(),
            transport: Arc::new(transport),
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop accepting bundles when `cancel` fires; in-flight sends still finish
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Consume until `EndOfStream`, a closed input or cancellation
    #[instrument(
        name = "remote_sink_run",
        skip(self, input),
        fields(sink = %self.name, max_concurrent = self.config.max_concurrent_sends)
    )]
    pub async fn run(self, mut input: mpsc::Receiver<BundleItem>) -> RemoteStats {
        info!(sink = %self.name, "Remote sink started");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sends));
        let mut inflight: JoinSet<(Delivery, Duration)> = JoinSet::new();
        let mut tally = Tally::default();

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = input.recv() => item,
            };
            let bundle = match item {
                Some(StreamItem::Data(bundle)) => bundle,
                Some(StreamItem::EndOfStream) | None => break,
            };
            tally.stats.bundles_received += 1;

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tally.drop_unsent(bundle.len());
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let samples = bundle.len();
            let payload = Bytes::from(bundle.encode());
            let transport = Arc::clone(&self.transport);
            let policy = self.config.retry;
            inflight.spawn(async move {
                let _permit = permit;
                let begin = Instant::now();
                let (delivered, attempts) = send_with_retry(transport.as_ref(), payload, policy).await;
                let delivery = Delivery {
                    delivered,
                    attempts,
                    samples,
                };
                (delivery, begin.elapsed())
            });

            while let Some(joined) = inflight.try_join_next() {
                tally.account(&self.name, joined);
            }
        }

        debug!(sink = %self.name, inflight = inflight.len(), "Waiting for in-flight uploads");
        while let Some(joined) = inflight.join_next().await {
            tally.account(&self.name, joined);
        }

        let stats = tally.finish();
        info!(
            sink = %self.name,
            sent = stats.bundles_sent,
            dropped = stats.bundles_dropped,
            attempts = stats.attempts,
            "Remote sink stopped"
        );
        stats
    }

    pub fn spawn(self, input: mpsc::Receiver<BundleItem>) -> JoinHandle<RemoteStats> {
        tokio::spawn(self.run(input))
    }
}

#[derive(Default)]
struct Tally {
    stats: RemoteStats,
    latency: RunningStats,
}

impl Tally {
    fn account(
        &mut self,
        name: &str,
        joined: Result<(Delivery, Duration), tokio::task::JoinError>,
    ) {
        let (delivery, elapsed) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!(sink = %name, error = %e, "Upload task failed");
                self.stats.bundles_dropped += 1;
                return;
            }
        };

        self.stats.attempts += u64::from(delivery.attempts);
        self.latency.push(elapsed.as_secs_f64() * 1_000_000.0);
        observability::record_bundle_outcome(delivery.delivered);
        if delivery.delivered {
            self.stats.bundles_sent += 1;
            self.stats.samples_sent += delivery.samples as u64;
        } else {
            self.stats.bundles_dropped += 1;
            self.stats.samples_dropped += delivery.samples as u64;
            error!(
                sink = %name,
                attempts = delivery.attempts,
                samples = delivery.samples,
                "Bundle dropped after retries"
            );
        }
    }

    fn drop_unsent(&mut self, samples: usize) {
        self.stats.bundles_dropped += 1;
        self.stats.samples_dropped += samples as u64;
    }

    fn finish(self) -> RemoteStats {
        RemoteStats {
            delivery_latency_us: StatsSummary::from(&self.latency),
            ..self.stats
        }
    }
}

/// Bundler feeding a RemoteSink, driven like a single sink
pub struct RemoteBranch {
    name: String,
    tx: mpsc::Sender<SampleItem>,
    bundler: JoinHandle<BundlerStats>,
    sink: JoinHandle<RemoteStats>,
}

impl RemoteBranch {
    pub fn spawn<T: BundleTransport + Sync + 'static>(
        name: impl Into<String>,
        bundler_config: BundlerConfig,
        sink: RemoteSink<T>,
        queue_capacity: usize,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (bundle_tx, bundle_rx) = mpsc::channel(sink.config.max_concurrent_sends);

        let bundler = Bundler::new(bundler_config, rx, bundle_tx).spawn();
        let sink = sink.spawn(bundle_rx);
        info!(
            branch = %name,
            bundle_size = bundler_config.bundle_size(),
            max_interval_ms = bundler_config.max_interval().as_millis() as u64,
            "Remote branch started"
        );

        Self {
            name,
            tx,
            bundler,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sender(&self) -> mpsc::Sender<SampleItem> {
        self.tx.clone()
    }

    /// Wait for the bundler to see `EndOfStream` and for every upload to finish
    #[instrument(name = "remote_branch_shutdown", skip(self), fields(branch = %self.name))]
    pub async fn shutdown(self) -> SinkReport {
        drop(self.tx);

        let bundler = self.bundler.await.unwrap_or_else(|e| {
            error!(branch = %self.name, error = %e, "Bundler task failed");
            BundlerStats::default()
        });
        let remote = self.sink.await.unwrap_or_else(|e| {
            error!(branch = %self.name, error = %e, "Remote sink task failed");
            RemoteStats::default()
        });

        let dropped = bundler.discarded + remote.samples_dropped;
        if dropped > 0 {
            observability::record_sink_drop(&self.name, dropped);
        }

        SinkReport {
            name: self.name,
            metrics: MetricsSnapshot {
                queue_len: 0,
                write_count: remote.samples_sent,
                failure_count: remote.bundles_dropped,
                dropped_count: dropped,
            },
            send_latency_us: remote.delivery_latency_us,
            started: true,
            extra: vec![
                ("samples_bundled", bundler.samples),
                ("bundles", bundler.bundles),
                ("bundles_timed_out", bundler.timed_out),
                ("bundles_sent", remote.bundles_sent),
                ("bundles_dropped", remote.bundles_dropped),
                ("attempts", remote.attempts),
            ],
        }
    }
}

/// Build the HTTP-backed branch
///
/// # Errors
/// Invalid bundling or sink parameters
pub fn http_branch(
    name: impl Into<String>,
    url: &str,
    bundler_config: BundlerConfig,
    config: RemoteSinkConfig,
    queue_capacity: usize,
) -> Result<RemoteBranch, DispatcherError> {
    let name = name.into();
    let transport = HttpTransport::new(url)?;
    let sink = RemoteSink::new(name.clone(), transport, config)?;
    Ok(RemoteBranch::spawn(name, bundler_config, sink, queue_capacity))
}
