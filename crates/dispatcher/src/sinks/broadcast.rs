//! BroadcastSink - real-time ZeroMQ PUB stream
//!
//! Fire-and-forget: samples are packed and queued for a publisher task bound
//! to the configured endpoint. Nothing waits for subscribers; when the outbound
//! queue (high-water mark) is full the message is dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

use contracts::{BroadcastRecord, ContractError, Sample, SampleSink};
use observability::DropLogger;

/// Configuration for BroadcastSink
#[derive(Debug, Clone)]
pub struct BroadcastSinkConfig {
    /// Bind address, e.g. `tcp://0.0.0.0:5555`
    pub endpoint: String,
    /// Outbound queue capacity in messages
    pub high_water_mark: usize,
}

/// Sink publishing one binary record per sample
pub struct BroadcastSink {
    name: String,
    config: BroadcastSinkConfig,
    tx: Option<mpsc::Sender<Bytes>>,
    publisher: Option<JoinHandle<()>>,
    bound_endpoint: Option<String>,
    queued: u64,
    dropped: u64,
    drop_logger: DropLogger,
}

impl BroadcastSink {
    pub fn new(name: impl Into<String>, config: BroadcastSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            tx: None,
            publisher: None,
            bound_endpoint: None,
            queued: 0,
            dropped: 0,
            drop_logger: DropLogger::new(
                "Broadcast queue full, dropping messages",
                Duration::from_secs(1),
            ),
        }
    }

    /// Resolved bind address (port filled in when bound to `:0`)
    pub fn bound_endpoint(&self) -> Option<&str> {
        self.bound_endpoint.as_deref()
    }

    pub fn queued_count(&self) -> u64 {
        self.queued
    }
}

impl SampleSink for BroadcastSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "broadcast_sink_start", skip(self), fields(sink = %self.name))]
    async fn start(&mut self) -> Result<(), ContractError> {
        let mut socket = PubSocket::new();
        let endpoint = socket.bind(&self.config.endpoint).await.map_err(|e| {
            ContractError::sink_open(
                &self.name,
                format!("bind {} failed: {e}", self.config.endpoint),
            )
        })?;

        let (tx, mut rx) = mpsc::channel::<Bytes>(self.config.high_water_mark.max(1));
        let name = self.name.clone();
        self.publisher = Some(tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if let Err(e) = socket.send(ZmqMessage::from(payload)).await {
                    debug!(sink = %name, error = %e, "Publish failed");
                }
            }
        }));
        self.tx = Some(tx);

        info!(sink = %self.name, endpoint = %endpoint, "Broadcast socket bound");
        self.bound_endpoint = Some(endpoint.to_string());
        Ok(())
    }

    async fn send(&mut self, sample: Arc<Sample>) -> Result<(), ContractError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not bound"))?;

        let payload = BroadcastRecord::from_sample(&sample).pack();
        match tx.try_send(payload) {
            Ok(()) => {
                self.queued += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                observability::record_broadcast_drop();
                self.drop_logger.record(&self.name, self.dropped);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(ContractError::sink_write(&self.name, "publisher stopped"))
            }
        }
    }

    /// Zero linger: queued messages are discarded
    #[instrument(name = "broadcast_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.tx = None;
        if let Some(publisher) = self.publisher.take() {
            publisher.abort();
            if let Err(e) = publisher.await {
                if !e.is_cancelled() {
                    warn!(sink = %self.name, error = %e, "Publisher task failed");
                }
            }
        }
        info!(
            sink = %self.name,
            queued = self.queued,
            dropped = self.dropped,
            "Broadcast socket closed"
        );
        Ok(())
    }

    fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeromq::{SocketRecv, SubSocket};

    fn config(endpoint: &str, high_water_mark: usize) -> BroadcastSinkConfig {
        BroadcastSinkConfig {
            endpoint: endpoint.into(),
            high_water_mark,
        }
    }

    #[tokio::test]
    async fn test_bind_reports_resolved_port() {
        let mut sink = BroadcastSink::new("broadcast", config("tcp://127.0.0.1:0", 16));
        sink.start().await.unwrap();

        let endpoint = sink.bound_endpoint().unwrap().to_string();
        assert!(endpoint.starts_with("tcp://127.0.0.1:"), "{endpoint}");
        assert!(!endpoint.ends_with(":0"), "{endpoint}");
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_start() {
        let mut sink = BroadcastSink::new("broadcast", config("not-an-endpoint", 16));
        let err = sink.start().await.unwrap_err();
        assert!(matches!(err, ContractError::SinkOpen { .. }));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let mut sink = BroadcastSink::new("broadcast", config("tcp://127.0.0.1:0", 2));
        sink.start().await.unwrap();

        // publisher task has not been polled yet on the current-thread runtime
        for ts in 0..5 {
            sink.send(Arc::new(Sample::new(ts, ts, ts))).await.unwrap();
        }
        assert_eq!(sink.queued_count(), 2);
        assert_eq!(sink.dropped_count(), 3);
        sink.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscriber_receives_packed_record() {
        let mut sink = BroadcastSink::new("broadcast", config("tcp://127.0.0.1:0", 64));
        sink.start().await.unwrap();
        let endpoint = sink.bound_endpoint().unwrap().to_string();

        let mut sub = SubSocket::new();
        sub.connect(&endpoint).await.unwrap();
        sub.subscribe("gaze").await.unwrap();

        let sample = Sample::new(1_700_000_000_000, 0, 0).with_midpoint(Some((0.5, 0.5)), Some((1920, 1080)));
        let sample = Arc::new(sample);

        // subscriptions propagate asynchronously, so keep publishing until one lands
        let received = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                sink.send(Arc::clone(&sample)).await.unwrap();
                if let Ok(Ok(message)) =
                    tokio::time::timeout(Duration::from_millis(100), sub.recv()).await
                {
                    return message;
                }
            }
        })
        .await
        .unwrap();

        let frame = received.get(0).unwrap();
        let record = BroadcastRecord::unpack(frame).unwrap();
        assert_eq!((record.x_px, record.y_px), (1920, 1080));
        assert!(record.valid);
        sink.close().await.unwrap();
    }
}
