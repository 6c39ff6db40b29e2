//! Source output queue
//!
//! Bounded MPMC queue (`async-channel`) between a source and the distributor.
//! The async side (`send`) waits for room; the callback side
//! (`push_from_callback`) never blocks and may run on a foreign thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{ContractError, Sample, SampleItem, StreamItem};
use observability::DropLogger;

/// Receiving end consumed by the distributor
pub type SampleReceiver = Receiver<SampleItem>;

/// Create a source queue holding at most `capacity` items
pub fn source_channel(name: impl Into<String>, capacity: usize) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let name: String = name.into();
    let sender = SampleSender {
        name: Arc::from(name),
        tx,
        counters: Arc::new(SourceCounters::default()),
        drop_logger: Arc::new(DropLogger::new(
            "source queue full, sample dropped",
            Duration::from_secs(5),
        )),
    };
    (sender, rx)
}

#[derive(Debug, Default)]
struct SourceCounters {
    produced: AtomicU64,
    dropped: AtomicU64,
}

/// Producer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub produced: u64,
    pub dropped: u64,
}

/// Producing end handed to a source
///
/// Only carries samples; the end-of-stream marker is written by
/// [`crate::SourceHandle`] once the source has returned.
#[derive(Debug, Clone)]
pub struct SampleSender {
    name: Arc<str>,
    tx: Sender<SampleItem>,
    counters: Arc<SourceCounters>,
    drop_logger: Arc<DropLogger>,
}

impl SampleSender {
    /// Enqueue a sample, waiting for room
    ///
    /// # Errors
    /// `ChannelClosed` once the stream has been terminated
    pub async fn send(&self, sample: Sample) -> Result<(), ContractError> {
        self.tx
            .send(StreamItem::Data(Arc::new(sample)))
            .await
            .map_err(|_| ContractError::ChannelClosed {
                name: self.name.to_string(),
            })?;
        self.counters.produced.fetch_add(1, Ordering::Relaxed);
        observability::record_sample_acquired(&self.name);
        Ok(())
    }

    /// Non-blocking enqueue for native callbacks
    ///
    /// Returns `false` if the sample was dropped (queue full or closed).
    pub fn push_from_callback(&self, sample: Sample) -> bool {
        match self.tx.try_send(StreamItem::Data(Arc::new(sample))) {
            Ok(()) => {
                self.counters.produced.fetch_add(1, Ordering::Relaxed);
                observability::record_sample_acquired(&self.name);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                observability::record_source_drop(&self.name);
                self.drop_logger.record(&self.name, dropped);
                false
            }
        }
    }

    /// Write the end-of-stream marker and close the queue
    ///
    /// After this every clone of the sender fails to enqueue.
    pub(crate) async fn finish(&self) {
        if self.tx.send(StreamItem::EndOfStream).await.is_err() {
            tracing::debug!(source = %self.name, "end of stream not delivered, receiver gone");
        }
        self.tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            produced: self.counters.produced.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
