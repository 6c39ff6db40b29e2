//! Distributor - fan-out loop from the source queue to every branch
//!
//! Delivery is sequential and blocking: each item is handed to every output in
//! list order, waiting for room in each. A branch that never accepts stalls the
//! loop (and through the source queue, the source). Branch workers therefore
//! never stop consuming before `EndOfStream`, even when their sink failed.

use async_channel::Receiver;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::StreamItem;

/// Named branch input
struct Output<T> {
    name: String,
    tx: mpsc::Sender<StreamItem<T>>,
    closed: bool,
}

/// Counters returned when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorStats {
    /// Data items taken from the input
    pub items: u64,
    /// End-of-stream markers forwarded
    pub ends: u64,
    /// Outputs found closed during the run
    pub closed_outputs: usize,
}

/// Fans each input item out to every registered output
pub struct Distributor<T> {
    input: Receiver<StreamItem<T>>,
    outputs: Vec<Output<T>>,
    cancel: CancellationToken,
}

impl<T: Clone + Send + 'static> Distributor<T> {
    pub fn new(input: Receiver<StreamItem<T>>, cancel: CancellationToken) -> Self {
        Self {
            input,
            outputs: Vec::new(),
            cancel,
        }
    }

    /// Register an output; delivery follows registration order
    pub fn add_output(&mut self, name: impl Into<String>, tx: mpsc::Sender<StreamItem<T>>) {
        self.outputs.push(Output {
            name: name.into(),
            tx,
            closed: false,
        });
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Run until `EndOfStream` has been forwarded, the input closes, or cancellation
    #[instrument(name = "distributor_run", skip(self), fields(outputs = self.outputs.len()))]
    pub async fn run(mut self) -> DistributorStats {
        info!("Distributor started");
        let mut stats = DistributorStats::default();

        'items: loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Distributor cancelled");
                    break;
                }
                item = self.input.recv() => match item {
                    Ok(item) => item,
                    Err(_) => break,
                },
            };

            let is_end = item.is_end();
            if is_end {
                stats.ends += 1;
            } else {
                stats.items += 1;
                observability::record_sample_distributed(self.outputs.len());
            }

            for output in self.outputs.iter_mut().filter(|o| !o.closed) {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!(output = %output.name, "Distributor cancelled mid-delivery");
                        break 'items;
                    }
                    sent = output.tx.send(item.clone()) => {
                        if sent.is_err() {
                            warn!(output = %output.name, "Output closed, skipping it from now on");
                            output.closed = true;
                            stats.closed_outputs += 1;
                        }
                    }
                }
            }

            if is_end {
                break;
            }

            if stats.items > 0 && stats.items % 1200 == 0 {
                debug!(items = stats.items, "Distributor progress");
            }
        }

        info!(
            items = stats.items,
            ends = stats.ends,
            closed_outputs = stats.closed_outputs,
            "Distributor stopped"
        );
        stats
    }

    /// Spawn the loop as a background task
    pub fn spawn(self) -> JoinHandle<DistributorStats> {
        tokio::spawn(self.run())
    }
}
