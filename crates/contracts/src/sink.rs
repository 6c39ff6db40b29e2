//! SampleSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sinks.

use std::sync::Arc;

use crate::{ContractError, Sample};

/// Sample consumer trait
///
/// All sample sink implementations must implement this trait. A sink is
/// driven by exactly one worker: `start` once, `send` per sample in stream
/// order, `close` once.
#[trait_variant::make(SampleSink: Send)]
pub trait LocalSampleSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Open the destination
    ///
    /// # Errors
    /// Returns an open/bind error; the sink is not used afterwards
    async fn start(&mut self) -> Result<(), ContractError>;

    /// Consume one sample
    ///
    /// # Errors
    /// Returns write error (should include context). The worker stops
    /// feeding this sink after the first error.
    async fn send(&mut self, sample: Arc<Sample>) -> Result<(), ContractError>;

    /// Flush and release the destination
    async fn close(&mut self) -> Result<(), ContractError>;

    /// Samples dropped inside the sink (internal queue full, failed flush)
    fn dropped_count(&self) -> u64 {
        0
    }
}
