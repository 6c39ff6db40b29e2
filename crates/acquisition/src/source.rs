//! SampleSource trait - Acquisition interface
//!
//! A source produces samples into a [`SampleSender`] until it is told to stop
//! or runs out. It never writes the end-of-stream marker itself; the
//! [`crate::SourceHandle`] running it does so on every exit path.

use contracts::ContractError;
use tokio_util::sync::CancellationToken;

use crate::SampleSender;

/// Sample producer trait
#[trait_variant::make(SampleSource: Send)]
pub trait LocalSampleSource {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Produce samples until `stop` is cancelled or the source is exhausted
    ///
    /// Samples must be sent in strictly increasing device-timestamp order.
    ///
    /// # Errors
    /// Acquisition failure; the stream is still terminated cleanly
    async fn run(&mut self, out: SampleSender, stop: CancellationToken) -> Result<(), ContractError>;
}
