//! # Acquisition
//!
//! Sample acquisition module.
//!
//! Responsibilities:
//! - `SampleSource` trait implemented by hardware or simulated sources
//! - Bounded source queue (`async-channel`), blocking and callback enqueue
//! - `SourceHandle`: runs a source and terminates its stream exactly once
//! - Midpoint derivation and monotonic-to-UTC clock alignment
//!
//! ## Usage Example
//!
//! ```ignore
//! use acquisition::{source_channel, SimulatedSource, SourceHandle};
//!
//! let (tx, rx) = source_channel("simulated", 7200);
//! let mut handle = SourceHandle::spawn(SimulatedSource::new(&blueprint.source), tx);
//!
//! // ... distributor consumes rx ...
//! handle.stop();
//! let report = handle.join().await;
//! ```

mod channel;
mod clock;
mod handle;
mod midpoint;
mod simulated;
mod source;

pub use channel::{source_channel, SampleReceiver, SampleSender, SourceStats};
pub use clock::{ClockProbe, MonotonicClock};
pub use handle::{SourceHandle, SourceReport};
pub use midpoint::{derive_midpoint, Midpoint, ScreenSize};
pub use simulated::SimulatedSource;
pub use source::{LocalSampleSource, SampleSource};
