//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `epoch_timestamp_ms` is wall-clock (Unix ms), derived once at acquisition
//! - `device_timestamp_us` / `system_timestamp_us` are the tracker's monotonic clocks
//! - Queue order is acquisition order; no stage reorders

mod blueprint;
mod broadcast;
mod bundle;
mod error;
mod sample;
mod sink;
mod stream;

pub use blueprint::*;
pub use broadcast::*;
pub use bundle::*;
pub use error::*;
pub use sample::*;
pub use sink::*;
pub use stream::*;
