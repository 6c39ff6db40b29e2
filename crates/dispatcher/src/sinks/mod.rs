//! Sink implementations
//!
//! Contains FileSink (CSV), ColumnarFileSink (Parquet), BroadcastSink (ZeroMQ)
//! and RemoteSink (HTTP, fed by a Bundler).

mod broadcast;
mod columnar;
mod file;
mod remote;

pub use self::broadcast::{BroadcastSink, BroadcastSinkConfig};
pub use self::columnar::{gaze_schema, ColumnarFileSink, ColumnarSinkConfig, ColumnarStats};
pub use self::file::{FileSink, FileSinkConfig, CSV_HEADER};
pub use self::remote::{
    http_branch, BundleTransport, HttpTransport, LocalBundleTransport, RemoteBranch, RemoteSink,
    RemoteSinkConfig, RemoteStats, RetryPolicy,
};
