//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 消费 Source 队列中的 `Sample`
//! - Fan-out 到多个分支 (每个 sink 一个独立队列和 worker)
//! - Bundler：按大小/时间窗口打包，供 RemoteSink 上传
//! - Sink 实现：CSV、Parquet、ZeroMQ 广播、HTTP 上传

pub mod branch;
pub mod bundler;
pub mod distributor;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use branch::Branch;
pub use bundler::{Bundler, BundlerConfig, BundlerStats};
pub use contracts::{SampleSink, StreamItem};
pub use distributor::{Distributor, DistributorStats};
pub use error::{DispatcherError, TransportError};
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics, SinkReport};
pub use sinks::{
    http_branch, BroadcastSink, BroadcastSinkConfig, BundleTransport, ColumnarFileSink,
    ColumnarSinkConfig, FileSink, FileSinkConfig, HttpTransport, RemoteBranch, RemoteSink,
    RemoteSinkConfig, RetryPolicy,
};
