//! Pipeline 指标收集模块
//!
//! 基于 `metrics` crate 记录采集、分发、各 sink 的运行指标。
//! 指标名统一使用 `gaze_capture_` 前缀。

use metrics::{counter, gauge, histogram};

/// 记录采集到的样本
pub fn record_sample_acquired(source: &str) {
    counter!(
        "gaze_capture_samples_acquired_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录采集端丢弃 (回调入队失败)
pub fn record_source_drop(source: &str) {
    counter!(
        "gaze_capture_source_dropped_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录 Distributor 转发一个样本
pub fn record_sample_distributed(outputs: usize) {
    counter!("gaze_capture_samples_distributed_total").increment(1);
    gauge!("gaze_capture_distributor_outputs").set(outputs as f64);
}

/// 记录 sink 写入结果
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "gaze_capture_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录 sink 丢弃的样本
pub fn record_sink_drop(sink_name: &str, count: u64) {
    counter!(
        "gaze_capture_sink_dropped_total",
        "sink" => sink_name.to_string()
    )
    .increment(count);
}

/// 记录 sink 输入队列深度
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "gaze_capture_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 记录 Bundler 输出的 bundle 大小
pub fn record_bundle_emitted(size: usize) {
    counter!("gaze_capture_bundles_emitted_total").increment(1);
    histogram!("gaze_capture_bundle_size").record(size as f64);
}

/// 记录一次远端请求尝试
pub fn record_remote_attempt(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "gaze_capture_remote_attempts_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录 bundle 最终结果 (sent / dropped)
pub fn record_bundle_outcome(sent: bool) {
    let status = if sent { "sent" } else { "dropped" };
    counter!(
        "gaze_capture_bundles_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次列式落盘
pub fn record_flush(rows: usize, latency_ms: f64) {
    counter!("gaze_capture_flushes_total").increment(1);
    counter!("gaze_capture_flushed_rows_total").increment(rows as u64);
    histogram!("gaze_capture_flush_latency_ms").record(latency_ms);
}

/// 记录广播丢弃 (发送缓冲已满)
pub fn record_broadcast_drop() {
    counter!("gaze_capture_broadcast_dropped_total").increment(1);
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
