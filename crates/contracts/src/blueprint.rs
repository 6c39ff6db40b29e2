//! SessionBlueprint - Config Loader 输出
//!
//! 描述一次录制会话的完整配置：数据目录、模拟数据源、队列容量、输出路由。
//! 默认值与采集程序的出厂设置一致（120 Hz）。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::ContractError;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的会话配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SessionBlueprint {
    /// 配置版本
    pub version: ConfigVersion,

    /// 录制数据根目录 (每个被试一个子目录)
    pub data_dir: PathBuf,

    /// 模拟数据源
    #[validate(nested)]
    pub source: SourceConfig,

    /// 队列容量
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// 输出路由配置
    #[validate(nested)]
    pub sinks: SinksConfig,
}

impl Default for SessionBlueprint {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            data_dir: PathBuf::from("./recordings"),
            source: SourceConfig::default(),
            pipeline: PipelineConfig::default(),
            sinks: SinksConfig::default(),
        }
    }
}

impl SessionBlueprint {
    /// Names of enabled sinks, in distributor order
    pub fn enabled_sinks(&self) -> Vec<&'static str> {
        let sinks = &self.sinks;
        [
            (sinks.csv.enabled, "csv"),
            (sinks.parquet.enabled, "parquet"),
            (sinks.broadcast.enabled, "broadcast"),
            (sinks.remote.enabled, "remote"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

/// 模拟数据源配置 (圆周轨迹)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SourceConfig {
    /// 采样频率 (Hz)，0.01 Hz ..= 10 kHz
    #[validate(range(min = 0.01, max = 10_000.0))]
    pub frequency_hz: f64,

    /// 屏幕分辨率
    #[validate(range(min = 1))]
    pub screen_width_px: u32,
    #[validate(range(min = 1))]
    pub screen_height_px: u32,

    /// 轨迹半径 (归一化坐标)
    #[validate(range(min = 0.0, max = 0.5))]
    pub radius: f64,

    /// 轨迹中心 (归一化坐标)
    pub center: (f64, f64),

    /// 每秒转数
    pub speed_rev_per_s: f64,

    /// 无效样本概率 (模拟眨眼/丢失)
    #[validate(range(min = 0.0, max = 1.0))]
    pub invalid_probability: f64,

    /// 随机种子 (None = 随机)
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 120.0,
            screen_width_px: 3840,
            screen_height_px: 2160,
            radius: 0.2,
            center: (0.5, 0.5),
            speed_rev_per_s: 0.5,
            invalid_probability: 0.0,
            seed: None,
        }
    }
}

/// 队列容量配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source 输出队列容量
    #[validate(range(min = 1))]
    pub source_queue_capacity: usize,

    /// Distributor -> 每个 sink 分支的队列容量
    #[validate(range(min = 1))]
    pub branch_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // 1 minute at 120 Hz
            source_queue_capacity: 120 * 60,
            // 10 seconds at 120 Hz
            branch_queue_capacity: 120 * 10,
        }
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SinksConfig {
    #[validate(nested)]
    pub csv: CsvSinkConfig,

    #[validate(nested)]
    pub parquet: ParquetSinkConfig,

    #[validate(nested)]
    pub broadcast: BroadcastSinkConfig,

    #[validate(nested)]
    pub remote: RemoteSinkConfig,
}

/// 行式 CSV 输出
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CsvSinkConfig {
    pub enabled: bool,

    /// 文件名前缀
    #[validate(length(min = 1))]
    pub file_prefix: String,
}

impl Default for CsvSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_prefix: "gaze".to_string(),
        }
    }
}

/// 列式 Parquet 输出
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_queue_exceeds_buffer"))]
pub struct ParquetSinkConfig {
    pub enabled: bool,

    /// 队列满时丢弃 (true) 或阻塞生产者 (false)
    pub drop_when_full: bool,

    /// 每次落盘的样本数
    #[validate(range(min = 1))]
    pub max_buffer_size: usize,

    /// 内部队列容量，必须 > max_buffer_size
    #[validate(range(min = 2))]
    pub queue_size: usize,

    /// 文件名前缀
    #[validate(length(min = 1))]
    pub file_prefix: String,
}

impl Default for ParquetSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_when_full: true,
            // Flushes every 5 seconds at 120 Hz
            max_buffer_size: 120 * 5,
            // Holds 5 minutes at 120 Hz
            queue_size: 120 * 5 * 60,
            file_prefix: "gaze".to_string(),
        }
    }
}

fn validate_queue_exceeds_buffer(config: &ParquetSinkConfig) -> Result<(), ValidationError> {
    if config.queue_size <= config.max_buffer_size {
        return Err(ValidationError::new("queue_size").with_message(
            format!(
                "queue_size ({}) must be > max_buffer_size ({})",
                config.queue_size, config.max_buffer_size
            )
            .into(),
        ));
    }
    Ok(())
}

/// 实时广播 (ZeroMQ PUB)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BroadcastSinkConfig {
    pub enabled: bool,

    /// 绑定地址 (e.g., "tcp://0.0.0.0:5555")
    #[validate(length(min = 1))]
    pub endpoint: String,

    /// 发送缓冲上限 (消息数)
    #[validate(range(min = 1))]
    pub high_water_mark: usize,
}

impl Default for BroadcastSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "tcp://0.0.0.0:5555".to_string(),
            // 10 seconds at 120 Hz
            high_water_mark: 120 * 10,
        }
    }
}

/// Upper bound for every remote timing setting (seconds)
pub const MAX_REMOTE_SECONDS: f64 = 3600.0;

/// 远端 HTTP 输出 (经 Bundler 打包)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RemoteSinkConfig {
    pub enabled: bool,

    /// POST 目标
    #[validate(url)]
    pub server_url: String,

    /// 每包最大样本数
    #[validate(range(min = 1))]
    pub bundle_size: usize,

    /// 每包最长等待时间 (秒)
    #[validate(range(exclusive_min = 0.0, max = MAX_REMOTE_SECONDS))]
    pub max_bundle_interval_s: f64,

    /// 并发请求上限
    #[validate(range(min = 1))]
    pub max_concurrent_sends: usize,

    /// 每包最多尝试次数
    #[validate(range(min = 1))]
    pub retry_attempts: u32,

    /// 指数退避基数 (秒)
    #[validate(range(min = 0.0, max = MAX_REMOTE_SECONDS))]
    pub backoff_factor_s: f64,

    /// 单次请求超时 (秒)
    #[validate(range(exclusive_min = 0.0, max = MAX_REMOTE_SECONDS))]
    pub request_timeout_s: f64,
}

impl Default for RemoteSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:8000/api/gaze".to_string(),
            bundle_size: 60,
            max_bundle_interval_s: 1.0,
            max_concurrent_sends: 10,
            retry_attempts: 3,
            backoff_factor_s: 0.5,
            request_timeout_s: 5.0,
        }
    }
}

impl RemoteSinkConfig {
    pub fn max_bundle_interval(&self) -> Result<Duration, ContractError> {
        seconds("sinks.remote.max_bundle_interval_s", self.max_bundle_interval_s)
    }

    pub fn backoff_factor(&self) -> Result<Duration, ContractError> {
        seconds("sinks.remote.backoff_factor_s", self.backoff_factor_s)
    }

    pub fn request_timeout(&self) -> Result<Duration, ContractError> {
        seconds("sinks.remote.request_timeout_s", self.request_timeout_s)
    }
}

/// Seconds to `Duration`, rejecting negative, NaN and overflowing values
fn seconds(field: &str, value: f64) -> Result<Duration, ContractError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ContractError::config_validation(field, format!("{value} s: {e}")))
}
