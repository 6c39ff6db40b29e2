//! # Session
//!
//! 录制会话管理。
//!
//! - `Runner`：单次会话的生命周期 (Stopped → Starting → Running → Stopping)
//! - `factory`：按配置为每次会话创建新的 source 和 sinks
//! - `SessionManager`：参与者目录与开始/停止录制
//! - `SessionReport`：会话结束后的各 sink 计数

pub mod error;
pub mod factory;
pub mod manager;
pub mod report;
pub mod runner;

pub use error::SessionError;
pub use factory::{build_branches, SimulatedSourceFactory, SourceFactory};
pub use manager::SessionManager;
pub use report::{SessionReport, SourceSummary};
pub use runner::{Runner, SessionState};
