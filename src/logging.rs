//! 日志模块 - 提供文件日志和大小管理功能

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

/// 日志文件名
pub const LOG_FILE_NAME: &str = "linksync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志目录，未设置时使用缓存目录
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
            directory: None,
        }
    }
}

impl LogConfig {
    /// 从 `config_dir/config.json` 的 `log` 字段加载，读取失败时使用默认值
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("log").cloned())
            .and_then(|log| serde_json::from_value::<LogConfig>(log).ok())
            .unwrap_or_default()
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(get_log_dir)
    }
}

/// 日志文件超过限制时改名为 `.log.old`，旧备份会被覆盖
pub fn rotate_if_oversized(file_path: &Path, max_size_mb: u32) -> io::Result<bool> {
    let max_size = (max_size_mb as u64) * 1024 * 1024;
    let Ok(metadata) = fs::metadata(file_path) else {
        return Ok(false);
    };
    if metadata.len() <= max_size {
        return Ok(false);
    }

    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)?;
    Ok(true)
}

/// 打开日志文件（必要时先轮转），返回非阻塞写入器
///
/// 返回的 guard 必须一直持有到程序退出，否则缓冲中的日志会丢失。
pub fn file_writer(log_dir: &Path, max_size_mb: u32) -> io::Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(log_dir)?;

    let file_path = log_dir.join(LOG_FILE_NAME);
    rotate_if_oversized(&file_path, max_size_mb)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)?;

    Ok(tracing_appender::non_blocking(file))
}

/// 默认日志目录
pub fn get_log_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("linksync"))
        .unwrap_or_else(|| PathBuf::from(".linksync"))
}

/// 默认配置目录，存放 config.json
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("linksync"))
        .unwrap_or_else(|| PathBuf::from(".linksync"))
}
