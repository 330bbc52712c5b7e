//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 设备 API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} 返回状态码 {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("响应内容格式错误: {0}")]
    Malformed(String),

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("读取本地文件失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 同步核心错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 无法获取设备存储根节点，设备不可用
    #[error("无法获取设备 {device} 的存储根目录: {reason}")]
    StorageUnavailable { device: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("节点 {0} 不是文件夹，不能添加子节点")]
    NotAFolder(String),

    #[error("{parent} 下已存在同名条目 {name}")]
    DuplicateName { parent: String, name: String },

    #[error("本地文件 {path} 不在 {root} 之下")]
    OutsideSource { path: PathBuf, root: PathBuf },

    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
