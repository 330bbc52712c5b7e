pub mod digest;
#[cfg(test)]
pub mod mock;
pub mod prusalink;

use crate::config::DeviceConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use prusalink::PrusaLinkApi;

/// 设备状态响应（只解析同步需要的字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub storage: Option<StorageInfo>,
    #[serde(default)]
    pub printer: Option<PrinterInfo>,
}

/// 设备存储信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

/// 打印机信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterInfo {
    #[serde(default)]
    pub state: Option<String>,
}

/// 目录列表中的一条记录，根记录带有 children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// 8.3 短文件名
    pub name: String,
    /// "FOLDER"、"PRINT_FILE" 等
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub ro: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    /// 修改时间（Unix 秒）
    #[serde(default)]
    pub m_timestamp: Option<i64>,
    #[serde(default)]
    pub children: Vec<FileRecord>,
}

/// 设备 API 抽象接口
///
/// 所有调用都可能失败，核心逻辑把失败转换为单个条目的失败结果，而不是中止整个同步。
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// 获取设备状态（包含存储根路径和打印机状态）
    async fn fetch_status(&self) -> Result<StatusPayload, ApiError>;

    /// 列出目录（按短路径）
    async fn fetch_listing(&self, path: &str) -> Result<FileRecord, ApiError>;

    /// 创建目录
    async fn create_folder(&self, path: &str) -> Result<(), ApiError>;

    /// 上传本地文件到远程路径（覆盖已有文件）
    async fn upload_file(&self, path: &str, local_path: &Path) -> Result<(), ApiError>;

    /// 删除远程文件
    async fn delete_file(&self, path: &str) -> Result<(), ApiError>;

    /// 设备名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建设备 API 实例，每个设备独享一个 HTTP 会话
pub fn create_api(name: &str, config: &DeviceConfig) -> Result<Arc<dyn DeviceApi>, ApiError> {
    let base_url = config.base_url();
    tracing::debug!("创建 PrusaLink 连接: {} -> {}", name, base_url);
    Ok(Arc::new(PrusaLinkApi::new(
        name,
        &base_url,
        &config.username,
        &config.password,
    )?) as Arc<dyn DeviceApi>)
}
