//! 设备配置模块

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 单台打印机的连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 主机名或 IP，可带 `http://` 前缀
    pub host: String,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: String,
    /// 型号（MK4、XL 等），只用于显示
    #[serde(default)]
    pub printer_type: String,
}

fn default_username() -> String {
    "maker".to_string()
}

impl DeviceConfig {
    /// 没有写协议时默认使用 http
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        }
    }
}

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// 按扩展名判断（不区分大小写）
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" | "jso" | "jsn" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(SyncError::Config(format!(
                "不支持的配置文件格式: {}（可用 .json、.jso、.jsn、.toml）",
                path.display()
            ))),
        }
    }
}

/// 读取设备配置文件，返回 设备名 -> 配置
pub fn load_devices(path: &Path) -> Result<BTreeMap<String, DeviceConfig>> {
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    parse_devices(&content, format)
}

pub fn parse_devices(content: &str, format: ConfigFormat) -> Result<BTreeMap<String, DeviceConfig>> {
    let devices: BTreeMap<String, DeviceConfig> = match format {
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| SyncError::Config(format!("JSON 解析失败: {}", e)))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| SyncError::Config(format!("TOML 解析失败: {}", e)))?
        }
    };

    if let Some((name, _)) = devices.iter().find(|(_, d)| d.host.trim().is_empty()) {
        return Err(SyncError::Config(format!("设备 {} 没有配置 host", name)));
    }

    Ok(devices)
}

/// 按名称筛选设备
///
/// 名称不区分大小写。包含列表非空时只看包含列表，否则排除排除列表中的设备。
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DeviceFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: include.iter().map(|s| s.to_lowercase()).collect(),
            exclude: exclude.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        if !self.include.is_empty() {
            return self.include.contains(&name);
        }
        !self.exclude.contains(&name)
    }

    pub fn apply<'m>(
        &self,
        devices: &'m BTreeMap<String, DeviceConfig>,
    ) -> Vec<(&'m String, &'m DeviceConfig)> {
        devices
            .iter()
            .filter(|(name, _)| self.matches(name))
            .collect()
    }
}
