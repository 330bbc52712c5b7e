use crate::config::DeviceConfig;
use crate::error::ApiError;
use crate::transport::{DeviceApi, StatusPayload};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// 打印机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    Busy,
    Finished,
    Stopped,
    Idle,
    Paused,
    Printing,
    Ready,
    Attention,
    Error,
}

/// 处于这些状态时可以安全地操作文件
pub const IDLE_STATES: [DeviceState; 3] =
    [DeviceState::Finished, DeviceState::Idle, DeviceState::Ready];

impl DeviceState {
    /// 不区分大小写解析，未知状态返回 None
    pub fn parse(state: &str) -> Option<Self> {
        match state.to_uppercase().as_str() {
            "BUSY" => Some(Self::Busy),
            "FINISHED" => Some(Self::Finished),
            "STOPPED" => Some(Self::Stopped),
            "IDLE" => Some(Self::Idle),
            "PAUSED" => Some(Self::Paused),
            "PRINTING" => Some(Self::Printing),
            "READY" => Some(Self::Ready),
            "ATTENTION" => Some(Self::Attention),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// 从状态响应中提取打印机状态
    pub fn from_status(device: &str, status: &StatusPayload) -> Option<Self> {
        let Some(raw) = status.printer.as_ref().and_then(|p| p.state.as_deref()) else {
            warn!("{}: 无法获取打印机状态", device);
            return None;
        };
        let state = Self::parse(raw);
        if state.is_none() {
            warn!("{}: 无法识别的打印机状态 \"{}\"", device, raw);
        }
        state
    }

    pub fn is_idle(&self) -> bool {
        IDLE_STATES.contains(self)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Busy => "BUSY",
            Self::Finished => "FINISHED",
            Self::Stopped => "STOPPED",
            Self::Idle => "IDLE",
            Self::Paused => "PAUSED",
            Self::Printing => "PRINTING",
            Self::Ready => "READY",
            Self::Attention => "ATTENTION",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// 一台打印机
#[derive(Clone)]
pub struct Device {
    pub name: String,
    pub printer_type: String,
    pub api: Arc<dyn DeviceApi>,
}

impl Device {
    pub fn new(name: impl Into<String>, printer_type: impl Into<String>, api: Arc<dyn DeviceApi>) -> Self {
        Self {
            name: name.into(),
            printer_type: printer_type.into(),
            api,
        }
    }

    pub fn from_config(name: &str, config: &DeviceConfig) -> Result<Self, ApiError> {
        let api = crate::transport::create_api(name, config)?;
        Ok(Self::new(name, &config.printer_type, api))
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("printer_type", &self.printer_type)
            .finish()
    }
}
