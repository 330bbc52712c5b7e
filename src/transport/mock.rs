//! 测试用的设备 API：返回预设的目录树并记录每一次调用

use super::{DeviceApi, FileRecord, PrinterInfo, StatusPayload, StorageInfo};
use crate::error::ApiError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status,
    Listing(String),
    CreateFolder(String),
    Upload(String, PathBuf),
    Delete(String),
}

#[derive(Default)]
pub struct MockDeviceApi {
    name: String,
    status: Option<StatusPayload>,
    listings: HashMap<String, FileRecord>,
    failing: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

pub fn folder(name: &str, display_name: Option<&str>, children: Vec<FileRecord>) -> FileRecord {
    FileRecord {
        name: name.to_string(),
        typ: "FOLDER".to_string(),
        ro: false,
        display_name: display_name.map(str::to_string),
        m_timestamp: None,
        children,
    }
}

pub fn file(name: &str, display_name: Option<&str>, m_timestamp: Option<i64>) -> FileRecord {
    FileRecord {
        name: name.to_string(),
        typ: "PRINT_FILE".to_string(),
        ro: false,
        display_name: display_name.map(str::to_string),
        m_timestamp,
        children: Vec::new(),
    }
}

impl MockDeviceApi {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// 设置状态响应，存储根为 storage_path
    pub fn with_status(mut self, state: &str, storage_path: &str) -> Self {
        self.status = Some(StatusPayload {
            storage: Some(StorageInfo {
                path: storage_path.to_string(),
                name: None,
                read_only: false,
            }),
            printer: Some(PrinterInfo {
                state: Some(state.to_string()),
            }),
        });
        self
    }

    /// 按目录树注册每一级目录的列表响应
    ///
    /// 根记录按 `root_request` 注册（设备状态里给出的存储路径），
    /// 之后按短路径注册每一个文件夹。
    pub fn with_tree(mut self, root_request: &str, root: FileRecord) -> Self {
        self.listings.insert(root_request.to_string(), root.clone());
        self.register(&format!("/{}", root.name), &root);
        self
    }

    fn register(&mut self, short_path: &str, record: &FileRecord) {
        let mut listing = record.clone();
        for child in &mut listing.children {
            child.children.clear();
        }
        self.listings.insert(short_path.to_string(), listing);

        for child in &record.children {
            if child.typ == "FOLDER" {
                self.register(&format!("{}/{}", short_path, child.name), child);
            }
        }
    }

    /// 让对 path 的任何调用失败
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// 除了查询和列表之外的写操作
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Status | Call::Listing(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, path: &str) -> Result<(), ApiError> {
        if self.failing.contains(path) {
            Err(ApiError::Status {
                method: "MOCK".to_string(),
                url: path.to_string(),
                status: 500,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn fetch_status(&self) -> Result<StatusPayload, ApiError> {
        self.record(Call::Status);
        self.status
            .clone()
            .ok_or_else(|| ApiError::Malformed("no status".to_string()))
    }

    async fn fetch_listing(&self, path: &str) -> Result<FileRecord, ApiError> {
        self.record(Call::Listing(path.to_string()));
        self.check(path)?;
        self.listings.get(path).cloned().ok_or(ApiError::Status {
            method: "GET".to_string(),
            url: path.to_string(),
            status: 404,
        })
    }

    async fn create_folder(&self, path: &str) -> Result<(), ApiError> {
        self.record(Call::CreateFolder(path.to_string()));
        self.check(path)
    }

    async fn upload_file(&self, path: &str, local_path: &Path) -> Result<(), ApiError> {
        self.record(Call::Upload(path.to_string(), local_path.to_path_buf()));
        self.check(path)
    }

    async fn delete_file(&self, path: &str) -> Result<(), ApiError> {
        self.record(Call::Delete(path.to_string()));
        self.check(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
