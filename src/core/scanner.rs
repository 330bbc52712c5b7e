use super::comparator::LocalFile;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 本地扫描配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 只包含这些后缀的文件（含点号，例如 `.gcode`），空表示不限制
    pub suffixes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            suffixes: vec![".gcode".to_string()],
        }
    }
}

/// 本地目录扫描器
#[derive(Debug, Clone, Default)]
pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// 隐藏文件和隐藏目录一律跳过，根目录本身除外
    fn is_hidden(entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
    }

    /// 后缀比较区分大小写
    fn matches_suffix(&self, path: &Path) -> bool {
        if self.config.suffixes.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.config
            .suffixes
            .iter()
            .any(|s| s.trim_start_matches('.') == ext)
    }

    /// 读取修改时间，失败时记录警告并返回 None
    fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => Some(DateTime::<Utc>::from(modified)),
            Err(e) => {
                warn!("跳过无法读取修改时间的文件 {:?}: {}", path, e);
                None
            }
        }
    }

    /// 递归扫描目录，每个文件的修改时间只读取一次
    pub fn scan(&self, root: &Path) -> Result<Vec<LocalFile>> {
        info!("开始扫描本地目录: {:?}", root);

        let mut files = Vec::new();
        let mut excluded_count = 0;

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !Self::is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // 根目录不可读时直接报错，其余条目跳过
                    if e.depth() == 0 {
                        return Err(e
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("无法读取目录"))
                            .into());
                    }
                    warn!("跳过无法访问的条目: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if !self.matches_suffix(entry.path()) {
                debug!("排除文件: {:?}", entry.path());
                excluded_count += 1;
                continue;
            }

            let Some(modified) = Self::modified_at(entry.path()) else {
                continue;
            };
            files.push(LocalFile::new(entry.path(), modified));
        }

        info!("扫描完成: {} 个文件, {} 个被排除", files.len(), excluded_count);
        Ok(files)
    }
}
