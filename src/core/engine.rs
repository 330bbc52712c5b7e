use crate::core::comparator::{FileComparator, LocalFile, RemoteDestination, SyncPlan};
use crate::core::device::{Device, DeviceState};
use crate::core::storage::DeviceStorage;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 同步选项，所有设备共享
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// 远程目标目录
    pub destination: RemoteDestination,
    /// 计算远程路径时以此目录为起点
    pub relative_to: PathBuf,
    /// 忽略打印机状态，忙碌的设备也会被操作
    pub ignore_state: bool,
    /// false 时只生成计划，不做任何修改
    pub execute: bool,
}

/// 对单个文件执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileAction {
    Delete,
    Upload,
    /// 先删除过期文件再上传
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStatus {
    Succeeded,
    Failed(String),
    /// 要删除的文件已经不存在
    AlreadyAbsent,
}

/// 单个文件的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    /// 删除时为远程显示路径，上传时为本地路径
    pub path: String,
    pub action: FileAction,
    pub status: FileStatus,
}

impl FileResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DeviceOutcome {
    /// 设备忙碌或状态未知，没有进行任何文件操作
    Skipped { state: Option<DeviceState> },
    /// 预演模式，只生成计划
    Planned { plan: SyncPlan },
    Applied {
        plan: SyncPlan,
        results: Vec<FileResult>,
    },
}

/// 单台设备的同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub device: String,
    pub outcome: DeviceOutcome,
}

impl DeviceReport {
    pub fn plan(&self) -> Option<&SyncPlan> {
        match &self.outcome {
            DeviceOutcome::Skipped { .. } => None,
            DeviceOutcome::Planned { plan } | DeviceOutcome::Applied { plan, .. } => Some(plan),
        }
    }

    pub fn results(&self) -> &[FileResult] {
        match &self.outcome {
            DeviceOutcome::Applied { results, .. } => results,
            _ => &[],
        }
    }
}

/// 没有完成的设备
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFailure {
    pub device: String,
    pub reason: String,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub reports: Vec<DeviceReport>,
    pub failures: Vec<DeviceFailure>,
}

impl RunSummary {
    /// 所有设备都正常结束即为成功，单个文件失败不算
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_files(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| r.results())
            .filter(|r| r.is_failed())
            .count()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// 同步引擎
pub struct SyncEngine {
    options: Arc<SyncOptions>,
    max_concurrent: usize,
}

impl SyncEngine {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options: Arc::new(options),
            max_concurrent: default_concurrency(),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// 并发同步所有设备，每台设备一个任务
    ///
    /// 单台设备的失败（包括任务 panic）只记录在汇总中，不影响其他设备。
    pub async fn run_all(
        &self,
        devices: Vec<Device>,
        local_files: Vec<LocalFile>,
    ) -> anyhow::Result<RunSummary> {
        info!(
            "开始同步: {} 台设备, {} 个本地文件, 并发数 {}",
            devices.len(),
            local_files.len(),
            self.max_concurrent
        );

        let local_files = Arc::new(local_files);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(devices.len());

        for device in devices {
            let permit = semaphore.clone().acquire_owned().await?;
            let local_files = local_files.clone();
            let options = self.options.clone();
            let name = device.name.clone();

            let handle = tokio::spawn(async move {
                let result = sync_device(&device, &local_files, &options).await;
                drop(permit);
                result
            });

            handles.push((name, handle));
        }

        let mut summary = RunSummary::default();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    info!("{}: 完成", name);
                    summary.reports.push(report);
                }
                Ok(Err(e)) => {
                    error!("{}: 同步失败: {}", name, e);
                    summary.failures.push(DeviceFailure {
                        device: name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("{}: 任务异常退出: {}", name, e);
                    summary.failures.push(DeviceFailure {
                        device: name,
                        reason: format!("任务异常退出: {}", e),
                    });
                }
            }
        }

        info!(
            "同步结束: {} 台完成, {} 台失败",
            summary.reports.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}

/// 同步单台设备
///
/// 先查询一次状态：设备忙碌时直接返回，不再发任何请求；
/// 否则用同一份状态响应构建文件树，生成计划，执行模式下再逐个执行。
pub async fn sync_device(
    device: &Device,
    local_files: &[LocalFile],
    options: &SyncOptions,
) -> Result<DeviceReport> {
    let status = device.api.fetch_status().await;
    if let Err(e) = &status {
        warn!("{}: 获取状态失败: {}", device.name, e);
    }

    let state = status
        .as_ref()
        .ok()
        .and_then(|s| DeviceState::from_status(&device.name, s));

    if !options.ignore_state && !state.map(|s| s.is_idle()).unwrap_or(false) {
        match state {
            Some(state) => info!("{}: 当前状态为 {}，不进行访问", device.name, state),
            None => info!("{}: 状态未知，不进行访问", device.name),
        }
        return Ok(DeviceReport {
            device: device.name.clone(),
            outcome: DeviceOutcome::Skipped { state },
        });
    }

    let status = status.map_err(|e| SyncError::StorageUnavailable {
        device: device.name.clone(),
        reason: e.to_string(),
    })?;
    let mut storage = DeviceStorage::with_status(device.api.clone(), &status).await?;

    let plan = FileComparator::new(storage.tree(), &options.relative_to, &options.destination)
        .plan(local_files)?;
    info!(
        "{}: {} 个文件待删除, {} 个缺失待上传, {} 个过期待刷新",
        device.name,
        plan.excess_count(),
        plan.missing_count(),
        plan.stale_count()
    );

    if !options.execute {
        return Ok(DeviceReport {
            device: device.name.clone(),
            outcome: DeviceOutcome::Planned { plan },
        });
    }

    let results = apply_plan(&mut storage, &plan).await;
    Ok(DeviceReport {
        device: device.name.clone(),
        outcome: DeviceOutcome::Applied { plan, results },
    })
}

/// 按顺序执行计划：删除多余文件，上传缺失和过期文件，最后重新加载文件树
///
/// 每个文件单独记录结果，失败不会中断后续文件。
pub async fn apply_plan(storage: &mut DeviceStorage, plan: &SyncPlan) -> Vec<FileResult> {
    let mut results = Vec::with_capacity(plan.excess.len() + plan.targets.len());

    for path in &plan.excess {
        let status = match storage.find_by_display_path(path) {
            Some(node) => match storage.delete_node(node).await {
                Ok(()) => {
                    info!("{}: 已删除 {}", storage.name(), path);
                    FileStatus::Succeeded
                }
                Err(e) => {
                    warn!("{}: 删除 {} 失败: {}", storage.name(), path, e);
                    FileStatus::Failed(e.to_string())
                }
            },
            None => {
                info!("{}: {} 已不存在", storage.name(), path);
                FileStatus::AlreadyAbsent
            }
        };
        results.push(FileResult {
            path: path.clone(),
            action: FileAction::Delete,
            status,
        });
    }

    for target in &plan.targets {
        let action = if target.stale {
            // 先删掉旧文件，失败时仍然尝试覆盖上传
            if let Some(node) = storage.find_by_display_path(&target.remote_path) {
                if let Err(e) = storage.delete_node(node).await {
                    warn!(
                        "{}: 删除过期文件 {} 失败: {}",
                        storage.name(),
                        target.remote_path,
                        e
                    );
                }
            }
            FileAction::Refresh
        } else {
            FileAction::Upload
        };

        let status = match storage
            .upload_file(&target.local_path, &target.remote_path)
            .await
        {
            Ok(()) => {
                info!(
                    "{}: 已上传 {:?} -> {}",
                    storage.name(),
                    target.local_path,
                    target.remote_path
                );
                FileStatus::Succeeded
            }
            Err(e) => {
                warn!(
                    "{}: 上传 {:?} 失败: {}",
                    storage.name(),
                    target.local_path,
                    e
                );
                FileStatus::Failed(e.to_string())
            }
        };
        results.push(FileResult {
            path: target.local_path.display().to_string(),
            action,
            status,
        });
    }

    if let Err(e) = storage.reload().await {
        warn!("{}: 重新加载文件树失败: {}", storage.name(), e);
    } else {
        debug!("{}: 文件树已重新加载", storage.name());
    }

    results
}
