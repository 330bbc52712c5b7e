use super::node::{NodeId, RemoteNode, RemoteTree};
use super::resolver::parent_of;
use crate::error::{ApiError, Result, SyncError};
use crate::transport::{DeviceApi, StatusPayload};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一台设备的存储：远程文件树 + 用于修改它的 API
pub struct DeviceStorage {
    name: String,
    api: Arc<dyn DeviceApi>,
    tree: RemoteTree,
}

impl DeviceStorage {
    /// 查询状态得到存储根路径，再构建完整文件树
    pub async fn connect(api: Arc<dyn DeviceApi>) -> Result<Self> {
        let status = api.fetch_status().await.map_err(|e| SyncError::StorageUnavailable {
            device: api.name().to_string(),
            reason: e.to_string(),
        })?;
        Self::with_status(api, &status).await
    }

    /// 使用已获取的状态响应构建文件树
    pub async fn with_status(api: Arc<dyn DeviceApi>, status: &StatusPayload) -> Result<Self> {
        let name = api.name().to_string();
        let unavailable = |reason: String| SyncError::StorageUnavailable {
            device: name.clone(),
            reason,
        };

        let storage_path = status
            .storage
            .as_ref()
            .map(|s| s.path.clone())
            .ok_or_else(|| unavailable("状态响应中没有存储路径".to_string()))?;

        let root_record = api
            .fetch_listing(&storage_path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let mut storage = Self {
            name: name.clone(),
            api,
            tree: RemoteTree::new(RemoteNode::from_record(&root_record)),
        };

        let root = storage.tree.root();
        storage.expand(root).await.map_err(|e| unavailable(e.to_string()))?;
        info!(
            "{}: 存储 {} 加载完成，共 {} 个节点",
            storage.name,
            storage.tree.display_path(root),
            storage.tree.len()
        );
        Ok(storage)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &RemoteTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// 深度优先地拉取 node 之下的所有目录列表
    ///
    /// 只有根目录的列表失败才返回错误，子目录失败时记录警告并保持为空。
    pub async fn expand(&mut self, node: NodeId) -> Result<()> {
        let mut stack = vec![node];

        while let Some(folder) = stack.pop() {
            let short_path = self.tree.short_path(folder);
            let listing = match self.api.fetch_listing(&short_path).await {
                Ok(listing) => listing,
                Err(e) if folder == self.tree.root() => return Err(e.into()),
                Err(e) => {
                    warn!("{}: 无法列出目录 {}: {}", self.name, short_path, e);
                    continue;
                }
            };
            debug!(
                "{}: {} 下有 {} 个条目",
                self.name,
                short_path,
                listing.children.len()
            );

            let mut subfolders = Vec::new();
            for record in &listing.children {
                match self.tree.add_child(folder, RemoteNode::from_record(record)) {
                    Ok(child) if self.tree.node(child).is_folder() => subfolders.push(child),
                    Ok(_) => {}
                    Err(e) => warn!("{}: 跳过条目: {}", self.name, e),
                }
            }
            // 逆序入栈，保持与列表顺序一致的深度优先
            stack.extend(subfolders.into_iter().rev());
        }

        Ok(())
    }

    /// 丢弃整棵子树并重新拉取
    pub async fn reload(&mut self) -> Result<()> {
        self.tree.clear();
        let root = self.tree.root();
        self.expand(root).await
    }

    pub fn iter_all(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.tree.iter_all(self.tree.root())
    }

    pub fn find_by_display_path(&self, path: &str) -> Option<NodeId> {
        self.tree.find_by_display_path(path)
    }

    pub fn find_by_short_path(&self, path: &str) -> Option<NodeId> {
        self.tree.find_by_short_path(path)
    }

    pub fn shortest_path(&self, display_path: &str) -> String {
        self.tree.shortest_path(display_path)
    }

    /// 确保目录存在，已存在时不发请求
    pub async fn ensure_folder(&self, path: &str) -> Result<(), ApiError> {
        if self.tree.find_by_display_path(path).is_some() {
            return Ok(());
        }

        let short = self.tree.shortest_path(path);
        debug!("{}: 创建目录 {} ({})", self.name, path, short);
        self.api.create_folder(&short).await
    }

    /// 上传本地文件，远程路径为显示路径
    pub async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), ApiError> {
        let short = self.tree.shortest_path(remote_path);

        // 父目录不存在时先创建，失败只记录，上传照常进行
        if let Some(parent) = parent_of(remote_path) {
            if let Err(e) = self.ensure_folder(parent).await {
                warn!("{}: 创建目录 {} 失败: {}", self.name, parent, e);
            }
        }

        debug!("{}: 上传 {:?} -> {}", self.name, local_path, short);
        self.api.upload_file(&short, local_path).await
    }

    /// 按短路径删除节点对应的远程文件，成功后从树中摘除
    pub async fn delete_node(&mut self, node: NodeId) -> Result<(), ApiError> {
        let short = self.tree.short_path(node);
        debug!("{}: 删除 {}", self.name, short);
        self.api.delete_file(&short).await?;

        if let Some(parent) = self.tree.node(node).parent() {
            self.tree.detach_child(parent, node);
        }
        Ok(())
    }
}

impl fmt::Display for DeviceStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storage: {}:{}",
            self.name,
            self.tree.node(self.tree.root()).name()
        )
    }
}
