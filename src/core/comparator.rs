use super::node::RemoteTree;
use super::resolver::join_remote;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 远程文件比本地旧超过这个时间才认为过期，避免设备时钟偏差和时间戳取整导致重复上传
pub const STALE_TOLERANCE_SECS: i64 = 60;

/// 本地文件，修改时间在扫描时读取一次，整个同步过程复用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>, modified_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            modified_at,
        }
    }
}

/// 同步的远程目标目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDestination {
    /// 存储根目录
    StorageRoot,
    /// 存储根目录下的相对路径（显示名）
    UnderRoot(String),
    /// 完整的显示路径，例如 `/usb/prints`
    Absolute(String),
}

impl RemoteDestination {
    /// 以 `/` 开头的是完整路径，否则相对于存储根目录
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let trimmed = value.trim_end_matches('/');
        // 单独的 "/" 与空值一样指向存储根目录
        if trimmed.is_empty() || trimmed == "." {
            Self::StorageRoot
        } else if value.starts_with('/') {
            Self::Absolute(trimmed.to_string())
        } else {
            Self::UnderRoot(trimmed.to_string())
        }
    }

    /// 在给定的树中解析成显示路径
    pub fn display_path(&self, tree: &RemoteTree) -> String {
        let root = tree.display_path(tree.root());
        match self {
            Self::StorageRoot => root,
            Self::UnderRoot(relative) => join_remote(&root, relative),
            Self::Absolute(path) => path.clone(),
        }
    }
}

impl Default for RemoteDestination {
    fn default() -> Self {
        Self::StorageRoot
    }
}

/// 需要上传或刷新的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    pub local_path: PathBuf,
    /// 远程显示路径
    pub remote_path: String,
    /// true 表示远程已存在但过期
    pub stale: bool,
}

/// 一台设备的同步计划
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    /// 远程多余的文件（显示路径）
    pub excess: BTreeSet<String>,
    pub targets: Vec<SyncTarget>,
}

impl SyncPlan {
    pub fn missing_count(&self) -> usize {
        self.targets.iter().filter(|t| !t.stale).count()
    }

    pub fn stale_count(&self) -> usize {
        self.targets.iter().filter(|t| t.stale).count()
    }

    pub fn excess_count(&self) -> usize {
        self.excess.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excess.is_empty() && self.targets.is_empty()
    }
}

/// 本地文件与远程文件树的比较器
pub struct FileComparator<'a> {
    tree: &'a RemoteTree,
    relative_to: &'a Path,
    destination: String,
}

impl<'a> FileComparator<'a> {
    pub fn new(tree: &'a RemoteTree, relative_to: &'a Path, destination: &RemoteDestination) -> Self {
        Self {
            tree,
            relative_to,
            destination: destination.display_path(tree),
        }
    }

    /// 本地文件对应的远程显示路径
    pub fn remote_path_for(&self, local: &Path) -> Result<String> {
        let relative = local
            .strip_prefix(self.relative_to)
            .map_err(|_| SyncError::OutsideSource {
                path: local.to_path_buf(),
                root: self.relative_to.to_path_buf(),
            })?;

        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Ok(join_remote(&self.destination, &relative))
    }

    /// 远程缺失或过期的本地文件
    pub fn missing_or_stale(&self, local_files: &[LocalFile]) -> Result<Vec<SyncTarget>> {
        let mut targets = Vec::new();

        for local in local_files {
            let remote_path = self.remote_path_for(&local.path)?;

            match self.tree.find_by_display_path(&remote_path) {
                None => targets.push(SyncTarget {
                    local_path: local.path.clone(),
                    remote_path,
                    stale: false,
                }),
                Some(node) => {
                    // 远程没有时间戳时不认为过期
                    let Some(remote_time) = self.tree.node(node).modified_at else {
                        continue;
                    };
                    if is_stale(local.modified_at, remote_time) {
                        debug!(
                            "文件过期: {} (本地 {}, 远程 {})",
                            remote_path, local.modified_at, remote_time
                        );
                        targets.push(SyncTarget {
                            local_path: local.path.clone(),
                            remote_path,
                            stale: true,
                        });
                    }
                }
            }
        }

        Ok(targets)
    }

    /// 远程存在但本地没有对应文件的文件（显示路径）
    pub fn excess(&self, local_files: &[LocalFile]) -> Result<BTreeSet<String>> {
        let Some(dest_node) = self.tree.find_by_display_path(&self.destination) else {
            debug!("目标目录 {} 不存在，没有多余文件", self.destination);
            return Ok(BTreeSet::new());
        };

        let mut excess: BTreeSet<String> = self
            .tree
            .iter_all(dest_node)
            .filter(|id| !self.tree.node(*id).is_folder())
            .map(|id| self.tree.display_path(id))
            .collect();

        for local in local_files {
            let remote_path = self.remote_path_for(&local.path)?;
            if let Some(node) = self.tree.find_by_display_path(&remote_path) {
                excess.remove(&self.tree.display_path(node));
            }
        }

        Ok(excess)
    }

    pub fn plan(&self, local_files: &[LocalFile]) -> Result<SyncPlan> {
        Ok(SyncPlan {
            excess: self.excess(local_files)?,
            targets: self.missing_or_stale(local_files)?,
        })
    }
}

/// 本地比远程新超过容差才算过期（恰好 60 秒不算）
pub fn is_stale(local: DateTime<Utc>, remote: DateTime<Utc>) -> bool {
    local - remote > Duration::seconds(STALE_TOLERANCE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{NodeKind, RemoteNode};

    const REMOTE_TS: i64 = 1_690_000_000;

    fn remote_time() -> DateTime<Utc> {
        DateTime::from_timestamp(REMOTE_TS, 0).unwrap()
    }

    /// /usb
    ///   prints/ (PRINTS~1)
    ///     benchy.gcode  (BENCHY.GCO, REMOTE_TS)
    ///     cube.gcode    (CUBE.GCO, 无时间戳)
    ///     old.gcode     (OLD.GCO)
    ///     sub/
    ///       deep.gcode
    ///   other.gcode
    fn tree() -> RemoteTree {
        let mut tree =
            RemoteTree::new(RemoteNode::new("USB", NodeKind::Folder).with_display_name("usb"));
        let root = tree.root();
        let prints = tree
            .add_child(
                root,
                RemoteNode::new("PRINTS~1", NodeKind::Folder).with_display_name("prints"),
            )
            .unwrap();
        tree.add_child(
            prints,
            RemoteNode::new("BENCHY.GCO", NodeKind::File)
                .with_display_name("benchy.gcode")
                .with_timestamp(Some(REMOTE_TS)),
        )
        .unwrap();
        tree.add_child(
            prints,
            RemoteNode::new("CUBE.GCO", NodeKind::File).with_display_name("cube.gcode"),
        )
        .unwrap();
        tree.add_child(
            prints,
            RemoteNode::new("OLD.GCO", NodeKind::File)
                .with_display_name("old.gcode")
                .with_timestamp(Some(REMOTE_TS)),
        )
        .unwrap();
        let sub = tree
            .add_child(prints, RemoteNode::new("SUB", NodeKind::Folder).with_display_name("sub"))
            .unwrap();
        tree.add_child(
            sub,
            RemoteNode::new("DEEP.GCO", NodeKind::File)
                .with_display_name("deep.gcode")
                .with_timestamp(Some(REMOTE_TS)),
        )
        .unwrap();
        tree.add_child(
            root,
            RemoteNode::new("OTHER.GCO", NodeKind::File).with_display_name("other.gcode"),
        )
        .unwrap();
        tree
    }

    fn local(name: &str, offset_ms: i64) -> LocalFile {
        LocalFile::new(
            Path::new("/home/maker/gcode").join(name),
            remote_time() + Duration::milliseconds(offset_ms),
        )
    }

    fn prints() -> RemoteDestination {
        RemoteDestination::parse("prints")
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(RemoteDestination::parse(""), RemoteDestination::StorageRoot);
        assert_eq!(RemoteDestination::parse("/"), RemoteDestination::StorageRoot);
        assert_eq!(RemoteDestination::parse(" // "), RemoteDestination::StorageRoot);
        assert_eq!(RemoteDestination::parse("./"), RemoteDestination::StorageRoot);
        assert_eq!(
            RemoteDestination::parse("prints/"),
            RemoteDestination::UnderRoot("prints".to_string())
        );
        assert_eq!(
            RemoteDestination::parse("/usb/prints"),
            RemoteDestination::Absolute("/usb/prints".to_string())
        );

        let tree = tree();
        assert_eq!(RemoteDestination::StorageRoot.display_path(&tree), "/usb");
        assert_eq!(RemoteDestination::parse("/").display_path(&tree), "/usb");
        assert_eq!(prints().display_path(&tree), "/usb/prints");
        assert_eq!(
            RemoteDestination::parse("/usb/prints").display_path(&tree),
            "/usb/prints"
        );
    }

    #[test]
    fn test_remote_path_for() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator = FileComparator::new(&tree, relative_to, &prints());

        assert_eq!(
            comparator
                .remote_path_for(Path::new("/home/maker/gcode/sub/deep.gcode"))
                .unwrap(),
            "/usb/prints/sub/deep.gcode"
        );
        assert!(matches!(
            comparator.remote_path_for(Path::new("/tmp/x.gcode")),
            Err(SyncError::OutsideSource { .. })
        ));
    }

    #[test]
    fn test_stale_boundary() {
        assert!(!is_stale(remote_time() + Duration::seconds(60), remote_time()));
        assert!(is_stale(
            remote_time() + Duration::milliseconds(60_001),
            remote_time()
        ));
        assert!(!is_stale(remote_time() - Duration::seconds(3600), remote_time()));
    }

    #[test]
    fn test_missing_or_stale() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator = FileComparator::new(&tree, relative_to, &prints());

        let files = vec![
            local("benchy.gcode", 60_000),     // 恰好 60 秒，不过期
            local("sub/deep.gcode", 60_001),   // 过期
            local("cube.gcode", 86_400_000),   // 远程无时间戳
            local("new.gcode", 0),             // 缺失
            local("old.gcode", -5_000),        // 本地更旧
        ];

        let targets = comparator.missing_or_stale(&files).unwrap();
        assert_eq!(
            targets,
            vec![
                SyncTarget {
                    local_path: "/home/maker/gcode/sub/deep.gcode".into(),
                    remote_path: "/usb/prints/sub/deep.gcode".to_string(),
                    stale: true,
                },
                SyncTarget {
                    local_path: "/home/maker/gcode/new.gcode".into(),
                    remote_path: "/usb/prints/new.gcode".to_string(),
                    stale: false,
                },
            ]
        );
    }

    #[test]
    fn test_local_files_partition() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator = FileComparator::new(&tree, relative_to, &prints());
        let files = vec![
            local("benchy.gcode", 0),
            local("sub/deep.gcode", 120_000),
            local("new.gcode", 0),
            local("sub/new.gcode", 0),
        ];

        let targets = comparator.missing_or_stale(&files).unwrap();
        let missing = targets.iter().filter(|t| !t.stale).count();
        let stale = targets.iter().filter(|t| t.stale).count();
        let fresh = files
            .iter()
            .filter(|f| !targets.iter().any(|t| t.local_path == f.path))
            .count();

        assert_eq!((missing, stale, fresh), (2, 1, 1));
        assert_eq!(missing + stale + fresh, files.len());
    }

    #[test]
    fn test_excess() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator = FileComparator::new(&tree, relative_to, &prints());
        let files = vec![
            local("benchy.gcode", 0),
            local("cube.gcode", 0),
            local("sub/deep.gcode", 0),
        ];

        let excess = comparator.excess(&files).unwrap();
        // other.gcode 在目标目录之外，不会被删除
        assert_eq!(
            excess,
            BTreeSet::from(["/usb/prints/old.gcode".to_string()])
        );

        for file in &files {
            let remote = comparator.remote_path_for(&file.path).unwrap();
            assert!(!excess.contains(&remote));
        }
    }

    #[test]
    fn test_excess_unknown_destination_is_empty() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let destination = RemoteDestination::parse("does not exist");
        let comparator = FileComparator::new(&tree, relative_to, &destination);

        assert!(comparator.excess(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_excess_at_storage_root() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator =
            FileComparator::new(&tree, relative_to, &RemoteDestination::StorageRoot);
        let files = vec![local("prints/benchy.gcode", 0)];

        let excess = comparator.excess(&files).unwrap();
        assert_eq!(excess.len(), 4);
        assert!(excess.contains("/usb/other.gcode"));
        assert!(!excess.contains("/usb/prints/benchy.gcode"));
    }

    #[test]
    fn test_plan_is_repeatable() {
        let tree = tree();
        let relative_to = Path::new("/home/maker/gcode");
        let comparator = FileComparator::new(&tree, relative_to, &prints());
        let files = vec![local("benchy.gcode", 90_000), local("new.gcode", 0)];

        let first = comparator.plan(&files).unwrap();
        let second = comparator.plan(&files).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.missing_count(), 1);
        assert_eq!(first.stale_count(), 1);
        assert_eq!(first.excess_count(), 3);
    }
}
