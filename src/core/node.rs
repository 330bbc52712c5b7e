//! 远程文件树
//!
//! 节点存放在一个 arena 中，以 `NodeId` 索引。子节点只保存父节点的 id，
//! 路径在每次访问时沿父链重新拼接，不做缓存。

use crate::error::{Result, SyncError};
use crate::transport::FileRecord;
use chrono::{DateTime, Utc};

/// 节点在树中的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    /// 从列表中的 type 字段分类，除 FOLDER 外都视为文件
    pub fn from_type(typ: &str) -> Self {
        if typ == "FOLDER" {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }
}

/// 远程文件或文件夹
#[derive(Debug, Clone)]
pub struct RemoteNode {
    /// 8.3 短文件名
    pub short_name: String,
    pub display_name: Option<String>,
    pub kind: NodeKind,
    pub read_only: bool,
    pub modified_at: Option<DateTime<Utc>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl RemoteNode {
    pub fn new(short_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            short_name: short_name.into(),
            display_name: None,
            kind,
            read_only: false,
            modified_at: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_timestamp(mut self, m_timestamp: Option<i64>) -> Self {
        self.modified_at = timestamp_to_datetime(m_timestamp);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// 从列表记录构造（忽略 children）
    pub fn from_record(record: &FileRecord) -> Self {
        let mut node = Self::new(&record.name, NodeKind::from_type(&record.typ))
            .with_timestamp(record.m_timestamp)
            .read_only(record.ro);
        node.display_name = record.display_name.clone();
        node
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// 显示名，没有时回退到短文件名
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.short_name)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// 0 表示设备没有提供时间戳，而不是 1970-01-01
fn timestamp_to_datetime(m_timestamp: Option<i64>) -> Option<DateTime<Utc>> {
    match m_timestamp {
        None | Some(0) => None,
        Some(secs) => DateTime::from_timestamp(secs, 0),
    }
}

/// 一台设备的远程文件树，只有一个根节点
#[derive(Debug, Clone)]
pub struct RemoteTree {
    nodes: Vec<RemoteNode>,
}

impl RemoteTree {
    pub fn new(mut root: RemoteNode) -> Self {
        root.parent = None;
        root.children.clear();
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &RemoteNode {
        &self.nodes[id.0]
    }

    /// 在 parent 下添加子节点
    pub fn add_child(&mut self, parent: NodeId, mut node: RemoteNode) -> Result<NodeId> {
        let parent_node = &self.nodes[parent.0];
        if !parent_node.is_folder() {
            return Err(SyncError::NotAFolder(self.display_path(parent)));
        }

        // 同一目录下短文件名不区分大小写唯一
        let duplicate = parent_node
            .children
            .iter()
            .any(|c| self.nodes[c.0].short_name.eq_ignore_ascii_case(&node.short_name));
        if duplicate {
            return Err(SyncError::DuplicateName {
                parent: self.display_path(parent),
                name: node.short_name,
            });
        }

        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// 把子节点从父节点移除，返回是否存在
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let children = &mut self.nodes[parent.0].children;
        match children.iter().position(|c| *c == child) {
            Some(index) => {
                children.swap_remove(index);
                self.nodes[child.0].parent = None;
                true
            }
            None => false,
        }
    }

    /// 丢弃根以外的整棵子树
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0].children.clear();
    }

    /// 节点总数（含根）
    pub fn len(&self) -> usize {
        self.iter_all(self.root()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// 由短文件名组成的完整路径
    pub fn short_path(&self, id: NodeId) -> String {
        self.build_path(id, |node| node.short_name.as_str())
    }

    /// 由显示名组成的完整路径
    pub fn display_path(&self, id: NodeId) -> String {
        self.build_path(id, RemoteNode::name)
    }

    fn build_path<F>(&self, id: NodeId, component: F) -> String
    where
        F: Fn(&RemoteNode) -> &str,
    {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            parts.push(component(node));
            current = node.parent;
        }

        let mut path = String::new();
        for part in parts.iter().rev() {
            path.push('/');
            path.push_str(part);
        }
        path
    }

    /// 先序遍历 start 及其所有后代
    pub fn iter_all(&self, start: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![start],
        }
    }
}

/// 先序遍历迭代器
pub struct Descendants<'a> {
    tree: &'a RemoteTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(id).children.iter().rev().copied());
        Some(id)
    }
}
