//! 短路径 / 显示路径 之间的查找与转换

use super::node::{NodeId, RemoteTree};

impl RemoteTree {
    /// 按显示路径查找节点（精确匹配，第一个命中的返回）
    pub fn find_by_display_path(&self, path: &str) -> Option<NodeId> {
        self.iter_all(self.root())
            .find(|id| self.display_path(*id) == path)
    }

    /// 按短路径查找节点
    pub fn find_by_short_path(&self, path: &str) -> Option<NodeId> {
        self.iter_all(self.root())
            .find(|id| self.short_path(*id) == path)
    }

    /// 尽可能用已存在目录的短路径替换显示路径的前缀
    ///
    /// 从最长的父目录开始向上查找，找到已存在的祖先后返回
    /// `祖先短路径 + 剩余部分`；剩余部分保持原样，新目录的短名由设备分配。
    /// 没有任何祖先存在时原样返回。
    pub fn shortest_path(&self, display_path: &str) -> String {
        let mut split_at = display_path.len();
        while let Some(index) = display_path[..split_at].rfind('/') {
            let ancestor = &display_path[..index];
            if !ancestor.is_empty() {
                if let Some(id) = self.find_by_display_path(ancestor) {
                    return format!("{}{}", self.short_path(id), &display_path[index..]);
                }
            }
            split_at = index;
        }
        display_path.to_string()
    }
}

/// 拼接远程路径，忽略空片段
pub fn join_remote(base: &str, tail: &str) -> String {
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        return format!("/{}", tail);
    }
    format!("{}/{}", base.trim_end_matches('/'), tail)
}

/// 远程路径的父目录，根以上返回 None
pub fn parent_of(path: &str) -> Option<&str> {
    let index = path.rfind('/')?;
    if index == 0 {
        None
    } else {
        Some(&path[..index])
    }
}
