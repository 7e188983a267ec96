//! 路由表持久化
//!
//! 把 DHT 引擎的节点列表以 JSON 数组保存，重启后重新喂给引擎，省去冷启动引导。
//! 文件格式 `[{"host": "1.2.3.4", "port": 6881, "id": "<40 位十六进制>"}, ...]`，
//! 每次整体重写。

use crate::engine::DhtEngine;
use crate::error::Result;
use crate::persist::atomic_write;
use crate::types::RoutingNode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct SavedNode<'a> {
    host: &'a str,
    port: u16,
    id: String,
}

// 读取时所有字段都可能缺失，缺字段的条目直接丢弃
#[derive(Deserialize)]
struct LoadedNode {
    host: Option<String>,
    port: Option<u64>,
    id: Option<String>,
}

impl LoadedNode {
    fn into_node(self) -> Option<RoutingNode> {
        let host = self.host.filter(|h| !h.is_empty())?;
        let port = self
            .port
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p != 0)?;
        let mut id = [0u8; 20];
        hex::decode_to_slice(self.id?, &mut id).ok()?;
        Some(RoutingNode { id, host, port })
    }
}

#[derive(Debug, Clone)]
pub struct RoutingTableStore {
    path: PathBuf,
}

impl RoutingTableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存引擎当前的路由表快照，返回写入的节点数
    pub fn save(&self, engine: &dyn DhtEngine) -> Result<usize> {
        let nodes = engine.nodes();
        self.save_nodes(&nodes)?;
        log::info!(
            "💾 路由表已保存到 {}，包含 {} 个节点",
            self.path.display(),
            nodes.len()
        );
        Ok(nodes.len())
    }

    pub fn save_nodes(&self, nodes: &[RoutingNode]) -> Result<()> {
        let saved: Vec<SavedNode<'_>> = nodes
            .iter()
            .map(|n| SavedNode {
                host: &n.host,
                port: n.port,
                id: hex::encode(n.id),
            })
            .collect();
        let json = serde_json::to_vec_pretty(&saved)?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }

    /// 读取保存的节点；文件缺失或解析失败时返回空列表（冷启动），不向上报错
    pub fn load(&self) -> Vec<RoutingNode> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("路由表文件 {} 不存在，将从头引导", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                log::warn!("读取路由表 {} 失败: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let loaded: Vec<LoadedNode> = match serde_json::from_slice(&data) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("解析路由表 {} 失败: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        loaded.into_iter().filter_map(LoadedNode::into_node).collect()
    }

    /// 读取并逐个插入引擎，返回插入的节点数
    pub fn restore(&self, engine: &dyn DhtEngine) -> usize {
        let nodes = self.load();
        let count = nodes.len();
        for node in nodes {
            engine.add_node(node);
        }
        if count > 0 {
            log::info!(
                "从 {} 恢复了 {} 个路由表节点",
                self.path.display(),
                count
            );
        }
        count
    }
}
