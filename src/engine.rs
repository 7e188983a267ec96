//! 外部协作者的接口边界
//!
//! DHT 协议引擎、元数据交换（ut_metadata）以及持久化存储都不在本 crate 内实现，
//! 这里只约定它们暴露给下载流程的最小接口。

use crate::error::Result;
use crate::types::{Identifier, RoutingNode, TorrentMetadata, TorrentRecord};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// DHT 引擎发出的发现事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtEvent {
    /// get_peers 响应中带回了某个 infohash 的 peer
    PeerDiscovered {
        info_hash: Identifier,
        addr: SocketAddr,
    },

    /// 收到 announce_peer，`port` 为对方宣布的下载端口
    AnnounceReceived {
        info_hash: Identifier,
        addr: SocketAddr,
        port: u16,
    },
}

impl DhtEvent {
    pub fn info_hash(&self) -> Identifier {
        match self {
            DhtEvent::PeerDiscovered { info_hash, .. }
            | DhtEvent::AnnounceReceived { info_hash, .. } => *info_hash,
        }
    }

    /// 获取元数据时应连接的 peer 地址
    pub fn peer_addr(&self) -> SocketAddr {
        match *self {
            DhtEvent::PeerDiscovered { addr, .. } => addr,
            DhtEvent::AnnounceReceived { addr, port, .. } if port != 0 => {
                SocketAddr::new(addr.ip(), port)
            }
            DhtEvent::AnnounceReceived { addr, .. } => addr,
        }
    }
}

/// DHT 协议引擎
///
/// 发现事件通过 [`crate::Crawler::events`] 返回的通道推送进来；
/// 引擎应使用 `try_send`，通道满时直接丢弃，不能阻塞 UDP 收包。
pub trait DhtEngine: Send + Sync + 'static {
    /// 向路由表插入节点
    fn add_node(&self, node: RoutingNode);

    /// 以 `target` 为目标做一次迭代查找
    fn lookup(&self, target: [u8; 20]) -> BoxFuture<'_, Result<Vec<RoutingNode>>>;

    /// 宣布本节点在 `port` 上持有 `info_hash`
    fn announce(&self, info_hash: Identifier, port: u16) -> BoxFuture<'_, Result<()>>;

    /// 当前路由表快照
    fn nodes(&self) -> Vec<RoutingNode>;
}

/// 元数据获取
///
/// 返回的 future 只会产生一次结果。drop 该 future 即视为取消：
/// 实现方必须在 drop 时放弃连接并释放资源。
pub trait MetadataFetcher: Send + Sync + 'static {
    fn fetch(&self, info_hash: Identifier, peer: SocketAddr)
    -> BoxFuture<'_, Result<TorrentMetadata>>;
}

/// 持久化存储
pub trait StorageSink: Send + Sync + 'static {
    fn save(&self, record: TorrentRecord) -> BoxFuture<'_, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_uses_announced_port() {
        let event = DhtEvent::AnnounceReceived {
            info_hash: Identifier::new([0; 20]),
            addr: "10.0.0.1:6881".parse().unwrap(),
            port: 51413,
        };
        assert_eq!(event.peer_addr(), "10.0.0.1:51413".parse().unwrap());

        let implied = DhtEvent::AnnounceReceived {
            info_hash: Identifier::new([0; 20]),
            addr: "10.0.0.1:6881".parse().unwrap(),
            port: 0,
        };
        assert_eq!(implied.peer_addr(), "10.0.0.1:6881".parse().unwrap());
    }
}
