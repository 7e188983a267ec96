mod error;
mod persist;
pub mod types;
pub mod seeds;
pub mod engine;
pub mod bloom;  // 持久化布隆过滤器
pub mod junk;  // 垃圾种子判定
pub mod stats;
pub mod scheduler;  // 准入控制的下载调度器
pub mod routing;  // 路由表持久化
pub mod liveness;
pub mod store;
mod crawler;

pub use error::{DHTError, Result};
pub use types::{CrawlerOptions, FileInfo, FileNode, Identifier, RoutingNode, TorrentMetadata, TorrentRecord};
pub use engine::{BoxFuture, DhtEngine, DhtEvent, MetadataFetcher, StorageSink};
pub use bloom::DiskBloom;
pub use junk::{classify, Verdict};
pub use stats::{CrawlStats, StatsSnapshot};
pub use scheduler::DownloadManager;
pub use routing::RoutingTableStore;
pub use liveness::LivenessScheduler;
pub use store::JsonlStore;
pub use crawler::Crawler;

// 重新导出常用类型
pub mod prelude {
    pub use crate::error::{DHTError, Result};
    pub use crate::crawler::Crawler;
    pub use crate::engine::{BoxFuture, DhtEngine, DhtEvent, MetadataFetcher, StorageSink};
    pub use crate::types::{CrawlerOptions, FileInfo, Identifier, RoutingNode, TorrentMetadata, TorrentRecord};
    pub use crate::store::JsonlStore;
}
