#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use dht_harvester::prelude::*;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tracing_subscriber::EnvFilter;

// 模拟的 DHT 引擎：lookup 偶尔"发现"新节点
#[derive(Default)]
struct SimulatedDht {
    nodes: Mutex<Vec<RoutingNode>>,
}

impl DhtEngine for SimulatedDht {
    fn add_node(&self, node: RoutingNode) {
        if let Ok(mut nodes) = self.nodes.lock() {
            if !nodes.iter().any(|n| n.id == node.id) {
                nodes.push(node);
            }
        }
    }

    fn lookup(&self, target: [u8; 20]) -> BoxFuture<'_, Result<Vec<RoutingNode>>> {
        Box::pin(async move {
            let found = {
                let mut rng = rand::thread_rng();
                rng.gen_bool(0.3).then(|| RoutingNode {
                    id: target,
                    host: format!("203.0.113.{}", rng.gen_range(1..255)),
                    port: rng.gen_range(1024..65535),
                })
            };
            if let Some(node) = found.clone() {
                self.add_node(node);
            }
            Ok(found.into_iter().collect())
        })
    }

    fn announce(&self, _info_hash: Identifier, _port: u16) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn nodes(&self) -> Vec<RoutingNode> {
        self.nodes.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

// 模拟的元数据获取：随机延迟、随机失败、随机文件列表
struct SimulatedFetcher;

impl MetadataFetcher for SimulatedFetcher {
    fn fetch(&self, info_hash: Identifier, _peer: SocketAddr) -> BoxFuture<'_, Result<TorrentMetadata>> {
        Box::pin(async move {
            let (delay_ms, fail, file_count, file_size) = {
                let mut rng = rand::thread_rng();
                (
                    rng.gen_range(50..5000u64),
                    rng.gen_bool(0.2),
                    rng.gen_range(1..8usize),
                    rng.gen_range(1024..2 * 1024 * 1024 * 1024u64),
                )
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if fail {
                return Err(DHTError::Metadata("peer 不支持 ut_metadata".into()));
            }

            let name = format!("sim-{}", &info_hash.to_hex()[..8]);
            let files: Vec<FileInfo> = (0..file_count)
                .map(|i| FileInfo::new(format!("{name}/part{i}.mkv"), file_size / file_count as u64))
                .collect();
            Ok(TorrentMetadata {
                total_size: files.iter().map(|f| f.size).sum(),
                name,
                files,
                peer_count: 1,
            })
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();

    #[cfg(feature = "metrics")]
    {
        let addr: SocketAddr = ([0, 0, 0, 0], 9000).into();
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| DHTError::Other(format!("无法安装 Prometheus 导出器: {e}")))?;
        log::info!("📊 Prometheus metrics 导出器已启动，访问 http://localhost:9000/metrics");
    }

    let options = CrawlerOptions {
        port: 12313,
        max_concurrent_downloads: 200,
        metadata_timeout: Duration::from_secs(3),   // 快速超时，快速失败
        bloom_bits: 1 << 24,
        bloom_path: "data/sim-bloom.bin".into(),
        routing_table_path: "data/sim_routing_table.json".into(),
        stats_interval: Duration::from_secs(10),
        ..Default::default()
    };

    let engine = Arc::new(SimulatedDht::default());
    let sink = Arc::new(JsonlStore::open("data/sim-torrents.jsonl").await?);
    let crawler = Crawler::start(options, engine, Arc::new(SimulatedFetcher), sink).await?;

    // 模拟收包：infohash 从有限的池子里抽取，重复发现会被去重
    let events = crawler.events();
    tokio::spawn(async move {
        loop {
            let event = {
                let mut rng = rand::thread_rng();
                let mut bytes = [0u8; 20];
                bytes[..4].copy_from_slice(&rng.gen_range(0..20_000u32).to_be_bytes());
                DhtEvent::PeerDiscovered {
                    info_hash: Identifier::new(bytes),
                    addr: SocketAddr::from(([198, 51, 100, rng.gen_range(1..255)], 6881)),
                }
            };
            if let Err(TrySendError::Closed(_)) = events.try_send(event) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    let start_time = std::time::Instant::now();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {
                let s = crawler.stats();
                let uptime = start_time.elapsed().as_secs();
                log::info!(
                    "📊 [监控] 时长: {}s | 节点: {} | 尝试: {} 入库: ✨ {} 失败: {} 忽略: {}",
                    uptime,
                    crawler.routing_table_size(),
                    s.attempted,
                    s.saved,
                    s.failed,
                    s.ignored
                );
            }
        }
    }

    log::info!("收到 Ctrl-C，正在关闭爬虫...");
    crawler.shutdown().await
}
