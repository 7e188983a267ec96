#![allow(dead_code)]

use dht_harvester::prelude::*;
use dht_harvester::{CrawlStats, DiskBloom, DownloadManager};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

pub const MIB: u64 = 1024 * 1024;

pub fn id(n: u32) -> Identifier {
    let mut bytes = [0u8; 20];
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    Identifier::new(bytes)
}

pub fn peer() -> SocketAddr {
    "192.0.2.1:6881".parse().unwrap()
}

pub fn discovered(n: u32) -> DhtEvent {
    DhtEvent::PeerDiscovered {
        info_hash: id(n),
        addr: peer(),
    }
}

pub fn announced(n: u32) -> DhtEvent {
    DhtEvent::AnnounceReceived {
        info_hash: id(n),
        addr: peer(),
        port: 51413,
    }
}

pub fn keep_metadata(name: &str) -> TorrentMetadata {
    TorrentMetadata {
        name: name.to_string(),
        total_size: 700 * MIB,
        files: vec![
            FileInfo::new(format!("{name}/movie.mkv"), 699 * MIB),
            FileInfo::new(format!("{name}/movie.nfo"), MIB),
        ],
        peer_count: 12,
    }
}

pub fn junk_metadata() -> TorrentMetadata {
    TorrentMetadata {
        name: "sample".into(),
        total_size: 40 * MIB,
        files: vec![FileInfo::new("sample.mp4", 40 * MIB)],
        peer_count: 1,
    }
}

#[derive(Clone)]
pub enum Response {
    Metadata(TorrentMetadata),
    Error,
    /// fetch 的 future 在轮询时 panic
    Panic,
}

// drop 时若未完成则计为一次取消
struct DropProbe {
    cancelled: Arc<AtomicUsize>,
    completed: bool,
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        if !self.completed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct ScriptedFetcher {
    calls: Mutex<Vec<Identifier>>,
    gate: Semaphore,
    gated: bool,
    delay: Option<Duration>,
    responses: Mutex<HashMap<Identifier, Response>>,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            gated: false,
            delay: None,
            responses: Mutex::new(HashMap::new()),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 每次 fetch 都要等 `release` 放行
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn respond(&self, info_hash: Identifier, response: Response) {
        self.responses.lock().unwrap().insert(info_hash, response);
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> Vec<Identifier> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl MetadataFetcher for ScriptedFetcher {
    fn fetch(
        &self,
        info_hash: Identifier,
        _peer: SocketAddr,
    ) -> BoxFuture<'_, Result<TorrentMetadata>> {
        self.calls.lock().unwrap().push(info_hash);

        Box::pin(async move {
            let mut probe = DropProbe {
                cancelled: self.cancelled.clone(),
                completed: false,
            };

            if self.gated {
                let permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| DHTError::Other(e.to_string()))?;
                permit.forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            probe.completed = true;

            let response = self
                .responses
                .lock()
                .unwrap()
                .get(&info_hash)
                .cloned()
                .unwrap_or_else(|| Response::Metadata(keep_metadata("default")));
            match response {
                Response::Metadata(metadata) => Ok(metadata),
                Response::Error => Err(DHTError::Metadata("peer closed connection".into())),
                Response::Panic => panic!("metadata parser crashed on {info_hash}"),
            }
        })
    }
}

pub struct MemorySink {
    records: Mutex<Vec<TorrentRecord>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn records(&self) -> Vec<TorrentRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl StorageSink for MemorySink {
    fn save(&self, record: TorrentRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail {
                return Err(DHTError::Storage("connection refused".into()));
            }
            self.records.lock().unwrap().push(record);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct FakeEngine {
    nodes: Mutex<Vec<RoutingNode>>,
    added: Mutex<Vec<RoutingNode>>,
    lookups: AtomicUsize,
    node_reads: AtomicUsize,
    announces: Mutex<Vec<(Identifier, u16)>>,
    failing: bool,
}

impl FakeEngine {
    pub fn with_nodes(nodes: Vec<RoutingNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn added(&self) -> Vec<RoutingNode> {
        self.added.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn announces(&self) -> Vec<(Identifier, u16)> {
        self.announces.lock().unwrap().clone()
    }

    pub fn node_reads(&self) -> usize {
        self.node_reads.load(Ordering::SeqCst)
    }
}

impl DhtEngine for FakeEngine {
    fn add_node(&self, node: RoutingNode) {
        self.added.lock().unwrap().push(node.clone());
        self.nodes.lock().unwrap().push(node);
    }

    fn lookup(&self, _target: [u8; 20]) -> BoxFuture<'_, Result<Vec<RoutingNode>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.failing {
                return Err(DHTError::Dht("no route".into()));
            }
            Ok(self.nodes.lock().unwrap().clone())
        })
    }

    fn announce(&self, info_hash: Identifier, port: u16) -> BoxFuture<'_, Result<()>> {
        self.announces.lock().unwrap().push((info_hash, port));
        Box::pin(async move {
            if self.failing {
                return Err(DHTError::Dht("no route".into()));
            }
            Ok(())
        })
    }

    fn nodes(&self) -> Vec<RoutingNode> {
        self.node_reads.fetch_add(1, Ordering::SeqCst);
        self.nodes.lock().unwrap().clone()
    }
}

pub fn routing_node(n: u8) -> RoutingNode {
    RoutingNode {
        id: [n; 20],
        host: format!("198.51.100.{n}"),
        port: 6881 + n as u16,
    }
}

/// 轮询直到条件成立；暂停时钟下 sleep 会自动推进虚拟时间
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub struct Harness {
    pub events: mpsc::Sender<DhtEvent>,
    pub stats: Arc<CrawlStats>,
    pub bloom: Arc<DiskBloom>,
    pub shutdown: watch::Sender<bool>,
    pub task: JoinHandle<()>,
    _dir: TempDir,
}

pub fn spawn_manager(
    options: CrawlerOptions,
    fetcher: Arc<ScriptedFetcher>,
    sink: Arc<MemorySink>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let bloom = Arc::new(DiskBloom::new(dir.path().join("bloom.bin"), 1 << 16, 7));
    let stats = Arc::new(CrawlStats::new());
    let (events, event_rx) = mpsc::channel(1024);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let manager = DownloadManager::new(
        event_rx,
        &options,
        fetcher,
        sink,
        bloom.clone(),
        stats.clone(),
    );
    let task = tokio::spawn(manager.run(shutdown_rx));

    Harness {
        events,
        stats,
        bloom,
        shutdown,
        task,
        _dir: dir,
    }
}

pub fn test_options() -> CrawlerOptions {
    CrawlerOptions {
        metadata_timeout: Duration::from_secs(1),
        hot_seeds: Vec::new(),
        ..CrawlerOptions::default()
    }
}
