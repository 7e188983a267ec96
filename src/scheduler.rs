use crate::bloom::DiskBloom;
use crate::engine::{DhtEngine, DhtEvent, MetadataFetcher, StorageSink};
use crate::error::DHTError;
use crate::junk::{self, JunkReason, Verdict};
use crate::stats::CrawlStats;
use crate::types::{CrawlerOptions, Identifier, TorrentRecord, format_bytes};
use ahash::{AHashMap, AHashSet};
#[cfg(feature = "metrics")]
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

/// 单个 infohash 的终态
#[derive(Debug)]
enum Outcome {
    Stored { name: String, total_size: u64 },
    StoreFailed(DHTError),
    Junk(JunkReason),
    TimedOut,
    FetchFailed(DHTError),
    /// 下载任务没有走到终态就被 drop（panic 展开）
    Abandoned,
}

type DoneSender = mpsc::UnboundedSender<(Identifier, Outcome)>;

/// 保证每个下载任务恰好发回一条完成消息
///
/// 正常结束时由 [`complete`](Self::complete) 发送结果；任务 panic 时 future 被 drop，
/// 由 `Drop` 补发 [`Outcome::Abandoned`]，在途名额照常释放。
/// 调度器退出时 abort 的任务也会补发，但那时接收端已不再处理，消息被直接丢弃。
struct CompletionGuard {
    info_hash: Identifier,
    done_tx: Option<DoneSender>,
}

impl CompletionGuard {
    fn complete(mut self, outcome: Outcome) {
        if let Some(tx) = self.done_tx.take() {
            // 接收端只会在调度器退出后关闭，此时结果已无意义
            let _ = tx.send((self.info_hash, outcome));
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send((self.info_hash, Outcome::Abandoned));
        }
    }
}

/// 正在下载的 infohash 持有的票据
struct DownloadTicket {
    admitted_at: Instant,
    abort: AbortHandle,
}

/// 准入控制的元数据下载调度器
///
/// 所有状态（在途表、计数器、布隆过滤器写入）只在 [`run`](Self::run) 这一个任务里修改：
/// 发现事件和下载完成消息都汇入同一个 `select!` 循环，处理函数内部没有 `.await`，
/// 所以"检查在途表"和"登记在途"之间不可能插入另一个事件，不会重复准入。
///
/// 每个准入的 infohash 启动一个下载任务，任务结束时恰好发回一条完成消息，
/// 在途名额也只在处理这条消息时释放一次。
pub struct DownloadManager {
    event_rx: mpsc::Receiver<DhtEvent>,
    done_tx: DoneSender,
    done_rx: mpsc::UnboundedReceiver<(Identifier, Outcome)>,
    in_flight: AHashMap<Identifier, DownloadTicket>,
    hot_seeds: AHashSet<Identifier>,
    max_concurrent: usize,
    metadata_timeout: Duration,
    stats_interval: Duration,
    fetcher: Arc<dyn MetadataFetcher>,
    sink: Arc<dyn StorageSink>,
    bloom: Arc<DiskBloom>,
    stats: Arc<CrawlStats>,
    engine: Option<Arc<dyn DhtEngine>>,
}

impl DownloadManager {
    pub fn new(
        event_rx: mpsc::Receiver<DhtEvent>,
        options: &CrawlerOptions,
        fetcher: Arc<dyn MetadataFetcher>,
        sink: Arc<dyn StorageSink>,
        bloom: Arc<DiskBloom>,
        stats: Arc<CrawlStats>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            event_rx,
            done_tx,
            done_rx,
            in_flight: AHashMap::with_capacity(options.max_concurrent_downloads),
            hot_seeds: options.hot_seeds.iter().copied().collect(),
            max_concurrent: options.max_concurrent_downloads,
            metadata_timeout: options.metadata_timeout,
            stats_interval: options.stats_interval,
            fetcher,
            sink,
            bloom,
            stats,
            engine: None,
        }
    }

    /// 统计日志里附带该引擎的路由表大小
    pub fn with_engine(mut self, engine: Arc<dyn DhtEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 事件循环，直到 `shutdown` 变化（或其发送端被 drop）
    ///
    /// 事件通道关闭后会继续等待在途下载全部结束再退出；
    /// 收到关闭信号时直接中止所有在途下载，这些 infohash 不计数也不写入布隆过滤器。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut stats_interval = tokio::time::interval(self.stats_interval);
        stats_interval.tick().await;

        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                Some((info_hash, outcome)) = self.done_rx.recv() => {
                    self.finish(info_hash, outcome);
                    if !events_open && self.in_flight.is_empty() {
                        break;
                    }
                }

                event = self.event_rx.recv(), if events_open => {
                    match event {
                        Some(event) => self.admit(event),
                        None => {
                            events_open = false;
                            if self.in_flight.is_empty() {
                                break;
                            }
                        }
                    }
                }

                _ = stats_interval.tick() => self.print_stats(),
            }
        }

        self.abort_all();
        log::debug!("下载调度器退出");
    }

    fn admit(&mut self, event: DhtEvent) {
        self.stats.record_received();
        let info_hash = event.info_hash();

        // 顺序固定：名额 -> 在途/白名单 -> 布隆过滤器
        if self.in_flight.len() >= self.max_concurrent {
            self.stats.record_rejected_busy();
            return;
        }
        if self.in_flight.contains_key(&info_hash) || self.hot_seeds.contains(&info_hash) {
            self.stats.record_rejected_duplicate();
            return;
        }
        if self.bloom.test(&info_hash) {
            self.stats.record_rejected_seen();
            return;
        }

        self.stats.record_attempted();
        #[cfg(feature = "metrics")]
        counter!("dht_harvest_attempts_total").increment(1);

        let handle = tokio::spawn(Self::process_hash(
            info_hash,
            event.peer_addr(),
            self.fetcher.clone(),
            self.sink.clone(),
            self.metadata_timeout,
            self.done_tx.clone(),
        ));

        self.in_flight.insert(
            info_hash,
            DownloadTicket {
                admitted_at: Instant::now(),
                abort: handle.abort_handle(),
            },
        );
        self.stats.set_active(self.in_flight.len());
        log::trace!("开始获取元数据: {} <- {}", info_hash, event.peer_addr());
    }

    async fn process_hash(
        info_hash: Identifier,
        peer_addr: SocketAddr,
        fetcher: Arc<dyn MetadataFetcher>,
        sink: Arc<dyn StorageSink>,
        timeout: Duration,
        done_tx: DoneSender,
    ) {
        let guard = CompletionGuard {
            info_hash,
            done_tx: Some(done_tx),
        };
        let outcome = Self::download(info_hash, peer_addr, &*fetcher, &*sink, timeout).await;
        guard.complete(outcome);
    }

    async fn download(
        info_hash: Identifier,
        peer_addr: SocketAddr,
        fetcher: &dyn MetadataFetcher,
        sink: &dyn StorageSink,
        timeout: Duration,
    ) -> Outcome {
        // 超时与元数据到达只有一个分支胜出；落败分支的 future 随 select! 一起 drop，
        // 对获取来说就是取消，对定时器来说就是清除。同一轮同时就绪时元数据优先。
        let fetched = tokio::select! {
            biased;
            result = fetcher.fetch(info_hash, peer_addr) => result,
            _ = tokio::time::sleep(timeout) => return Outcome::TimedOut,
        };

        let metadata = match fetched {
            Ok(metadata) => metadata,
            Err(e) => return Outcome::FetchFailed(e),
        };

        if let Verdict::Junk(reason) = junk::classify(&metadata.files) {
            return Outcome::Junk(reason);
        }

        let record = TorrentRecord::from_metadata(info_hash, &metadata);
        let (name, total_size) = (record.name.clone(), record.total_size);
        match sink.save(record).await {
            Ok(()) => Outcome::Stored { name, total_size },
            Err(e) => Outcome::StoreFailed(e),
        }
    }

    fn finish(&mut self, info_hash: Identifier, outcome: Outcome) {
        let Some(ticket) = self.in_flight.remove(&info_hash) else {
            log::warn!("收到未登记的完成消息: {}", info_hash);
            return;
        };
        self.stats.set_active(self.in_flight.len());
        let elapsed = ticket.admitted_at.elapsed();

        match outcome {
            Outcome::Stored { name, total_size } => {
                self.bloom.add(&info_hash);
                self.stats.record_saved();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_saved_total").increment(1);
                log::debug!(
                    "✨ 入库: {} {} [{}] ({:?})",
                    info_hash,
                    name,
                    format_bytes(total_size),
                    elapsed
                );
            }
            Outcome::StoreFailed(e) => {
                // 存储失败也写入布隆过滤器：每个 infohash 最多尝试一次，不对故障存储反复重试
                self.bloom.add(&info_hash);
                self.stats.record_failed();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_failed_total", "reason" => "storage").increment(1);
                log::warn!("保存元数据失败: {}: {}", info_hash, e);
            }
            Outcome::Junk(reason) => {
                self.bloom.add(&info_hash);
                self.stats.record_ignored();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_ignored_total").increment(1);
                log::trace!("忽略垃圾种子: {} ({:?})", info_hash, reason);
            }
            Outcome::TimedOut => {
                self.stats.record_failed();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_failed_total", "reason" => "timeout").increment(1);
                log::trace!("获取元数据超时: {} ({:?})", info_hash, elapsed);
            }
            Outcome::FetchFailed(e) => {
                self.stats.record_failed();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_failed_total", "reason" => "fetch").increment(1);
                log::trace!("获取元数据失败: {}: {}", info_hash, e);
            }
            Outcome::Abandoned => {
                // 不写布隆过滤器：异常与获取失败同等对待，之后仍可重新发现
                self.stats.record_failed();
                #[cfg(feature = "metrics")]
                counter!("dht_harvest_failed_total", "reason" => "panic").increment(1);
                log::error!("下载任务异常退出: {}", info_hash);
            }
        }
    }

    fn abort_all(&mut self) {
        if !self.in_flight.is_empty() {
            log::info!("中止 {} 个在途下载", self.in_flight.len());
        }
        for (_, ticket) in self.in_flight.drain() {
            ticket.abort.abort();
        }
        self.stats.set_active(0);
    }

    fn print_stats(&self) {
        let s = self.stats.snapshot();
        let pressure = if self.max_concurrent > 0 {
            s.active as f64 / self.max_concurrent as f64 * 100.0
        } else {
            100.0
        };
        let nodes = self
            .engine
            .as_ref()
            .map_or_else(|| "-".to_string(), |e| e.nodes().len().to_string());

        if pressure > 80.0 {
            log::warn!(
                "⚠️ 下载名额高压：节点={}, 在途={}/{}({:.1}%), 尝试={}, 入库={}, 失败={}, 忽略={}, 拒绝={}",
                nodes,
                s.active,
                self.max_concurrent,
                pressure,
                s.attempted,
                s.saved,
                s.failed,
                s.ignored,
                s.rejected()
            );
        } else {
            log::info!(
                "📊 下载统计：节点={}, 在途={}/{}({:.1}%), 尝试={}, 入库={}, 失败={}, 忽略={}, 拒绝={}",
                nodes,
                s.active,
                self.max_concurrent,
                pressure,
                s.attempted,
                s.saved,
                s.failed,
                s.ignored,
                s.rejected()
            );
        }
    }
}
