use crate::bloom::DiskBloom;
use crate::engine::{DhtEngine, DhtEvent, MetadataFetcher, StorageSink};
use crate::error::{DHTError, Result};
use crate::liveness::LivenessScheduler;
use crate::routing::RoutingTableStore;
use crate::scheduler::DownloadManager;
use crate::stats::{CrawlStats, StatsSnapshot};
use crate::types::CrawlerOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

/// 爬虫主体：把 DHT 引擎、下载调度、布隆过滤器和路由表持久化组装在一起
///
/// # 生命周期
/// - [`start`](Self::start)：恢复布隆过滤器与路由表，启动下载调度器和所有定时任务
/// - [`events`](Self::events)：交给 DHT 引擎，用于推送发现事件
/// - [`shutdown`](Self::shutdown)：停止所有任务后依次保存布隆过滤器和路由表
///
/// # 示例
/// ```rust,ignore
/// let crawler = Crawler::start(options, engine.clone(), fetcher, sink).await?;
/// engine.set_event_sender(crawler.events());
///
/// tokio::signal::ctrl_c().await?;
/// crawler.shutdown().await?;
/// ```
pub struct Crawler {
    engine: Arc<dyn DhtEngine>,
    bloom: Arc<DiskBloom>,
    routing: RoutingTableStore,
    stats: Arc<CrawlStats>,
    event_tx: mpsc::Sender<DhtEvent>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Crawler {
    pub async fn start(
        options: CrawlerOptions,
        engine: Arc<dyn DhtEngine>,
        fetcher: Arc<dyn MetadataFetcher>,
        sink: Arc<dyn StorageSink>,
    ) -> Result<Self> {
        // 布隆过滤器可能有上百 MB，放到阻塞线程池里读
        let bloom = {
            let path = options.bloom_path.clone();
            let (bits, hashes) = (options.bloom_bits, options.bloom_hashes);
            join_blocking(
                tokio::task::spawn_blocking(move || DiskBloom::open(path, bits, hashes)).await,
            )?
        };
        let bloom = Arc::new(bloom);

        let routing = RoutingTableStore::new(&options.routing_table_path);
        routing.restore(&*engine);

        let stats = Arc::new(CrawlStats::new());
        let (event_tx, event_rx) = mpsc::channel(options.event_queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = DownloadManager::new(
            event_rx,
            &options,
            fetcher,
            sink,
            bloom.clone(),
            stats.clone(),
        )
        .with_engine(engine.clone());

        let mut tasks = vec![
            tokio::spawn(manager.run(shutdown_rx.clone())),
            tokio::spawn(Self::bloom_save_loop(
                bloom.clone(),
                options.bloom_save_interval,
                shutdown_rx.clone(),
            )),
            tokio::spawn(Self::routing_save_loop(
                routing.clone(),
                engine.clone(),
                options.routing_save_interval,
                shutdown_rx.clone(),
            )),
        ];

        let liveness = LivenessScheduler::new(
            engine.clone(),
            options.hot_seeds.clone(),
            options.port,
            options.announce_interval,
            options.walk_interval,
        );
        tasks.extend(liveness.spawn(shutdown_rx));

        log::info!(
            "🚀 爬虫启动：端口={}, 最大并发={}, 超时={:?}",
            options.port,
            options.max_concurrent_downloads,
            options.metadata_timeout
        );

        Ok(Self {
            engine,
            bloom,
            routing,
            stats,
            event_tx,
            shutdown_tx,
            tasks,
        })
    }

    /// 发现事件的发送端
    ///
    /// 通道有界。DHT 引擎应使用 `try_send`，满了就丢弃，不能阻塞收包。
    pub fn events(&self) -> mpsc::Sender<DhtEvent> {
        self.event_tx.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn routing_table_size(&self) -> usize {
        self.engine.nodes().len()
    }

    /// 停止所有定时任务和下载调度器，然后保存布隆过滤器和路由表
    ///
    /// 顺序不可调换：先停任务，保证保存的是最终状态。
    /// 关闭时尚未完成的下载不会被记录，下次启动会重新发现，只是白做了一次。
    /// 两个保存都会尝试，返回第一个错误。
    pub async fn shutdown(self) -> Result<()> {
        log::info!("收到关闭请求，停止所有任务...");
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("任务退出异常: {}", e);
            }
        }

        let bloom = self.bloom.clone();
        let bloom_result =
            join_blocking(tokio::task::spawn_blocking(move || bloom.persist()).await)
                .and_then(|r| r);
        match &bloom_result {
            Ok(()) => log::info!("布隆过滤器已保存到 {}", self.bloom.path().display()),
            Err(e) => log::error!("保存布隆过滤器失败: {}", e),
        }

        let routing_result = self.routing.save(&*self.engine);
        if let Err(e) = &routing_result {
            log::error!("保存路由表失败: {}", e);
        }

        let s = self.stats.snapshot();
        log::info!(
            "爬虫已停止：尝试={}, 入库={}, 失败={}, 忽略={}",
            s.attempted,
            s.saved,
            s.failed,
            s.ignored
        );

        bloom_result.and(routing_result.map(|_| ()))
    }

    async fn bloom_save_loop(
        bloom: Arc<DiskBloom>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let bloom = bloom.clone();
                    let joined = tokio::task::spawn_blocking(move || bloom.persist()).await;
                    match join_blocking(joined).and_then(|r| r) {
                        Ok(()) => {}
                        Err(e) => log::warn!("定时保存布隆过滤器失败: {}", e),
                    }
                }
            }
        }
    }

    async fn routing_save_loop(
        routing: RoutingTableStore,
        engine: Arc<dyn DhtEngine>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if let Err(e) = routing.save(&*engine) {
                        log::warn!("定时保存路由表失败: {}", e);
                    }
                }
            }
        }
    }
}

/// 阻塞任务里的 panic 原样向上抛出（布隆过滤器内部不变量被破坏属于程序缺陷），
/// 只有被取消才转换为错误
fn join_blocking<T>(joined: std::result::Result<T, JoinError>) -> Result<T> {
    match joined {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(DHTError::Other(format!("阻塞任务被取消: {e}"))),
    }
}
