use crate::engine::DhtEngine;
use crate::types::Identifier;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 保活调度：定时宣布热门种子、定时随机 lookup
///
/// 两个定时器互相独立，失败只记日志，不影响下载流程。
pub struct LivenessScheduler {
    engine: Arc<dyn DhtEngine>,
    hot_seeds: Vec<Identifier>,
    port: u16,
    announce_interval: Duration,
    walk_interval: Duration,
}

impl LivenessScheduler {
    pub fn new(
        engine: Arc<dyn DhtEngine>,
        hot_seeds: Vec<Identifier>,
        port: u16,
        announce_interval: Duration,
        walk_interval: Duration,
    ) -> Self {
        Self {
            engine,
            hot_seeds,
            port,
            announce_interval,
            walk_interval,
        }
    }

    /// 启动两个定时任务，`shutdown` 变化后退出
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let announcer = tokio::spawn(Self::announce_loop(
            self.engine.clone(),
            self.hot_seeds,
            self.port,
            self.announce_interval,
            shutdown.clone(),
        ));
        let walker = tokio::spawn(Self::walk_loop(
            self.engine,
            self.walk_interval,
            shutdown,
        ));
        vec![announcer, walker]
    }

    async fn announce_loop(
        engine: Arc<dyn DhtEngine>,
        hot_seeds: Vec<Identifier>,
        port: u16,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if hot_seeds.is_empty() {
            log::debug!("热门种子列表为空，不启动定时宣布");
            return;
        }

        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let Some(info_hash) = hot_seeds.choose(&mut rand::thread_rng()).copied() else {
                        continue;
                    };
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        match engine.announce(info_hash, port).await {
                            Ok(()) => log::trace!("DHT 宣布成功: {}", info_hash),
                            Err(e) => log::debug!("DHT 宣布 {} 失败: {}", info_hash, e),
                        }
                    });
                }
            }
        }
    }

    async fn walk_loop(
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
                    let target: [u8; 20] = rand::thread_rng().r#gen();
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        match engine.lookup(target).await {
                            Ok(nodes) => log::trace!("随机 lookup 返回 {} 个节点", nodes.len()),
                            Err(e) => log::trace!("随机 lookup 失败: {}", e),
                        }
                    });
                }
            }
        }
    }
}
