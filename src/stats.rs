use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 进程生命周期内的计数器，只有下载调度器写入
///
/// 仅用于观测，不参与任何正确性判断。
#[derive(Debug, Default)]
pub struct CrawlStats {
    received: AtomicU64,
    attempted: AtomicU64,
    saved: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
    rejected_busy: AtomicU64,
    rejected_duplicate: AtomicU64,
    rejected_seen: AtomicU64,
    active: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub attempted: u64,
    pub saved: u64,
    pub failed: u64,
    pub ignored: u64,
    pub rejected_busy: u64,
    pub rejected_duplicate: u64,
    pub rejected_seen: u64,
    pub active: usize,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            attempted: self.attempted.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            rejected_busy: self.rejected_busy.load(Ordering::Relaxed),
            rejected_duplicate: self.rejected_duplicate.load(Ordering::Relaxed),
            rejected_seen: self.rejected_seen.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempted(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_busy(&self) {
        self.rejected_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_duplicate(&self) {
        self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_seen(&self) {
        self.rejected_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_active(&self, active: usize) {
        self.active.store(active, Ordering::Relaxed);
    }
}

impl StatsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.rejected_busy + self.rejected_duplicate + self.rejected_seen
    }
}
