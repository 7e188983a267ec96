use crate::engine::{BoxFuture, StorageSink};
use crate::error::{DHTError, Result};
use crate::types::TorrentRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// 追加写入的 JSON Lines 存储，每行一条 [`TorrentRecord`]
///
/// 不做去重，重复的 infohash 由下游导入时处理。
pub struct JsonlStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &TorrentRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| DHTError::Storage(format!("{}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| DHTError::Storage(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl StorageSink for JsonlStore {
    fn save(&self, record: TorrentRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.append(&record).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileNode, Identifier};

    fn record(n: u8) -> TorrentRecord {
        TorrentRecord {
            info_hash: Identifier::new([n; 20]),
            name: format!("torrent-{n}"),
            total_size: 42 * 1024 * 1024,
            file_tree: vec![FileNode::File("a.bin".into(), 42 * 1024 * 1024)],
            peer_count: 3,
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("torrents.jsonl");

        let store = JsonlStore::open(&path).await.unwrap();
        store.save(record(1)).await.unwrap();
        store.save(record(2)).await.unwrap();
        drop(store);

        // 重新打开后继续追加
        let store = JsonlStore::open(&path).await.unwrap();
        store.save(record(3)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<TorrentRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records, vec![record(1), record(2), record(3)]);
    }
}
