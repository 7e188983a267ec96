//! 持久化布隆过滤器
//!
//! 记录"已经处理过"的 infohash。内存占用固定为 m 位，与见过的 infohash 数量无关；
//! 只置位、不清位，因此误判只会导致少下载，不会导致错误入库。
//!
//! 文件格式：
//!
//! | 偏移 | 内容 |
//! |---|---|
//! | 0..4 | m，大端 u32 |
//! | 4..8 | k，大端 u32 |
//! | 8.. | 位数组，`ceil(m/32)` 个 32 位字（小端） |
//!
//! 文件长度必须恰好为 `8 + ceil(m/32) * 4`，否则整个文件作废。

use crate::error::Result;
use crate::persist::atomic_write;
use crate::types::Identifier;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER_SIZE: usize = 8;
const MAX_HASHES: u32 = 100;

#[derive(Debug, Error)]
enum LoadError {
    #[error("文件不存在")]
    Missing,

    #[error("读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("文件过短，无法包含头部: {0} 字节")]
    Truncated(usize),

    #[error("m/k 非法: m={m}, k={k}")]
    InvalidHeader { m: u32, k: u32 },

    #[error("文件大小与 m 不匹配: 实际 {actual} 字节, 期望 {expected} 字节")]
    SizeMismatch { actual: usize, expected: usize },
}

pub struct DiskBloom {
    path: PathBuf,
    bits: u32,
    hashes: u32,
    words: RwLock<Vec<u32>>,
}

impl DiskBloom {
    /// 创建一个全零的过滤器（不读写磁盘）
    pub fn new(path: impl Into<PathBuf>, bits: u32, hashes: u32) -> Self {
        let bits = bits.max(1);
        Self {
            path: path.into(),
            bits,
            hashes: hashes.clamp(1, MAX_HASHES),
            words: RwLock::new(vec![0; word_count(bits)]),
        }
    }

    /// 从磁盘恢复；文件缺失或损坏时退回全新过滤器并立即写盘，避免损坏文件反复出现
    ///
    /// 成功加载时 m、k 以文件头为准，`bits`/`hashes` 只用于新建。
    pub fn open(path: impl Into<PathBuf>, bits: u32, hashes: u32) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(bloom) => {
                log::info!(
                    "🌸 布隆过滤器已加载: {} (m={}, k={})",
                    path.display(),
                    bloom.bits,
                    bloom.hashes
                );
                bloom
            }
            Err(reason) => {
                match reason {
                    LoadError::Missing => {
                        log::info!("布隆过滤器文件 {} 不存在，新建过滤器", path.display())
                    }
                    other => log::warn!(
                        "⚠️ 布隆过滤器文件 {} 无效（{}），新建过滤器",
                        path.display(),
                        other
                    ),
                }
                let bloom = Self::new(path, bits, hashes);
                if let Err(e) = bloom.persist() {
                    log::warn!("新建布隆过滤器写盘失败: {}", e);
                }
                bloom
            }
        }
    }

    fn load(path: &Path) -> std::result::Result<Self, LoadError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LoadError::Missing),
            Err(e) => return Err(e.into()),
        };

        if raw.len() < HEADER_SIZE {
            return Err(LoadError::Truncated(raw.len()));
        }

        let m = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let k = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if m == 0 || k == 0 || k > MAX_HASHES {
            return Err(LoadError::InvalidHeader { m, k });
        }

        let expected = HEADER_SIZE + word_count(m) * 4;
        if raw.len() != expected {
            return Err(LoadError::SizeMismatch {
                actual: raw.len(),
                expected,
            });
        }

        let words = raw[HEADER_SIZE..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            bits: m,
            hashes: k,
            words: RwLock::new(words),
        })
    }

    /// false 表示一定没有加入过；true 表示大概率加入过
    pub fn test(&self, info_hash: &Identifier) -> bool {
        let words = self.words.read();
        self.bit_indices(info_hash)
            .all(|idx| words[(idx / 32) as usize] & (1 << (idx % 32)) != 0)
    }

    /// 幂等，最多置 k 位
    pub fn add(&self, info_hash: &Identifier) {
        let indices: Vec<u64> = self.bit_indices(info_hash).collect();
        let mut words = self.words.write();
        for idx in indices {
            words[(idx / 32) as usize] |= 1 << (idx % 32);
        }
    }

    /// 序列化当前快照并原子替换磁盘文件
    ///
    /// 可以与 [`add`](Self::add) 并发调用：编码期间持有读锁，写盘时不持锁。
    pub fn persist(&self) -> Result<()> {
        let bytes = self.encode();
        atomic_write(&self.path, &bytes)?;
        log::debug!(
            "布隆过滤器已保存到 {} ({} 字节)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let words = self.words.read();
        // 内存中的位数组长度错误属于程序缺陷，不是环境问题
        assert_eq!(
            words.len(),
            word_count(self.bits),
            "布隆过滤器位数组长度与 m={} 不一致",
            self.bits
        );

        let mut bytes = Vec::with_capacity(HEADER_SIZE + words.len() * 4);
        bytes.extend_from_slice(&self.bits.to_be_bytes());
        bytes.extend_from_slice(&self.hashes.to_be_bytes());
        for word in words.iter() {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn number_of_bits(&self) -> u32 {
        self.bits
    }

    pub fn number_of_hash_functions(&self) -> u32 {
        self.hashes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // 双重哈希：idx_i = h1 + i * h2 (mod m)，h1/h2 取自 SHA1 摘要，跨平台、跨版本稳定
    fn bit_indices(&self, info_hash: &Identifier) -> impl Iterator<Item = u64> + use<> {
        let digest = Sha1::digest(info_hash.as_bytes());
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&digest[0..8]);
        h2.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_be_bytes(h1);
        let h2 = u64::from_be_bytes(h2) | 1;
        let m = self.bits as u64;

        (0..self.hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }
}

fn word_count(bits: u32) -> usize {
    (bits as usize).div_ceil(32)
}
