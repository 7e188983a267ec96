use crate::error::DHTError;
use crate::seeds::DEFAULT_HOT_SEEDS;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 20 字节的 infohash，全局去重键
///
/// 规范形式为 40 位小写十六进制；解析时也接受磁力链接中常见的 32 位 base32 形式。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; 20]);

impl Identifier {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 20]> for Identifier {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Identifier {
    type Err = DHTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.len() {
            40 => {
                let mut bytes = [0u8; 20];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| DHTError::InvalidIdentifier(s.to_string()))?;
                Ok(Self(bytes))
            }
            32 => decode_base32(s)
                .map(Self)
                .ok_or_else(|| DHTError::InvalidIdentifier(s.to_string())),
            _ => Err(DHTError::InvalidIdentifier(s.to_string())),
        }
    }
}

// RFC 4648 字母表，大小写不敏感，无填充
fn decode_base32(s: &str) -> Option<[u8; 20]> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    let mut idx = 0;

    for ch in s.bytes() {
        let value = match ch {
            b'A'..=b'Z' => ch - b'A',
            b'a'..=b'z' => ch - b'a',
            b'2'..=b'7' => ch - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            if idx >= out.len() {
                return None;
            }
            out[idx] = (buffer >> bits) as u8;
            idx += 1;
            buffer &= (1u64 << bits) - 1;
        }
    }

    (idx == out.len()).then_some(out)
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 文件信息（扁平列表中的一项，路径以 `/` 分隔）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self { path: path.into(), size }
    }

    /// 路径最后一段，即文件名
    pub fn name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
    }
}

/// 文件树节点
///
/// 序列化为紧凑数组：文件 `[name, size]`，目录 `[name, [children...]]`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileNode {
    File(String, u64),
    Dir(String, Vec<FileNode>),
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::File(name, _) | FileNode::Dir(name, _) => name,
        }
    }
}

/// 将扁平文件列表转换为目录树，保持插入顺序
pub fn build_file_tree(files: &[FileInfo]) -> Vec<FileNode> {
    let mut root = Vec::new();

    for file in files {
        let normalized = file.path.replace('\\', "/");
        let parts: Vec<&str> = normalized.split('/').collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            continue;
        };

        let mut level = &mut root;
        for dir in dirs {
            level = child_dir(level, dir);
        }
        level.push(FileNode::File(file_name.to_string(), file.size));
    }

    root
}

fn child_dir<'a>(level: &'a mut Vec<FileNode>, name: &str) -> &'a mut Vec<FileNode> {
    let pos = match level
        .iter()
        .position(|node| matches!(node, FileNode::Dir(dir, _) if dir == name))
    {
        Some(pos) => pos,
        None => {
            level.push(FileNode::Dir(name.to_string(), Vec::new()));
            level.len() - 1
        }
    };

    match &mut level[pos] {
        FileNode::Dir(_, children) => children,
        FileNode::File(..) => unreachable!("position 只匹配目录节点"),
    }
}

/// 元数据获取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    pub name: String,
    pub total_size: u64,
    pub files: Vec<FileInfo>,
    pub peer_count: u32,
}

/// 入库记录，一次构建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentRecord {
    #[serde(rename = "infohash")]
    pub info_hash: Identifier,
    pub name: String,
    #[serde(rename = "size")]
    pub total_size: u64,
    #[serde(rename = "files")]
    pub file_tree: Vec<FileNode>,
    #[serde(rename = "peers")]
    pub peer_count: u32,
}

impl TorrentRecord {
    pub fn from_metadata(info_hash: Identifier, metadata: &TorrentMetadata) -> Self {
        Self {
            info_hash,
            name: metadata.name.clone(),
            total_size: metadata.total_size,
            file_tree: build_file_tree(&metadata.files),
            peer_count: metadata.peer_count,
        }
    }
}

/// 路由表节点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingNode {
    pub id: [u8; 20],
    pub host: String,
    pub port: u16,
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 爬虫配置
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// 本地 DHT 端口（宣布热门种子时使用）
    pub port: u16,

    /// 同时进行的元数据获取上限（背压）
    pub max_concurrent_downloads: usize,

    /// 元数据获取超时
    pub metadata_timeout: Duration,

    /// 发现事件通道容量
    pub event_queue_size: usize,

    /// 布隆过滤器文件
    pub bloom_path: PathBuf,

    /// 位数组大小 m
    pub bloom_bits: u32,

    /// 哈希函数个数 k
    pub bloom_hashes: u32,

    pub bloom_save_interval: Duration,

    /// 路由表 JSON 文件
    pub routing_table_path: PathBuf,

    pub routing_save_interval: Duration,

    /// 随机宣布热门种子的间隔
    pub announce_interval: Duration,

    /// 随机 lookup 漫步间隔
    pub walk_interval: Duration,

    /// 统计日志间隔
    pub stats_interval: Duration,

    /// 热门种子：既是准入白名单（不下载），也是定时宣布的候选
    pub hot_seeds: Vec<Identifier>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            port: 19001,
            max_concurrent_downloads: 200,
            metadata_timeout: Duration::from_secs(30),
            event_queue_size: 10000,
            bloom_path: PathBuf::from("data/bloom.bin"),
            bloom_bits: 1 << 30,
            bloom_hashes: 7,
            bloom_save_interval: Duration::from_secs(5 * 60),
            routing_table_path: PathBuf::from("data/dht_routing_table.json"),
            routing_save_interval: Duration::from_secs(60),
            announce_interval: Duration::from_secs(60),
            walk_interval: Duration::from_secs(1),
            stats_interval: Duration::from_secs(60),
            hot_seeds: DEFAULT_HOT_SEEDS
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
        }
    }
}
