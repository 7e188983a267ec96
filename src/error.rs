use thiserror::Error;

#[derive(Error, Debug)]
pub enum DHTError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("无效的 infohash: {0}")]
    InvalidIdentifier(String),

    #[error("元数据获取失败: {0}")]
    Metadata(String),

    #[error("存储失败: {0}")]
    Storage(String),

    #[error("DHT 错误: {0}")]
    Dht(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DHTError>;
