use thiserror::Error;
use serde::{Deserialize, Serialize};

/// 库级错误，用于存储、配置和命令行路径
#[derive(Error, Debug)]
pub enum QuoteHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Timezone error: {0}")]
    TimezoneError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, QuoteHubError>;

impl From<String> for QuoteHubError {
    fn from(s: String) -> Self {
        QuoteHubError::Unknown(s)
    }
}

impl From<&str> for QuoteHubError {
    fn from(s: &str) -> Self {
        QuoteHubError::Unknown(s.to_string())
    }
}

/// 网络错误分类
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("NO_INTERNET")]
    NoInternet,
    #[error("TIMEOUT")]
    Timeout,
    #[error("BAD_REQUEST")]
    BadRequest,
    #[error("DENIED")]
    Denied,
    #[error("NOT_FOUND")]
    NotFound,
    #[error("THROTTLED")]
    Throttled,
    #[error("SERVER_DOWN")]
    ServerDown,
    #[error("SERIALIZATION")]
    Serialization,
    #[error("UNKNOWN")]
    Unknown,
}

impl NetworkError {
    /// 将HTTP状态码映射为错误分类，成功状态返回None
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(NetworkError::Denied),
            404 => Some(NetworkError::NotFound),
            429 => Some(NetworkError::Throttled),
            400..=499 => Some(NetworkError::BadRequest),
            500..=599 => Some(NetworkError::ServerDown),
            _ => Some(NetworkError::Unknown),
        }
    }
}

impl From<&reqwest::Error> for NetworkError {
    fn from(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else if e.is_connect() {
            NetworkError::NoInternet
        } else if e.is_decode() {
            NetworkError::Serialization
        } else if let Some(status) = e.status() {
            NetworkError::from_status(status.as_u16()).unwrap_or(NetworkError::Unknown)
        } else {
            NetworkError::Unknown
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        NetworkError::from(&e)
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(_: serde_json::Error) -> Self {
        NetworkError::Serialization
    }
}

/// 同步过程对外报告的错误，可克隆以便在合并的等待者之间共享
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DataError {
    pub fn network(&self) -> Option<NetworkError> {
        match self {
            DataError::Network(kind) => Some(*kind),
            DataError::Storage(_) => None,
        }
    }
}

impl From<QuoteHubError> for DataError {
    fn from(e: QuoteHubError) -> Self {
        match e {
            QuoteHubError::RequestError(e) => DataError::Network(NetworkError::from(&e)),
            QuoteHubError::JsonError(_) => DataError::Network(NetworkError::Serialization),
            other => DataError::Storage(other.to_string()),
        }
    }
}
