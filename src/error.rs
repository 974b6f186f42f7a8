use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("log store serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transmit failed: {0}")]
    Transmit(#[source] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
