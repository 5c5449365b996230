use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store commit failed: {0}")]
    StoreCommitError(String),
    #[error("Malformed payment event: {0}")]
    MalformedEvent(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// How an error surfaces to whoever called into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The caller can fix the request and retry.
    ClientError,
    NotFound,
    /// Generic failure; details stay in the logs.
    ServerError,
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        CoreError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::ValidationError(message.into())
    }

    pub fn response_class(&self) -> ResponseClass {
        match self {
            CoreError::ValidationError(_)
            | CoreError::Conflict(_)
            | CoreError::MalformedEvent(_) => ResponseClass::ClientError,
            CoreError::NotFound { .. } => ResponseClass::NotFound,
            _ => ResponseClass::ServerError,
        }
    }

    /// Message safe to hand back to an API client.
    pub fn public_message(&self) -> String {
        match self.response_class() {
            ResponseClass::ServerError => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
