use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("store operation timed out")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("unsupported rule document format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
