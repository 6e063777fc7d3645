/// Errors raised by the recommendation engine and its data sources.
#[derive(thiserror::Error, Debug)]
pub enum RecError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timed out: {0}")]
    Timeout(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecError {
    /// Code reported in the response envelope. Only caller arguments map to
    /// 400; configuration problems are server faults.
    pub fn status_code(&self) -> u16 {
        match self {
            RecError::InvalidInput(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecError>;
