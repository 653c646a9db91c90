//! Cache error types

use redis::RedisError;

/// Boxed error returned by origin implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cache-related errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BoxError),

    #[error("Durable store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
