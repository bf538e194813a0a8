/// Error type for store and lock operations.
///
/// Errors returned by compute callbacks never pass through this type; they
/// reach the caller in their own error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A store operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The refresh lock primitive was used incorrectly.
    #[error("refresh lock error for key '{key}': {message}")]
    Lock { key: String, message: String },
}

impl CacheError {
    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new lock error.
    pub fn lock(key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Lock {
            key: key.into(),
            message: message.into(),
        }
    }
}
