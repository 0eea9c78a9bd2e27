use std::time::Duration;

/// Failures talking to the key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its deadline. Its effect is unknown.
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// An error reported by the Redis client.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be decoded.
    #[error("Corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key holds a value of a different kind (string vs set vs list).
    #[error("Wrong value type at key {0}")]
    WrongType(String),

    /// `create_store` was handed a URL scheme it does not know.
    #[error("Unsupported store URL: {0}")]
    UnsupportedUrl(String),
}

impl StoreError {
    /// Whether retrying later might succeed.
    ///
    /// Connection-level failures and timeouts are transient; data and
    /// configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_cluster_error()
            }
            Self::Corrupt { .. }
            | Self::Serialization(_)
            | Self::WrongType(_)
            | Self::UnsupportedUrl(_) => false,
        }
    }
}
