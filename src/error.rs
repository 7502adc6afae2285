/// Error returned by a [`CounterStore`](crate::CounterStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The handle does not name a procedure registered with this store.
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),

    /// The procedure replied with something other than what its contract promises.
    #[error("unexpected procedure reply: {0}")]
    UnexpectedReply(String),

    /// Failure reported by a non-Redis backend.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Invalid limit, window or other construction-time setting.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Invalid key prefix or client identity.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The store could not be reached or the procedures could not be registered
    /// while constructing the dispatcher.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A per-request store call failed.
    #[error("counter store operation failed: {0}")]
    StoreOperation(#[source] StoreError),
}
