use crate::ClockError;

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum TollgateError {
    /// Redis error.
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The clock could not produce a timestamp.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// Invalid limiter key or key prefix.
    #[error("invalid limiter key: {0}")]
    InvalidLimiterKey(String),

    /// Invalid fixed window limit.
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Invalid fixed window size.
    #[error("invalid window size: {0}")]
    InvalidWindowSize(String),

    /// Invalid token bucket rate.
    #[error("invalid permits per second: {0}")]
    InvalidPermitsPerSecond(String),

    /// Invalid number of requested permits.
    #[error("invalid permits: {0}")]
    InvalidPermits(String),

    /// Invalid Redis connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// The token bucket does not exist in the store (never initialized, destroyed or expired).
    #[error("rate limiter `{0}` not found")]
    LimiterNotFound(String),

    /// An atomic procedure returned a value outside of its contract.
    #[error("unexpected script result: {0}")]
    UnexpectedScriptResult(String),
}
