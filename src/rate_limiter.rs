//! Top-level entrypoint that wires provider implementations.
//!
//! The `local` provider is always available; the `redis` provider is compiled with the
//! `redis` feature. Both hand out the same limiter types, bound to different stores.

use crate::{LocalRateLimiterOptions, LocalRateLimiterProvider};

#[cfg(feature = "redis")]
use crate::{RedisRateLimiterOptions, RedisRateLimiterProvider};

/// Top-level configuration for [`RateLimiter`].
#[derive(Clone, Debug)]
pub struct RateLimiterOptions {
    /// Options for the local provider.
    pub local: LocalRateLimiterOptions,
    /// Options for the Redis provider.
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    pub redis: RedisRateLimiterOptions,
}

/// Rate limiter entrypoint.
pub struct RateLimiter {
    local: LocalRateLimiterProvider,
    #[cfg(feature = "redis")]
    redis: RedisRateLimiterProvider,
}

impl RateLimiter {
    /// Create a new [`RateLimiter`].
    pub fn new(options: RateLimiterOptions) -> Self {
        Self {
            local: LocalRateLimiterProvider::new(options.local),
            #[cfg(feature = "redis")]
            redis: RedisRateLimiterProvider::new(options.redis),
        }
    }

    /// Access the Redis provider.
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    pub fn redis(&self) -> &RedisRateLimiterProvider {
        &self.redis
    }

    /// Access the local provider.
    pub fn local(&self) -> &LocalRateLimiterProvider {
        &self.local
    }
}
