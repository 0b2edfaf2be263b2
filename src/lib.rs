#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod rate_limiter;
pub use rate_limiter::*;

mod local;
pub use local::*;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::*;

mod error;
pub use error::*;

mod clock;
pub use clock::{Clock, ClockError, ManualClock, SystemClock};

mod common;
pub use common::{
    LimiterKey, Permits, PermitsPerSecond, RateLimit, TOKEN_BUCKET_TTL_SECONDS, WindowSizeMs,
    window_ttl_seconds,
};

mod sleep;
pub use sleep::sleep_uninterruptibly;

mod store;
pub use store::{RateLimitStore, TokenBucketState};

mod fixed_window_rate_limiter;
pub use fixed_window_rate_limiter::*;

mod smooth_bursty_rate_limiter;
pub use smooth_bursty_rate_limiter::*;

#[cfg(test)]
mod tests;
