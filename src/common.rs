use std::{fmt, ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::TollgateError;

/// Lifetime of a token bucket record in the store, refreshed on every init (360 days).
pub const TOKEN_BUCKET_TTL_SECONDS: u64 = 360 * 24 * 3600;

/// A validated store key, used both as a fixed window key prefix and as a token bucket id.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons (the fixed window appends `:<window index>`)
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct LimiterKey(Arc<str>);

impl LimiterKey {
    /// Default key prefix for fixed window counters.
    pub fn default_fixed_window_prefix() -> Self {
        Self(Arc::from("tollgate_fixed_window"))
    }

    /// Default id for a smooth bursty token bucket.
    pub fn default_smooth_bursty_id() -> Self {
        Self(Arc::from("tollgate_smooth_bursty"))
    }
}

impl Deref for LimiterKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LimiterKey {
    type Error = TollgateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(TollgateError::InvalidLimiterKey(
                "Limiter key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(TollgateError::InvalidLimiterKey(
                "Limiter key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(TollgateError::InvalidLimiterKey(
                "Limiter key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for LimiterKey {
    type Error = TollgateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Maximum number of admissions per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u64")]
pub struct RateLimit(u64);

impl Default for RateLimit {
    /// Returns a limit of 1000.
    fn default() -> Self {
        Self(1000)
    }
}

impl Deref for RateLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RateLimit {
    type Error = TollgateError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(TollgateError::InvalidRateLimit(
                "Rate limit must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Length of a fixed window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u64")]
pub struct WindowSizeMs(u64);

impl WindowSizeMs {
    /// The window as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Expiry applied to the counter of a window of this size.
    ///
    /// See [`window_ttl_seconds`].
    pub fn ttl_seconds(&self) -> u64 {
        window_ttl_seconds(self.0 / 1000)
    }
}

impl Default for WindowSizeMs {
    /// Returns a window of one second.
    fn default() -> Self {
        Self(1000)
    }
}

impl Deref for WindowSizeMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSizeMs {
    type Error = TollgateError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(TollgateError::InvalidWindowSize(
                "Window size must be at least 1ms".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<Duration> for WindowSizeMs {
    type Error = TollgateError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::try_from(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Steady refill rate of a token bucket. Also its burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Deserialize)]
#[serde(try_from = "f64")]
pub struct PermitsPerSecond(f64);

impl PermitsPerSecond {
    /// Microseconds between two permits at the steady rate.
    pub fn stable_interval_micros(&self) -> f64 {
        1_000_000f64 / self.0
    }
}

impl Default for PermitsPerSecond {
    /// Returns a rate of 1000 permits per second.
    fn default() -> Self {
        Self(1000f64)
    }
}

impl Deref for PermitsPerSecond {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for PermitsPerSecond {
    type Error = TollgateError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value <= 0f64 {
            Err(TollgateError::InvalidPermitsPerSecond(
                "Permits per second must be a finite number greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Number of permits requested from a token bucket in one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Permits(u64);

impl Permits {
    /// A single permit.
    pub fn one() -> Self {
        Self(1)
    }
}

impl Deref for Permits {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Permits {
    type Error = TollgateError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(TollgateError::InvalidPermits(
                "Requested permits must be positive".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Expiry, in seconds, of a fixed window counter for a window of `window_seconds`.
///
/// The counter must outlive its window by a margin so that clock skew between
/// clients cannot resurrect a fresh count for a window still in use:
/// - under one second: 1
/// - up to ten seconds: twice the window
/// - above ten seconds: the window plus ten
pub fn window_ttl_seconds(window_seconds: u64) -> u64 {
    const THRESHOLD: u64 = 10;

    if window_seconds < 1 {
        return 1;
    }

    if window_seconds <= THRESHOLD {
        return window_seconds << 1;
    }

    window_seconds + THRESHOLD
}

/// Index of the window containing `now_ms`.
#[inline]
pub(crate) fn window_index(now_ms: u64, window_ms: u64) -> u64 {
    now_ms / window_ms
}

/// Start of the window following the one containing `now_ms`.
///
/// Saturates at `u64::MAX` when the next window lies beyond the representable range.
#[inline]
pub(crate) fn next_window_begin_ms(now_ms: u64, window_ms: u64) -> u64 {
    window_index(now_ms, window_ms)
        .saturating_add(1)
        .saturating_mul(window_ms)
}
