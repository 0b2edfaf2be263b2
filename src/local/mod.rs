//! In-process rate limiting provider.
//!
//! The local provider keeps limiter state in a [`LocalStore`] inside the current
//! process. It runs the same procedures as the Redis store, with the same results,
//! which makes it a drop-in replacement for tests and single-process deployments.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** procedures are atomic per key ([`DashMap`](dashmap::DashMap) entry locks)
//! - **No external dependencies:** no network or database required
//! - **Process-scoped:** state is not shared across processes
//! - **Injectable clock:** one [`Clock`](crate::Clock) drives both the store and the limiters
//!
//! # Examples
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use tollgate::{LocalStore, ManualClock, RateLimitStore};
//!
//! let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
//! let store = LocalStore::with_clock(Arc::new(clock.clone()));
//!
//! assert!(store.fixed_window_check_and_increment("k:0", 1, 1).unwrap());
//! assert!(!store.fixed_window_check_and_increment("k:0", 1, 1).unwrap());
//!
//! // The counter expires with the store clock.
//! clock.advance(Duration::from_secs(2));
//! assert!(store.fixed_window_check_and_increment("k:0", 1, 1).unwrap());
//! ```

mod local_store;
pub use local_store::*;

mod local_rate_limiter_provider;
pub use local_rate_limiter_provider::*;
