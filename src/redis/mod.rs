mod redis_rate_limiter_provider;
pub use redis_rate_limiter_provider::*;

mod redis_store;
pub use redis_store::*;

mod common;
pub use common::*;

mod scripts;
