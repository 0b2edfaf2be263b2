use redis::Script;
use tracing::error;

use crate::{
    PermitsPerSecond, RateLimitStore, TokenBucketState, TollgateError,
    redis::{
        RedisConnectionPool,
        scripts::{
            BUCKET_NOT_FOUND, FIELD_MAX_PERMITS, FIELD_NEXT_FREE_TICKET_MICROS,
            FIELD_STABLE_INTERVAL_MICROS, FIELD_STORED_PERMITS,
            FIXED_WINDOW_CHECK_AND_INCREMENT_SCRIPT, TOKEN_BUCKET_INIT_SCRIPT,
            TOKEN_BUCKET_RESERVE_SCRIPT,
        },
    },
};

/// [`RateLimitStore`] backed by Redis.
///
/// Each procedure is a Lua script sent with `EVALSHA` (falling back to `EVAL` when the
/// script cache is cold), so Redis executes it without interleaving any other command.
/// The token bucket reads time with `TIME`, making the Redis server the only clock
/// involved in accrual.
///
/// # Requirements
///
/// - **Redis version:** >= 5.0 (script effects replication, needed to call `TIME`
///   before writing)
pub struct RedisStore {
    pool: RedisConnectionPool,
    fixed_window_script: Script,
    init_script: Script,
    reserve_script: Script,
}

impl RedisStore {
    /// Create a store over `pool`.
    pub fn new(pool: RedisConnectionPool) -> Self {
        Self {
            pool,
            fixed_window_script: Script::new(FIXED_WINDOW_CHECK_AND_INCREMENT_SCRIPT),
            init_script: Script::new(TOKEN_BUCKET_INIT_SCRIPT),
            reserve_script: Script::new(TOKEN_BUCKET_RESERVE_SCRIPT),
        }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &RedisConnectionPool {
        &self.pool
    }
}

fn parse_field(id: &str, field: &str, value: &str) -> Result<f64, TollgateError> {
    value.parse::<f64>().map_err(|_| {
        TollgateError::UnexpectedScriptResult(format!(
            "field `{field}` of bucket `{id}` is not a number: {value:?}"
        ))
    })
}

impl RateLimitStore for RedisStore {
    fn fixed_window_check_and_increment(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<bool, TollgateError> {
        let result: i64 = self.pool.with_connection(|conn| {
            self.fixed_window_script
                .key(key)
                .arg(limit)
                .arg(ttl_seconds)
                .invoke(conn)
        })?;

        match result {
            1 => Ok(true),
            0 => Ok(false),
            other => {
                error!(key, result = other, "unexpected fixed window script result");
                Err(TollgateError::UnexpectedScriptResult(format!(
                    "fixed window script returned {other}"
                )))
            }
        }
    }

    fn token_bucket_init(
        &self,
        id: &str,
        permits_per_second: PermitsPerSecond,
        ttl_seconds: u64,
    ) -> Result<(), TollgateError> {
        let result: i64 = self.pool.with_connection(|conn| {
            self.init_script
                .key(id)
                .arg(*permits_per_second)
                .arg(ttl_seconds)
                .invoke(conn)
        })?;

        if result != 1 {
            error!(id, result, "unexpected token bucket init script result");
            return Err(TollgateError::UnexpectedScriptResult(format!(
                "token bucket init script returned {result}"
            )));
        }

        Ok(())
    }

    fn token_bucket_reserve(&self, id: &str, permits: u64) -> Result<u64, TollgateError> {
        let result: i64 = self.pool.with_connection(|conn| {
            self.reserve_script.key(id).arg(permits).invoke(conn)
        })?;

        match result {
            BUCKET_NOT_FOUND => Err(TollgateError::LimiterNotFound(id.to_string())),
            wait_micros if wait_micros >= 0 => Ok(wait_micros as u64),
            other => {
                error!(id, result = other, "unexpected token bucket reserve script result");
                Err(TollgateError::UnexpectedScriptResult(format!(
                    "token bucket reserve script returned {other}"
                )))
            }
        }
    }

    fn token_bucket_next_free_ticket_micros(&self, id: &str) -> Result<u64, TollgateError> {
        let value: Option<String> = self.pool.with_connection(|conn| {
            redis::cmd("HGET")
                .arg(id)
                .arg(FIELD_NEXT_FREE_TICKET_MICROS)
                .query(conn)
        })?;

        let Some(value) = value else {
            return Err(TollgateError::LimiterNotFound(id.to_string()));
        };

        Ok(parse_field(id, FIELD_NEXT_FREE_TICKET_MICROS, &value)? as u64)
    }

    fn token_bucket_state(&self, id: &str) -> Result<TokenBucketState, TollgateError> {
        let fields = [
            FIELD_STABLE_INTERVAL_MICROS,
            FIELD_MAX_PERMITS,
            FIELD_STORED_PERMITS,
            FIELD_NEXT_FREE_TICKET_MICROS,
        ];

        let values: Vec<Option<String>> = self.pool.with_connection(|conn| {
            redis::cmd("HMGET").arg(id).arg(&fields[..]).query(conn)
        })?;

        if values.iter().all(Option::is_none) {
            return Err(TollgateError::LimiterNotFound(id.to_string()));
        }

        let mut parsed = [0f64; 4];
        for ((slot, field), value) in parsed.iter_mut().zip(fields).zip(&values) {
            let Some(value) = value else {
                return Err(TollgateError::UnexpectedScriptResult(format!(
                    "bucket `{id}` is missing field `{field}`"
                )));
            };

            *slot = parse_field(id, field, value)?;
        }

        let [
            stable_interval_micros,
            max_permits,
            stored_permits,
            next_free_ticket_micros,
        ] = parsed;

        Ok(TokenBucketState {
            stable_interval_micros,
            max_permits,
            stored_permits,
            next_free_ticket_micros,
        })
    } // end method token_bucket_state

    fn token_bucket_delete(&self, id: &str) -> Result<(), TollgateError> {
        self.pool
            .with_connection(|conn| redis::cmd("DEL").arg(id).query::<()>(conn))
    }
}
