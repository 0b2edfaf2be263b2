//! Lua procedures executed atomically by Redis.
//!
//! Hash fields are stored under their camelCase names so buckets stay readable from
//! `redis-cli` and from other clients of the same keys.

pub(crate) const FIELD_NEXT_FREE_TICKET_MICROS: &str = "nextFreeTicketMicros";
pub(crate) const FIELD_STABLE_INTERVAL_MICROS: &str = "stableIntervalMicros";
pub(crate) const FIELD_MAX_PERMITS: &str = "maxPermits";
pub(crate) const FIELD_STORED_PERMITS: &str = "storedPermits";

/// Returned by the reserve procedure when the bucket does not exist.
pub(crate) const BUCKET_NOT_FOUND: i64 = -1;

pub(crate) const FIXED_WINDOW_CHECK_AND_INCREMENT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local ttl = tonumber(ARGV[2])

    local current = tonumber(redis.call("GET", key) or "0")

    if current + 1 > limit then
        return 0
    end

    redis.call("INCRBY", key, 1)
    redis.call("EXPIRE", key, ttl)

    return 1
"#;

pub(crate) const TOKEN_BUCKET_INIT_SCRIPT: &str = r#"
    local permits_per_second = tonumber(ARGV[1])
    local ttl = tonumber(ARGV[2])

    local stable_interval_micros = 1000000 / permits_per_second

    redis.call("HSET", KEYS[1],
        "stableIntervalMicros", stable_interval_micros,
        "maxPermits", permits_per_second,
        "storedPermits", permits_per_second,
        "nextFreeTicketMicros", 0)
    redis.call("EXPIRE", KEYS[1], ttl)

    return 1
"#;

pub(crate) const TOKEN_BUCKET_RESERVE_SCRIPT: &str = r#"
    local state = redis.call("HMGET", KEYS[1], "nextFreeTicketMicros", "stableIntervalMicros", "maxPermits", "storedPermits")

    local next_free_ticket_micros = tonumber(state[1])
    local stable_interval_micros = tonumber(state[2])
    local max_permits = tonumber(state[3])
    local stored_permits = tonumber(state[4])

    if next_free_ticket_micros == nil or stable_interval_micros == nil or max_permits == nil or stored_permits == nil then
        return -1
    end

    local required_permits = tonumber(ARGV[1]) or 1

    local time_array = redis.call("TIME")
    local now_micros = tonumber(time_array[1]) * 1000000 + tonumber(time_array[2])

    -- accrue permits for the idle time
    if now_micros > next_free_ticket_micros then
        local new_permits = (now_micros - next_free_ticket_micros) / stable_interval_micros
        stored_permits = math.min(max_permits, stored_permits + new_permits)
        next_free_ticket_micros = now_micros
    end

    local old_next_free_ticket_micros = next_free_ticket_micros

    local stored_permits_to_spend = math.min(required_permits, stored_permits)
    local fresh_permits = required_permits - stored_permits_to_spend
    local wait_micros = fresh_permits * stable_interval_micros

    next_free_ticket_micros = next_free_ticket_micros + wait_micros
    stored_permits = stored_permits - stored_permits_to_spend

    redis.call("HSET", KEYS[1],
        "storedPermits", stored_permits,
        "nextFreeTicketMicros", next_free_ticket_micros)

    return math.floor(math.max(old_next_free_ticket_micros - now_micros, 0))
"#;
