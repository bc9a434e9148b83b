use async_trait::async_trait;
use haven_core::{StoreError, StoreResult};
use redis::{RedisResult, Script};

// Expiry is set on the first hit only.
const FIXED_WINDOW: &str = r#"
    local count = redis.call("INCR", KEYS[1])
    if count == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return count
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    /// Opens the client lazily; no connection is made until the first command.
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Counts one request against `key`. `Ok(false)` once more than `limit`
    /// requests landed in the current `window_seconds` window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: i64 = Script::new(FIXED_WINDOW)
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(count <= limit)
    }
}

/// Per-key request budget consulted by the HTTP rate-limit middleware.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, key: &str, limit: i64, window_seconds: i64) -> StoreResult<bool>;
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn allow(&self, key: &str, limit: i64, window_seconds: i64) -> StoreResult<bool> {
        self.check_rate_limit(key, limit, window_seconds)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
