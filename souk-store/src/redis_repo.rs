use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};

const RATE_LIMIT_PREFIX: &str = "souk:ratelimit";

/// Shared multiplexed connection, cloned per request.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> RedisResult<Self> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    /// Fixed-window counter per caller. The window starts at the first hit;
    /// returns `false` once `caller` exceeded `limit` hits inside it.
    pub async fn check_rate_limit(&self, caller: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let key = rate_limit_key(caller);
        let mut conn = self.conn.clone();

        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: bool = conn.expire(&key, window_seconds).await?;
        }

        Ok(count <= limit)
    }
}

fn rate_limit_key(caller: &str) -> String {
    format!("{}:{}", RATE_LIMIT_PREFIX, caller)
}
