use app_config::RedisConfig;
use app_error::{AppError, AppErrorExt, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use redis::{Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{LoginThrottle, ceil_secs, rate_limiter::RateLimitConfig};

/// Login throttle shared by every instance through Redis.
///
/// Each client has a sorted set of attempt timestamps (milliseconds) trimmed
/// to the window on every write, and a block key whose TTL is the remaining
/// block time. `check` adds its attempt inside the same MULTI that counts the
/// set, so instances racing on one client see distinct counts.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    prefix: String,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    pub async fn connect(redis_config: &RedisConfig, config: RateLimitConfig) -> AppResult<Self> {
        let client = Client::open(redis_config.url.as_str()).cache_err()?;

        let conn = tokio::time::timeout(
            Duration::from_millis(redis_config.connection_timeout),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| {
            AppError::CacheError(anyhow::anyhow!(
                "Timed out connecting to Redis after {} ms",
                redis_config.connection_timeout
            ))
        })?
        .cache_err()?;

        info!("Connected to Redis for login throttling");

        Ok(Self {
            conn,
            prefix: redis_config.prefix.clone().unwrap_or_else(|| "app".to_string()),
            config,
        })
    }

    fn attempts_key(&self, client: &str) -> String {
        attempts_key(&self.prefix, client)
    }

    fn block_key(&self, client: &str) -> String {
        block_key(&self.prefix, client)
    }

    fn window_ms(&self) -> i64 {
        self.config.window_duration.as_millis() as i64
    }

    fn rejection(&self, retry_after: Duration) -> AppError {
        warn!(retry_after_secs = ceil_secs(retry_after), "Login throttled");
        AppError::RateLimitError(format!(
            "{} Try again in {} seconds.",
            self.config.message_template,
            ceil_secs(retry_after)
        ))
    }
}

fn attempts_key(prefix: &str, client: &str) -> String {
    format!("{}:login:attempts:{}", prefix, client)
}

fn block_key(prefix: &str, client: &str) -> String {
    format!("{}:login:block:{}", prefix, client)
}

#[async_trait]
impl LoginThrottle for RedisRateLimiter {
    async fn check(&self, client: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let attempts_key = self.attempts_key(client);
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());

        // Trim, reserve and count in one transaction
        let (block_ttl_ms, hits, oldest): (i64, usize, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("PTTL")
            .arg(self.block_key(client))
            .cmd("ZREMRANGEBYSCORE")
            .arg(&attempts_key)
            .arg("-inf")
            .arg(now_ms - self.window_ms())
            .ignore()
            .cmd("ZADD")
            .arg(&attempts_key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("ZCARD")
            .arg(&attempts_key)
            .cmd("PEXPIRE")
            .arg(&attempts_key)
            .arg(self.window_ms())
            .ignore()
            .cmd("ZRANGE")
            .arg(&attempts_key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .cache_err()?;

        if block_ttl_ms <= 0 && hits <= self.config.max_attempts {
            return Ok(());
        }

        let _: () = redis::cmd("ZREM")
            .arg(&attempts_key)
            .arg(&member)
            .query_async(&mut conn)
            .await
            .cache_err()?;

        if block_ttl_ms > 0 {
            return Err(self.rejection(Duration::from_millis(block_ttl_ms as u64)));
        }

        let retry_ms = oldest
            .first()
            .map(|(_, score)| (*score as i64 + self.window_ms() - now_ms).max(0))
            .unwrap_or(0);
        Err(self.rejection(Duration::from_millis(retry_ms as u64)))
    }

    async fn record_failure(&self, client: &str) -> AppResult<()> {
        let Some(block) = self.config.block_duration else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let attempts_key = self.attempts_key(client);

        let (hits,): (usize,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&attempts_key)
            .arg("-inf")
            .arg(now_ms - self.window_ms())
            .ignore()
            .cmd("ZCARD")
            .arg(&attempts_key)
            .query_async(&mut conn)
            .await
            .cache_err()?;

        if hits >= self.config.max_attempts {
            let _: () = redis::cmd("SET")
                .arg(self.block_key(client))
                .arg(1)
                .arg("PX")
                .arg(block.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .cache_err()?;
            warn!(client, "Client blocked after repeated login failures");
        }

        Ok(())
    }

    async fn record_success(&self, client: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.attempts_key(client))
            .arg(self.block_key(client))
            .query_async(&mut conn)
            .await
            .cache_err()?;
        Ok(())
    }
}
