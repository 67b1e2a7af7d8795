use app_config::RateLimitSettings;
use app_error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{LoginThrottle, ceil_secs};

/// Hits inside the current sliding window, plus an optional hard block.
#[derive(Debug, Clone, Default)]
struct RateLimitEntry {
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl RateLimitEntry {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if self.blocked_until.is_some_and(|until| until <= now) {
            self.blocked_until = None;
        }
    }

    fn block_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until.map(|until| until.saturating_duration_since(now))
    }

    fn window_remaining(&self, now: Instant, window: Duration) -> Duration {
        self.hits
            .front()
            .map(|&oldest| (oldest + window).saturating_duration_since(now))
            .unwrap_or_default()
    }

    fn is_idle(&self) -> bool {
        self.hits.is_empty() && self.blocked_until.is_none()
    }
}

/// Generic rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window_duration: Duration,
    pub block_duration: Option<Duration>,
    pub message_template: String,
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings, message_template: impl Into<String>) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window_duration: Duration::from_secs(settings.window_duration),
            block_duration: settings.block_duration.map(Duration::from_secs),
            message_template: message_template.into(),
        }
    }

    fn rejection(&self, retry_after: Duration) -> AppError {
        AppError::RateLimitError(format!(
            "{} Try again in {} seconds.",
            self.message_template,
            ceil_secs(retry_after)
        ))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_duration: Duration::from_secs(300), // 5 minutes
            block_duration: Some(Duration::from_secs(900)), // 15 minutes
            message_template: "Rate limit exceeded.".into(),
        }
    }
}

/// In-process sliding-window limiter with customizable identifier type
#[derive(Debug, Clone)]
pub struct RateLimiter<T: Eq + Hash + Clone + Send + Sync + Debug + 'static> {
    attempts: Arc<RwLock<HashMap<T, RateLimitEntry>>>,
    config: RateLimitConfig,
    cleanup_interval: Duration,
    last_cleanup: Arc<RwLock<Instant>>,
    route_limits: HashMap<String, usize>,
}

impl<T: Eq + Hash + Clone + Send + Sync + Debug + 'static> RateLimiter<T> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            config,
            cleanup_interval: Duration::from_secs(300), // 5 minutes
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
            route_limits: HashMap::new(),
        }
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Keys are `"METHOD /template"` or a bare `"/template"` matching every method.
    pub fn with_route_limits(mut self, route_limits: HashMap<String, usize>) -> Self {
        self.route_limits = route_limits;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Limit for a route template, most specific key first, else the default.
    pub fn get_limit_for_route(&self, method: &str, route: &str) -> usize {
        self.route_limits
            .get(&format!("{} {}", method, route))
            .or_else(|| self.route_limits.get(route))
            .copied()
            .unwrap_or(self.config.max_attempts)
    }

    /// Counts one request against `identifier` and rejects once the window is full.
    pub async fn check_rate_limit(&self, identifier: &T) -> AppResult<()> {
        self.hit(identifier, self.config.max_attempts).await
    }

    pub async fn check_rate_limit_for_route(
        &self,
        identifier: &T,
        method: &str,
        route: &str,
    ) -> AppResult<()> {
        self.hit(identifier, self.get_limit_for_route(method, route))
            .await
    }

    async fn hit(&self, identifier: &T, limit: usize) -> AppResult<()> {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        self.cleanup(&mut attempts, now).await;

        let entry = attempts.entry(identifier.clone()).or_default();
        entry.prune(now, self.config.window_duration);

        if let Some(remaining) = entry.block_remaining(now) {
            return Err(self.config.rejection(remaining));
        }

        if entry.hits.len() >= limit {
            return Err(match self.config.block_duration {
                Some(block) => {
                    entry.blocked_until = Some(now + block);
                    self.config.rejection(block)
                }
                None => self
                    .config
                    .rejection(entry.window_remaining(now, self.config.window_duration)),
            });
        }

        entry.hits.push_back(now);
        Ok(())
    }

    /// Blocks `identifier` once its window is full. The attempt itself was
    /// already counted when `check_rate_limit` admitted it.
    pub async fn record_failed_attempt(&self, identifier: &T) {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();

        let Some(entry) = attempts.get_mut(identifier) else {
            return;
        };
        entry.prune(now, self.config.window_duration);

        if entry.hits.len() >= self.config.max_attempts {
            if let Some(block) = self.config.block_duration {
                entry.blocked_until = Some(now + block);
            }
        }
    }

    /// Record a successful attempt, optionally resetting the counter
    pub async fn record_successful_attempt(&self, identifier: &T, reset: bool) {
        if reset {
            self.attempts.write().await.remove(identifier);
        }
    }

    pub async fn get_limit_status(&self, identifier: &T) -> RateLimitStatus {
        self.status_with_limit(identifier, self.config.max_attempts)
            .await
    }

    pub async fn get_limit_status_for_route(
        &self,
        identifier: &T,
        method: &str,
        route: &str,
    ) -> RateLimitStatus {
        self.status_with_limit(identifier, self.get_limit_for_route(method, route))
            .await
    }

    async fn status_with_limit(&self, identifier: &T, limit: usize) -> RateLimitStatus {
        let attempts = self.attempts.read().await;
        let now = Instant::now();

        let mut entry = attempts.get(identifier).cloned().unwrap_or_default();
        entry.prune(now, self.config.window_duration);

        let block_reset = entry.block_remaining(now).map(ceil_secs);
        RateLimitStatus {
            attempts: entry.hits.len(),
            limit,
            remaining: limit.saturating_sub(entry.hits.len()),
            window_reset: ceil_secs(entry.window_remaining(now, self.config.window_duration)),
            block_reset,
            is_blocked: block_reset.is_some(),
        }
    }

    /// Clean up old entries
    async fn cleanup(&self, attempts: &mut HashMap<T, RateLimitEntry>, now: Instant) {
        let mut last_cleanup = self.last_cleanup.write().await;

        if now.duration_since(*last_cleanup) >= self.cleanup_interval {
            let window = self.config.window_duration;
            attempts.retain(|_, entry| {
                entry.prune(now, window);
                !entry.is_idle()
            });

            *last_cleanup = now;
        }
    }
}

/// Status information about rate limiting for an identifier
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub attempts: usize,
    pub limit: usize,
    pub remaining: usize,
    pub window_reset: u64,        // Seconds until the oldest hit leaves the window
    pub block_reset: Option<u64>, // Seconds until block ends, if blocked
    pub is_blocked: bool,
}

/// Keyed by client address, method and route template.
pub type ApiRateLimiter = RateLimiter<String>;

/// Keyed by client address.
pub type LoginRateLimiter = RateLimiter<String>;

pub fn create_api_rate_limiter(
    settings: &RateLimitSettings,
    route_limits: HashMap<String, usize>,
) -> ApiRateLimiter {
    ApiRateLimiter::new(RateLimitConfig::from_settings(
        settings,
        "API rate limit exceeded.",
    ))
    .with_route_limits(route_limits)
    .with_cleanup_interval(Duration::from_secs(300))
}

/// Login throttling settings shared by the in-process and Redis backends.
pub fn login_limit_config(settings: &RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig::from_settings(settings, "Too many login attempts.")
}

pub fn create_login_rate_limiter(settings: &RateLimitSettings) -> LoginRateLimiter {
    LoginRateLimiter::new(login_limit_config(settings))
        .with_cleanup_interval(Duration::from_secs(300))
}

#[async_trait]
impl LoginThrottle for RateLimiter<String> {
    async fn check(&self, client: &str) -> AppResult<()> {
        self.check_rate_limit(&client.to_string()).await
    }

    async fn record_failure(&self, client: &str) -> AppResult<()> {
        self.record_failed_attempt(&client.to_string()).await;
        Ok(())
    }

    async fn record_success(&self, client: &str) -> AppResult<()> {
        self.record_successful_attempt(&client.to_string(), true)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn config(max_attempts: usize, window_ms: u64, block_ms: Option<u64>) -> RateLimitConfig {
        RateLimitConfig {
            max_attempts,
            window_duration: Duration::from_millis(window_ms),
            block_duration: block_ms.map(Duration::from_millis),
            message_template: "Too many login attempts.".into(),
        }
    }

    #[tokio::test]
    async fn test_api_rate_limiter() {
        let limiter = ApiRateLimiter::new(config(5, 300, None));
        let identifier = "test_client".to_string();

        for _ in 0..5 {
            assert!(limiter.check_rate_limit(&identifier).await.is_ok());
        }
        assert!(limiter.check_rate_limit(&identifier).await.is_err());

        sleep(Duration::from_millis(350)).await;
        assert!(limiter.check_rate_limit(&identifier).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides_instead_of_resetting() {
        let limiter = ApiRateLimiter::new(config(2, 400, None));
        let id = "slider".to_string();

        limiter.check_rate_limit(&id).await.unwrap();
        sleep(Duration::from_millis(250)).await;
        limiter.check_rate_limit(&id).await.unwrap();
        assert!(limiter.check_rate_limit(&id).await.is_err());

        // The first hit has left the window, the second has not
        sleep(Duration::from_millis(200)).await;
        assert!(limiter.check_rate_limit(&id).await.is_ok());
        assert!(limiter.check_rate_limit(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_route_specific_limits() {
        let route_limits = HashMap::from([
            ("POST /roles/".to_string(), 3),
            ("/roles/{role_id}".to_string(), 4),
            ("DELETE /roles/{role_id}".to_string(), 1),
        ]);
        let limiter = ApiRateLimiter::new(config(5, 1000, None)).with_route_limits(route_limits);

        assert_eq!(limiter.get_limit_for_route("POST", "/roles/"), 3);
        assert_eq!(limiter.get_limit_for_route("GET", "/roles/"), 5);
        assert_eq!(limiter.get_limit_for_route("PUT", "/roles/{role_id}"), 4);
        assert_eq!(limiter.get_limit_for_route("DELETE", "/roles/{role_id}"), 1);

        let key = "client:POST /roles/".to_string();
        for _ in 0..3 {
            assert!(limiter
                .check_rate_limit_for_route(&key, "POST", "/roles/")
                .await
                .is_ok());
        }
        assert!(limiter
            .check_rate_limit_for_route(&key, "POST", "/roles/")
            .await
            .is_err());

        let other_key = "client:GET /me".to_string();
        for _ in 0..5 {
            assert!(limiter
                .check_rate_limit_for_route(&other_key, "GET", "/me")
                .await
                .is_ok());
        }
        assert!(limiter
            .check_rate_limit_for_route(&other_key, "GET", "/me")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_login_throttle_blocks_after_failures() {
        let limiter = LoginRateLimiter::new(config(3, 1000, Some(300)));
        let client = "10.0.0.1";

        for _ in 0..3 {
            limiter.check(client).await.unwrap();
            limiter.record_failure(client).await.unwrap();
        }

        match limiter.check(client).await {
            Err(AppError::RateLimitError(msg)) => {
                assert!(msg.contains("Too many login attempts"));
                assert!(msg.contains("Try again in"));
            }
            other => panic!("Expected RateLimitError, got {:?}", other),
        }

        // Other clients are unaffected
        assert!(limiter.check("10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_block_expires() {
        let limiter = LoginRateLimiter::new(config(2, 100, Some(300)));
        let client = "10.0.0.1";

        for _ in 0..2 {
            limiter.check(client).await.unwrap();
            limiter.record_failure(client).await.unwrap();
        }

        // Window has passed but the block has not
        sleep(Duration::from_millis(150)).await;
        assert!(limiter.check(client).await.is_err());

        sleep(Duration::from_millis(200)).await;
        assert!(limiter.check(client).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let limiter = LoginRateLimiter::new(config(3, 1000, Some(1000)));
        let client = "10.0.0.1";

        for _ in 0..2 {
            limiter.check(client).await.unwrap();
            limiter.record_failure(client).await.unwrap();
        }
        limiter.check(client).await.unwrap();
        limiter.record_success(client).await.unwrap();

        for _ in 0..2 {
            limiter.check(client).await.unwrap();
            limiter.record_failure(client).await.unwrap();
        }
        assert!(limiter.check(client).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_reserves_an_attempt() {
        let limiter = LoginRateLimiter::new(config(2, 1000, None));
        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_ok());
        // Outcomes of the first two are still pending
        assert!(limiter.check("10.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_checks_admit_at_most_the_limit() {
        let limiter = LoginRateLimiter::new(config(3, 1000, Some(1000)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("10.0.0.1").await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[tokio::test]
    async fn test_get_limit_status() {
        let limiter = LoginRateLimiter::new(config(3, 2000, Some(5000)));
        let identifier = "status_test".to_string();

        let status = limiter.get_limit_status(&identifier).await;
        assert_eq!(status.limit, 3);
        assert_eq!(status.remaining, 3);
        assert_eq!(status.attempts, 0);
        assert!(!status.is_blocked);

        for _ in 0..2 {
            limiter.check_rate_limit(&identifier).await.unwrap();
        }

        let status = limiter.get_limit_status(&identifier).await;
        assert_eq!(status.attempts, 2);
        assert_eq!(status.remaining, 1);
        assert!(status.window_reset > 0);
        assert!(!status.is_blocked);

        limiter.check_rate_limit(&identifier).await.unwrap();
        assert!(limiter.check_rate_limit(&identifier).await.is_err());

        let status = limiter.get_limit_status(&identifier).await;
        assert_eq!(status.remaining, 0);
        assert!(status.is_blocked);
        assert!(status.block_reset.unwrap() > 0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = RateLimitSettings {
            max_attempts: 5,
            window_duration: 300,
            block_duration: Some(900),
        };
        let config = RateLimitConfig::from_settings(&settings, "msg");
        assert_eq!(config.window_duration, Duration::from_secs(300));
        assert_eq!(config.block_duration, Some(Duration::from_secs(900)));
    }
}
