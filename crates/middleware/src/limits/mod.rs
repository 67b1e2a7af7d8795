pub mod rate_limiter;
pub mod redis_limiter;

use app_error::AppResult;
use async_trait::async_trait;

/// Login attempt throttling keyed by client address.
///
/// `check` runs before any credential work. It atomically reserves one
/// attempt in the client's sliding window and fails with
/// `AppError::RateLimitError` when the window is full or the client is
/// blocked, so concurrent attempts can never exceed the limit. A failure
/// keeps its reservation and may start a block; a success clears the window.
#[async_trait]
pub trait LoginThrottle: Send + Sync {
    async fn check(&self, client: &str) -> AppResult<()>;
    async fn record_failure(&self, client: &str) -> AppResult<()>;
    async fn record_success(&self, client: &str) -> AppResult<()>;
}

pub(crate) fn ceil_secs(duration: std::time::Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
