pub mod api_middleware;
pub mod limits;
pub mod security;
pub mod validation;

pub use limits::{
    LoginThrottle,
    rate_limiter::{ApiRateLimiter, LoginRateLimiter, RateLimitConfig, RateLimiter},
    redis_limiter::RedisRateLimiter,
};
pub use security::{jwt::JwtService, password::PasswordService};
