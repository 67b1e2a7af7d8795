use app_authentication::{AuthService, RoleService};
use app_config::AppConfig;
use app_database::{Database, SurrealRoleStore, SurrealUserStore};
use app_error::{AppError, AppResult};
use app_middleware::{
    ApiRateLimiter, JwtService, LoginThrottle, PasswordService, RedisRateLimiter,
    api_middleware::TrustedProxies,
    limits::rate_limiter::{create_api_rate_limiter, create_login_rate_limiter, login_limit_config},
};
use app_models::ADMIN_ROLE;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the handlers share. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub roles: Arc<RoleService>,
    pub jwt: Arc<JwtService>,
    pub db: Arc<Database>,
    pub api_limiter: Arc<ApiRateLimiter>,
    pub proxies: TrustedProxies,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: Arc<Database>,
        jwt: Arc<JwtService>,
        throttle: Arc<dyn LoginThrottle>,
    ) -> AppResult<Self> {
        let users = Arc::new(SurrealUserStore::new(Arc::clone(&db)));
        let role_store = Arc::new(SurrealRoleStore::new(Arc::clone(&db)));
        let passwords = Arc::new(PasswordService::from_config(
            &config.security.password.argon2,
        )?);

        let auth = AuthService::new(
            users.clone(),
            role_store.clone(),
            Arc::clone(&jwt),
            passwords,
            config.security.password.clone(),
        )
        .with_throttle(throttle);
        let roles = RoleService::new(role_store, users);

        let limits = &config.security.rate_limiting;
        let api_limiter = create_api_rate_limiter(&limits.api, limits.paths.clone());
        let proxies = TrustedProxies::from_config(&config.security.trusted_proxies)?;

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            roles: Arc::new(roles),
            jwt,
            db,
            api_limiter: Arc::new(api_limiter),
            proxies,
        })
    }

    /// Builds the token service and login throttle from configuration.
    pub async fn initialize(config: AppConfig, db: Arc<Database>) -> AppResult<Self> {
        let jwt = Arc::new(JwtService::from_config(&config.security.jwt)?);
        let throttle = login_throttle(&config).await?;
        Self::new(config, db, jwt, throttle)
    }

    /// Seeds default roles and promotes the configured admin accounts.
    pub async fn bootstrap(&self) -> AppResult<()> {
        self.roles.ensure_default_roles().await?;

        for username in &self.config.security.admin_usernames {
            match self.roles.assign_role(username, ADMIN_ROLE).await {
                Ok(_) => info!(username = %username, "Admin role ensured"),
                Err(AppError::NotFoundError(_)) => {
                    warn!(username = %username, "Configured admin account does not exist")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Redis when configured. Outside production an unreachable Redis degrades
/// to per-process throttling.
async fn login_throttle(config: &AppConfig) -> AppResult<Arc<dyn LoginThrottle>> {
    let settings = &config.security.rate_limiting.login;

    if let Some(redis) = &config.redis {
        match RedisRateLimiter::connect(redis, login_limit_config(settings)).await {
            Ok(limiter) => return Ok(Arc::new(limiter)),
            Err(e) if config.is_production() => return Err(e),
            Err(e) => warn!("Redis unavailable, using in-process login throttling: {}", e),
        }
    }

    Ok(Arc::new(create_login_rate_limiter(settings)))
}
