use anyhow::{Context, Result};
use std::{env, fs, path::Path, str::FromStr};
use tracing::{debug, info, warn};

use app_error::{AppError, AppErrorExt, AppResult};

use crate::{AppConfig, RedisConfig, SurrealDbConfig};

const SUPPORTED_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];
const ARGON2_VARIANTS: [&str; 3] = ["argon2id", "argon2i", "argon2d"];

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Configuration loaded from file");
        Ok(config)
    }

    /// Configuration compiled into the binary.
    pub fn embedded() -> Self {
        match serde_json::from_str::<AppConfig>(include_str!("../res/app-config.json")) {
            Ok(conf) => conf,
            Err(e) => {
                warn!(
                    "Failed to parse embedded config: {}. Using default configuration.",
                    e
                );
                Self::default()
            }
        }
    }

    /// Embedded defaults or `APP_CONFIG_PATH`, then `.env` and process
    /// environment overrides, then validation.
    pub fn load() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let mut config = match env::var("APP_CONFIG_PATH") {
            Ok(path) => Self::from_file(&path).config_err()?,
            Err(_) => Self::embedded(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;

        info!(environment = %config.environment, "Configuration loaded");
        Ok(config)
    }

    /// Applies environment-style overrides. `lookup` returns the raw value for
    /// a variable name, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APP_ENV") {
            self.environment = v;
        }
        if let Some(v) = get("SECRET_KEY") {
            self.security.jwt.secret = v;
        }
        if let Some(v) = get("ALGORITHM") {
            self.security.jwt.algorithm = v.to_uppercase();
        }
        if let Some(v) = get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.security.jwt.access_token_expire_minutes =
                parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", &v)?;
        }
        if let Some(v) = get("REFRESH_TOKEN_EXPIRE_MINUTES") {
            self.security.jwt.refresh_token_expire_minutes =
                parse_var("REFRESH_TOKEN_EXPIRE_MINUTES", &v)?;
        }
        if let Some(v) = get("DB_ENDPOINT") {
            self.database.endpoint = v;
        }
        if let Some(v) = get("DB_USER") {
            self.database.username = v;
        }
        if let Some(v) = get("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = get("DB_NAMESPACE") {
            self.database.namespace = v;
        }
        if let Some(v) = get("DB_NAME") {
            self.database.database = v;
        }
        if let Some(v) = get("REDIS_URL") {
            match self.redis.as_mut() {
                Some(redis) => redis.url = v,
                None => {
                    self.redis = Some(RedisConfig {
                        url: v,
                        connection_timeout: 5000,
                        prefix: None,
                    })
                }
            }
        }
        if let Some(v) = get("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.monitoring.logging.level = v;
        }
        if let Some(v) = get("ADMIN_USERNAMES") {
            self.security.admin_usernames = v
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("TRUSTED_PROXIES") {
            self.security.trusted_proxies = v
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        let is_production = self.is_production();

        validate_database_config(&self.database, is_production, &mut errors);

        // Server
        if self.server.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }
        if self.server.request_timeout == 0 {
            errors.push("Request timeout must be greater than 0".to_string());
        }

        // JWT
        let jwt = &self.security.jwt;
        if jwt.secret.is_empty() {
            errors.push("JWT secret cannot be empty".to_string());
        } else if is_production
            && (jwt.secret.len() < 32 || jwt.secret.starts_with("default-insecure"))
        {
            errors.push("JWT secret is not secure for production use".to_string());
        }
        if !SUPPORTED_ALGORITHMS.contains(&jwt.algorithm.as_str()) {
            errors.push(format!(
                "Unsupported JWT algorithm '{}', expected one of {}",
                jwt.algorithm,
                SUPPORTED_ALGORITHMS.join(", ")
            ));
        }
        if jwt.access_token_expire_minutes == 0 || jwt.refresh_token_expire_minutes == 0 {
            errors.push("Token lifetimes must be greater than 0".to_string());
        }

        // Rate limiting
        for (name, settings) in [
            ("api", &self.security.rate_limiting.api),
            ("login", &self.security.rate_limiting.login),
        ] {
            if settings.max_attempts == 0 || settings.window_duration == 0 {
                errors.push(format!(
                    "Rate limit '{}' needs non-zero max_attempts and window_duration",
                    name
                ));
            }
        }

        for address in &self.security.trusted_proxies {
            if address.trim().parse::<std::net::IpAddr>().is_err() {
                errors.push(format!("Trusted proxy '{}' is not an IP address", address));
            }
        }

        // Password policy / hashing
        let password = &self.security.password;
        if password.min_length == 0 {
            errors.push("Password min_length must be at least 1".to_string());
        }
        let argon2 = &password.argon2;
        if !ARGON2_VARIANTS.contains(&argon2.variant.as_str()) {
            errors.push(format!("Unknown argon2 variant '{}'", argon2.variant));
        }
        if argon2.iterations == 0 || argon2.parallelism == 0 {
            errors.push("Argon2 iterations and parallelism must be at least 1".to_string());
        } else if argon2.memory < 8 * argon2.parallelism {
            errors.push("Argon2 memory must be at least 8 KiB per lane".to_string());
        }

        // Monitoring
        if !matches!(self.monitoring.logging.format.as_str(), "json" | "plain") {
            errors.push(format!(
                "Unknown logging format '{}', expected 'json' or 'plain'",
                self.monitoring.logging.format
            ));
        }
        if is_production && self.monitoring.sentry.dsn.trim().is_empty() {
            errors.push("Sentry DSN should be configured in production".to_string());
        }

        // Redis
        if let Some(ref redis_config) = self.redis {
            if redis_config.url.trim().is_empty() {
                errors.push("Redis URL cannot be empty".to_string());
            } else if is_production && !redis_config.url.starts_with("rediss://") {
                errors.push(
                    "Production should use a secure 'rediss://' Redis connection".to_string(),
                );
            }
        }

        if !errors.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid configuration: {}",
                errors.join(", ")
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!(
            "Environment variable {} has an invalid value '{}'",
            key,
            value
        ))
    })
}

fn validate_database_config(
    db_config: &SurrealDbConfig,
    is_production: bool,
    errors: &mut Vec<String>,
) {
    let in_memory = db_config.endpoint.starts_with("mem://") || db_config.endpoint == "memory";

    if db_config.endpoint.trim().is_empty() {
        errors.push("Database endpoint cannot be empty".to_string());
    } else if is_production && !db_config.endpoint.starts_with("wss://") && !in_memory {
        errors.push("Production should use a secure 'wss://' database connection".to_string());
    }

    if db_config.namespace.trim().is_empty() {
        errors.push("Database namespace cannot be empty".to_string());
    }
    if db_config.database.trim().is_empty() {
        errors.push("Database name cannot be empty".to_string());
    }

    if is_production && !in_memory {
        if db_config.username == "root" {
            errors.push("Using default 'root' database username in production is insecure".to_string());
        }
        if db_config.password == "root" {
            errors.push("Using default 'root' database password in production is insecure".to_string());
        }
    }
}
