//! Application configuration.
//!
//! Defaults are embedded from `res/app-config.json`, optionally replaced by a
//! JSON file named in `APP_CONFIG_PATH`, then individual values are overridden
//! from the environment (`.env` is honoured). See [`AppConfig::load`].

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

mod config_loader;
pub use config_loader::*;

/// Complete application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub database: SurrealDbConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub monitoring: MonitoringConfig,
    pub redis: Option<RedisConfig>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct SurrealDbConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl fmt::Debug for SurrealDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrealDbConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds before an in-flight request is aborted.
    pub request_timeout: u64,
    pub body_limit: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecurityConfig {
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub rate_limiting: RateLimitingConfig,
    pub password: PasswordConfig,
    /// Existing accounts promoted to the admin role at startup.
    #[serde(default)]
    pub admin_usernames: Vec<String>,
    /// Peer addresses whose `X-Forwarded-For` / `X-Real-IP` headers are
    /// believed. Empty means clients are identified by socket address only.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    pub access_token_expire_minutes: u64,
    pub refresh_token_expire_minutes: u64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_minutes", &self.refresh_token_expire_minutes)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitingConfig {
    /// Applied per client, method and route template.
    pub api: RateLimitSettings,
    /// Applied per client to failed logins.
    pub login: RateLimitSettings,
    /// Overrides of `api.max_attempts`, keyed `"METHOD /template"` or
    /// `"/template"` using the router's templates (`/roles/{role_id}`).
    #[serde(default)]
    pub paths: HashMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub max_attempts: usize,
    /// Seconds.
    pub window_duration: u64,
    /// Seconds. `None` means the client is only limited until the window slides.
    pub block_duration: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub argon2: Argon2Config,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Argon2Config {
    pub variant: String,
    /// KiB
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    pub sentry: SentryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SentryConfig {
    pub dsn: String,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `plain`
    pub format: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Milliseconds.
    pub connection_timeout: u64,
    pub prefix: Option<String>,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Self-contained profile: in-memory database, no Redis, no Sentry.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: SurrealDbConfig {
                endpoint: "mem://".to_string(),
                username: "root".to_string(),
                password: "root".to_string(),
                namespace: "auth".to_string(),
                database: "users".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                request_timeout: 30,
                body_limit: 1048576, // 1MB
            },
            security: SecurityConfig {
                jwt: JwtConfig {
                    secret: "default-insecure-jwt-secret-do-not-use-in-production".to_string(),
                    algorithm: "HS256".to_string(),
                    access_token_expire_minutes: 30,
                    refresh_token_expire_minutes: 60 * 24 * 7,
                },
                cors: CorsConfig {
                    allowed_origins: vec!["*".to_string()],
                    allowed_methods: vec![
                        "GET".to_string(),
                        "POST".to_string(),
                        "PUT".to_string(),
                        "DELETE".to_string(),
                        "OPTIONS".to_string(),
                    ],
                    allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
                },
                rate_limiting: RateLimitingConfig {
                    api: RateLimitSettings {
                        max_attempts: 20,
                        window_duration: 60,
                        block_duration: None,
                    },
                    login: RateLimitSettings {
                        max_attempts: 5,
                        window_duration: 300,
                        block_duration: Some(900),
                    },
                    paths: HashMap::from([
                        ("POST /roles/".to_string(), 5),
                        ("GET /roles/{role_id}".to_string(), 20),
                        ("PUT /roles/{role_id}".to_string(), 5),
                        ("DELETE /roles/{role_id}".to_string(), 5),
                    ]),
                },
                password: PasswordConfig {
                    min_length: 6,
                    require_uppercase: true,
                    require_lowercase: true,
                    require_number: true,
                    require_special: true,
                    argon2: Argon2Config {
                        variant: "argon2id".to_string(),
                        memory: 19456,
                        iterations: 2,
                        parallelism: 1,
                    },
                },
                admin_usernames: Vec::new(),
                trusted_proxies: Vec::new(),
            },
            monitoring: MonitoringConfig {
                sentry: SentryConfig {
                    dsn: "".to_string(),
                    sample_rate: 1.0,
                    traces_sample_rate: 0.2,
                    environment: "development".to_string(),
                },
                logging: LoggingConfig {
                    level: "info".to_string(),
                    format: "plain".to_string(),
                },
            },
            redis: None,
        }
    }
}
