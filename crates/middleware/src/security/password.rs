use app_config::Argon2Config;
use app_error::{AppError, AppResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

const DUMMY_PASSWORD: &str = "timing-equalisation-placeholder";

/// Argon2 hashing with configured parameters. Verification always uses the
/// parameters embedded in the stored PHC string.
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordService {
    pub fn from_config(config: &Argon2Config) -> AppResult<Self> {
        let algorithm = match config.variant.as_str() {
            "argon2id" => Algorithm::Argon2id,
            "argon2i" => Algorithm::Argon2i,
            "argon2d" => Algorithm::Argon2d,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown argon2 variant '{}'",
                    other
                )));
            }
        };

        let params = Params::new(config.memory, config.iterations, config.parallelism, None)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid argon2 parameters: {}", e)))?;

        let mut service = Self {
            argon2: Argon2::new(algorithm, Version::V0x13, params),
            dummy_hash: String::new(),
        };
        service.dummy_hash = service.hash(DUMMY_PASSWORD)?;
        Ok(service)
    }

    pub fn hash(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        debug!("Hashing password");
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {}", e);
                AppError::ServerError(anyhow::anyhow!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// `false` on mismatch and on an unparseable stored hash.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(password_hash) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Stored password hash is not a valid PHC string: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Spends the same work as a real verification when there is no account.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }

    pub async fn hash_blocking(self: &Arc<Self>, password: String) -> AppResult<String> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.hash(&password))
            .await
            .map_err(|e| AppError::ServerError(anyhow::anyhow!("Hashing task failed: {}", e)))?
    }

    /// Verifies on the blocking pool. With no stored hash a dummy verification
    /// runs and the result is `false`.
    pub async fn verify_blocking(
        self: &Arc<Self>,
        password: String,
        password_hash: Option<String>,
    ) -> AppResult<bool> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || match password_hash {
            Some(hash) => service.verify(&password, &hash),
            None => {
                service.verify_dummy(&password);
                false
            }
        })
        .await
        .map_err(|e| AppError::ServerError(anyhow::anyhow!("Verification task failed: {}", e)))
    }
}
