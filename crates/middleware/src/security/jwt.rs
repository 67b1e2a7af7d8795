use app_config::JwtConfig;
use app_error::{AppError, AppResult};
use app_models::{Claims, TokenType, User};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use std::{collections::HashSet, str::FromStr};
use tracing::{debug, warn};
use uuid::Uuid;

/// Issues and validates HMAC-signed access and refresh tokens.
///
/// Validation order is fixed: a token that cannot be decoded is malformed,
/// a decodable token past its `exp` is expired (whatever its signature), and
/// only then is the signature checked.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(
        secret: &[u8],
        algorithm: Algorithm,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> AppResult<Self> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Unsupported JWT algorithm {:?}: only HS256, HS384 and HS512 are allowed",
                algorithm
            )));
        }
        if secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT secret cannot be empty"
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn from_config(config: &JwtConfig) -> AppResult<Self> {
        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unknown JWT algorithm '{}'",
                config.algorithm
            ))
        })?;

        Self::new(
            config.secret.as_bytes(),
            algorithm,
            minutes(config.access_token_expire_minutes)?,
            minutes(config.refresh_token_expire_minutes)?,
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_access_token(&self, user: &User) -> AppResult<String> {
        let (token, _) = self.issue(
            user,
            Some(user.role_id.clone()),
            TokenType::Access,
            self.access_ttl,
        )?;
        Ok(token)
    }

    /// Returns the token together with its `jti`, which becomes the user's
    /// current session id.
    pub fn issue_refresh_token(&self, user: &User) -> AppResult<(String, String)> {
        self.issue(user, None, TokenType::Refresh, self.refresh_ttl)
    }

    fn issue(
        &self,
        user: &User,
        role: Option<String>,
        token_type: TokenType,
        ttl: Duration,
    ) -> AppResult<(String, String)> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id.clone(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: jti.clone(),
            token_type,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::ServerError(anyhow::anyhow!("Failed to sign token: {}", e)))?;

        debug!(subject = %user.username, %token_type, "Token issued");
        Ok((token, jti))
    }

    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        let unverified = self.decode_unverified(token)?;

        if Utc::now().timestamp() > unverified.exp {
            debug!(subject = %unverified.sub, "Token expired");
            return Err(AppError::ExpiredToken);
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        // Expiry was decided above against the same clock
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["sub".to_string(), "exp".to_string()]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    warn!("Token signature rejected");
                    AppError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::MalformedToken(e.to_string()),
            })
    }

    /// Accepts only access tokens; refresh tokens are never bearer credentials.
    pub fn validate_access(&self, token: &str) -> AppResult<Claims> {
        self.validate_type(token, TokenType::Access)
    }

    pub fn validate_refresh(&self, token: &str) -> AppResult<Claims> {
        self.validate_type(token, TokenType::Refresh)
    }

    fn validate_type(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = self.validate(token)?;
        if claims.token_type != expected {
            return Err(AppError::WrongTokenType {
                expected: expected.to_string(),
                found: claims.token_type.to_string(),
            });
        }
        Ok(claims)
    }

    // Structure and claims only, signature untouched.
    fn decode_unverified(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::MalformedToken(e.to_string()))
    }
}

fn minutes(value: u64) -> AppResult<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("Token lifetime of {} minutes is out of range", value))
        })
}
