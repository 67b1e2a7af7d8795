use app_config::PasswordConfig;
use app_database::{RoleStore, UserStore};
use app_error::{AppError, AppResult, resource_exists_error};
use app_middleware::{
    JwtService, LoginThrottle, PasswordService,
    validation::{sanitize_string, validate_email, validate_password, validate_username},
};
use app_models::{
    Claims, DEFAULT_ROLE, LoginInput, RegisterInput, TokenPair, UpdateProfileInput, User,
    UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait AuthServiceTrait: Send + Sync {
    async fn register(&self, input: RegisterInput) -> AppResult<UserProfile>;

    /// `client` is the address the login throttle is keyed on.
    async fn login(&self, input: LoginInput, client: &str) -> AppResult<TokenPair>;

    /// Exchanges a refresh token for a new pair, revoking the old one.
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair>;

    async fn current_user(&self, claims: &Claims) -> AppResult<UserProfile>;

    async fn update_profile(
        &self,
        claims: &Claims,
        input: UpdateProfileInput,
    ) -> AppResult<UserProfile>;

    fn jwt_service(&self) -> Arc<JwtService>;
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    jwt_service: Arc<JwtService>,
    passwords: Arc<PasswordService>,
    password_policy: PasswordConfig,
    throttle: Option<Arc<dyn LoginThrottle>>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        jwt_service: Arc<JwtService>,
        passwords: Arc<PasswordService>,
        password_policy: PasswordConfig,
    ) -> Self {
        Self {
            users,
            roles,
            jwt_service,
            passwords,
            password_policy,
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn LoginThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Issues a token pair and makes the new refresh token the only one
    /// accepted for this user. With `replacing`, the swap only succeeds while
    /// that session is still the stored one.
    async fn start_session(&self, user: &User, replacing: Option<&str>) -> AppResult<TokenPair> {
        let access_token = self.jwt_service.issue_access_token(user)?;
        let (refresh_token, jti) = self.jwt_service.issue_refresh_token(user)?;

        if !self.users.set_session(&user.id, replacing, Some(jti.as_str())).await? {
            warn!(user_id = %user.id, "Session changed while rotating");
            return Err(AppError::RevokedToken);
        }

        Ok(TokenPair::bearer(access_token, refresh_token))
    }

    /// The account a token was issued to, provided it is still active and
    /// still carries the username the token names.
    async fn token_owner(&self, claims: &Claims) -> AppResult<Option<User>> {
        Ok(self
            .users
            .find_by_id(&claims.uid)
            .await?
            .filter(|user| user.is_active && user.username == claims.sub))
    }

    async fn user_for_claims(&self, claims: &Claims) -> AppResult<User> {
        self.token_owner(claims).await?.ok_or_else(|| {
            debug!(subject = %claims.sub, "Token owner is gone, inactive or renamed");
            AppError::AuthenticationError("Account is no longer available.".into())
        })
    }

    async fn login_failed(&self, client: &str) -> AppError {
        if let Some(throttle) = &self.throttle {
            if let Err(err) = throttle.record_failure(client).await {
                return err;
            }
        }
        AppError::InvalidCredentials
    }
}

#[async_trait]
impl AuthServiceTrait for AuthService {
    fn jwt_service(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt_service)
    }

    async fn register(&self, input: RegisterInput) -> AppResult<UserProfile> {
        let username = sanitize_string(&input.username);
        let email = sanitize_string(&input.email);

        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&input.password, &self.password_policy)?;

        if self.users.find_by_identifier(&username).await?.is_some() {
            return resource_exists_error!("User", "username", &username);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return resource_exists_error!("User", "email", &email);
        }

        let default_role = self.roles.find_by_name(DEFAULT_ROLE).await?.ok_or_else(|| {
            AppError::ServerError(anyhow::anyhow!(
                "Default role '{}' has not been seeded",
                DEFAULT_ROLE
            ))
        })?;

        let password_hash = self.passwords.hash_blocking(input.password).await?;
        let user = self
            .users
            .create(User::new(username, email, password_hash, default_role.id))
            .await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(UserProfile::from(user))
    }

    async fn login(&self, input: LoginInput, client: &str) -> AppResult<TokenPair> {
        if let Some(throttle) = &self.throttle {
            throttle.check(client).await?;
        }

        let username = sanitize_string(&input.username);
        let user = self.users.find_by_identifier(&username).await?;

        // Unknown users still cost one verification against the dummy hash
        let verified = self
            .passwords
            .verify_blocking(
                input.password,
                user.as_ref().map(|user| user.password_hash.clone()),
            )
            .await?;

        let user = match user {
            Some(user) if verified && user.is_active => user,
            _ => {
                warn!(client, "Failed login attempt");
                return Err(self.login_failed(client).await);
            }
        };

        if let Some(throttle) = &self.throttle {
            throttle.record_success(client).await?;
        }

        info!(user_id = %user.id, "User logged in");
        self.start_session(&user, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.jwt_service.validate_refresh(refresh_token)?;

        let Some(user) = self.token_owner(&claims).await? else {
            return Err(AppError::RevokedToken);
        };

        if user.session_id.as_deref() != Some(claims.jti.as_str()) {
            warn!(user_id = %user.id, "Refresh token is not the current session");
            return Err(AppError::RevokedToken);
        }

        debug!(user_id = %user.id, "Rotating refresh token");
        self.start_session(&user, Some(claims.jti.as_str())).await
    }

    async fn current_user(&self, claims: &Claims) -> AppResult<UserProfile> {
        self.user_for_claims(claims).await.map(UserProfile::from)
    }

    async fn update_profile(
        &self,
        claims: &Claims,
        input: UpdateProfileInput,
    ) -> AppResult<UserProfile> {
        let mut user = self.user_for_claims(claims).await?;
        let mut renamed = false;

        if let Some(username) = input.username.as_deref().map(sanitize_string) {
            if username != user.username {
                validate_username(&username)?;
                if self.users.find_by_identifier(&username).await?.is_some() {
                    return resource_exists_error!("User", "username", &username);
                }
                user.username = username;
                renamed = true;
            }
        }

        if let Some(email) = input.email.as_deref().map(sanitize_string) {
            if email != user.email {
                validate_email(&email)?;
                if let Some(owner) = self.users.find_by_email(&email).await? {
                    if owner.id != user.id {
                        return resource_exists_error!("User", "email", &email);
                    }
                }
                user.email = email;
            }
        }

        if let Some(password) = input.password {
            validate_password(&password, &self.password_policy)?;
            user.password_hash = self.passwords.hash_blocking(password).await?;
        }

        if let Some(info) = input.additional_info {
            let info = sanitize_string(&info);
            user.additional_info = (!info.is_empty()).then_some(info);
        }

        user.updated_at = Utc::now();
        let user = self.users.update(user).await?;

        if renamed {
            // Outstanding tokens name the old username
            self.users.set_session(&user.id, None, None).await?;
        }

        info!(user_id = %user.id, "Profile updated");
        Ok(UserProfile::from(user))
    }
}
