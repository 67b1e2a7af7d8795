use app_config::{AppConfig, Argon2Config, RateLimitSettings};
use app_database::{SurrealRoleStore, SurrealUserStore, db_connect::initialize_memory_db};
use app_middleware::{JwtService, PasswordService, limits::rate_limiter::create_login_rate_limiter};
use std::sync::Arc;

use crate::{AuthService, RoleService};

pub struct Fixture {
    pub auth: AuthService,
    pub roles: RoleService,
    pub jwt: Arc<JwtService>,
}

pub async fn fixture() -> Fixture {
    fixture_with_throttle(RateLimitSettings {
        max_attempts: 100,
        window_duration: 60,
        block_duration: None,
    })
    .await
}

pub async fn fixture_with_throttle(settings: RateLimitSettings) -> Fixture {
    let config = AppConfig::default();
    let db = initialize_memory_db().await.unwrap();
    let users = Arc::new(SurrealUserStore::new(Arc::clone(&db)));
    let role_store = Arc::new(SurrealRoleStore::new(db));

    let roles = RoleService::new(role_store.clone(), users.clone());
    roles.ensure_default_roles().await.unwrap();

    let jwt = Arc::new(JwtService::from_config(&config.security.jwt).unwrap());
    let passwords = Arc::new(
        PasswordService::from_config(&Argon2Config {
            variant: "argon2id".into(),
            memory: 256,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap(),
    );

    let auth = AuthService::new(
        users,
        role_store,
        Arc::clone(&jwt),
        passwords,
        config.security.password.clone(),
    )
    .with_throttle(Arc::new(create_login_rate_limiter(&settings)));

    Fixture { auth, roles, jwt }
}
