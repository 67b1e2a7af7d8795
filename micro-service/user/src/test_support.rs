use app_config::AppConfig;
use app_database::db_connect::initialize_memory_db;
use app_middleware::{JwtService, limits::rate_limiter::create_login_rate_limiter};
use app_models::ADMIN_ROLE;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use crate::AppState;

/// In-memory database and cheap Argon2 parameters.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.security.password.argon2.memory = 256;
    config.security.password.argon2.iterations = 1;
    config
}

pub async fn test_state() -> AppState {
    let config = test_config();
    let db = initialize_memory_db().await.unwrap();
    let jwt = Arc::new(JwtService::from_config(&config.security.jwt).unwrap());
    let throttle = Arc::new(create_login_rate_limiter(
        &config.security.rate_limiting.login,
    ));

    let state = AppState::new(config, db, jwt, throttle).unwrap();
    state.bootstrap().await.unwrap();
    state
}

async fn post_json(app: &Router, uri: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::CREATED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str) {
    post_json(
        app,
        "/registration/",
        json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "S3cret!",
        }),
    )
    .await;
}

async fn login(app: &Router, username: &str) -> Value {
    post_json(
        app,
        "/login/",
        json!({"username": username, "password": "S3cret!"}),
    )
    .await
}

/// Registers `username` with password `S3cret!` and returns the token pair.
pub async fn register_and_login(app: &Router, username: &str) -> Value {
    register(app, username).await;
    login(app, username).await
}

/// Access token for a freshly registered account holding the admin role.
pub async fn admin_token(app: &Router, state: &AppState, username: &str) -> String {
    register(app, username).await;
    state.roles.assign_role(username, ADMIN_ROLE).await.unwrap();
    login(app, username).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}
