use app_models::{ADMIN_ROLE, Claims, TokenType};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

use crate::common::{PASSWORD, PEER, Setup, body_json, error_code, test_app};

#[tokio::test]
async fn test_login_me_expire_refresh_scenario() {
    let app = Setup {
        access_ttl: Duration::seconds(1),
        ..Default::default()
    }
    .build()
    .await;

    app.register("alice").await;
    let (access, refresh) = app.tokens("alice").await;

    let response = app.with_bearer(Method::GET, "/me", &access, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "alice");

    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let response = app.with_bearer(Method::GET, "/me", &access, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "TOKEN_EXPIRED");

    let response = app.refresh(&refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pair = body_json(response).await;
    let new_access = pair["access_token"].as_str().unwrap();

    let response = app.with_bearer(Method::GET, "/me", new_access, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_revoked() {
    let app = test_app().await;
    app.register("alice").await;
    let (_, refresh) = app.tokens("alice").await;

    let response = app.refresh(&refresh).await;
    assert_eq!(response.status(), StatusCode::OK);

    let replay = app.refresh(&refresh).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(replay).await, "TOKEN_REVOKED");
}

#[tokio::test]
async fn test_token_types_are_not_interchangeable() {
    let app = test_app().await;
    app.register("alice").await;
    let (access, refresh) = app.tokens("alice").await;

    let response = app.with_bearer(Method::GET, "/me", &refresh, None).await;
    assert_eq!(error_code(response).await, "WRONG_TOKEN_TYPE");

    let response = app.refresh(&access).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "WRONG_TOKEN_TYPE");
}

#[tokio::test]
async fn test_foreign_signature_and_garbage_tokens() {
    let app = test_app().await;
    app.register("alice").await;

    let now = Utc::now().timestamp();
    let forged = encode(
        &Header::default(),
        &Claims {
            sub: "alice".into(),
            uid: "forged".into(),
            role: None,
            iat: now,
            exp: now + 300,
            jti: "forged".into(),
            token_type: TokenType::Access,
        },
        &EncodingKey::from_secret(b"somebody-elses-secret"),
    )
    .unwrap();

    let response = app.with_bearer(Method::GET, "/me", &forged, None).await;
    assert_eq!(error_code(response).await, "INVALID_SIGNATURE");

    let response = app.with_bearer(Method::GET, "/me", "abc.def", None).await;
    assert_eq!(error_code(response).await, "MALFORMED_TOKEN");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = test_app().await;
    app.register("alice").await;

    let response = app
        .post(
            "/registration/",
            json!({"username": "alice", "email": "other@example.com", "password": PASSWORD}),
            PEER,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, "RESOURCE_EXISTS");
}

#[tokio::test]
async fn test_role_change_applies_after_refresh() {
    let app = test_app().await;
    app.register("alice").await;
    let (access, refresh) = app.tokens("alice").await;
    let staff = json!({"name": "staff", "permissions": ["manage_users"]});

    let response = app
        .with_bearer(Method::POST, "/roles/", &access, Some(staff.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.state
        .roles
        .assign_role("alice", ADMIN_ROLE)
        .await
        .unwrap();

    // The old token still carries the old role
    let response = app
        .with_bearer(Method::POST, "/roles/", &access, Some(staff.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let pair = body_json(app.refresh(&refresh).await).await;
    let promoted = pair["access_token"].as_str().unwrap();
    let response = app
        .with_bearer(Method::POST, "/roles/", promoted, Some(staff))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_deleting_assigned_role_is_rejected() {
    let app = test_app().await;
    app.register("root").await;
    app.register("alice").await;
    app.state.roles.assign_role("root", ADMIN_ROLE).await.unwrap();
    let (admin_access, _) = app.tokens("root").await;

    let response = app
        .with_bearer(
            Method::POST,
            "/roles/",
            &admin_access,
            Some(json!({"name": "staff"})),
        )
        .await;
    let role_id = body_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    app.state.roles.assign_role("alice", "staff").await.unwrap();

    let uri = format!("/roles/{}", role_id);
    let response = app
        .with_bearer(Method::DELETE, &uri, &admin_access, None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, "RESOURCE_IN_USE");

    // Role survives the rejected delete
    let response = app.with_bearer(Method::GET, &uri, &admin_access, None).await;
    assert_eq!(body_json(response).await["name"], "staff");
}

#[tokio::test]
async fn test_login_throttled_after_repeated_failures() {
    let app = test_app().await;
    app.register("alice").await;
    let attacker = "203.0.113.66";

    for _ in 0..5 {
        let response = app.login("alice", "Wrong1!", attacker).await;
        assert_eq!(error_code(response).await, "INVALID_CREDENTIALS");
    }

    let response = app.login("alice", PASSWORD, attacker).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(response).await, "RATE_LIMIT");

    let response = app.login("alice", PASSWORD, "198.51.100.2").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_task_channel_requires_upgrade() {
    let app = test_app().await;
    let response = app
        .send(
            Request::builder()
                .uri("/ws/tasks/")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_renamed_users_token_cannot_reach_new_owner_of_name() {
    let app = test_app().await;
    app.register("alice").await;
    let (access, _) = app.tokens("alice").await;

    let response = app
        .with_bearer(Method::PUT, "/me", &access, Some(json!({"username": "alicia"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    app.register("alice").await;

    let response = app.with_bearer(Method::GET, "/me", &access, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "AUTH_ERROR");

    let response = app
        .with_bearer(
            Method::PUT,
            "/me",
            &access,
            Some(json!({"email": "hijacked@example.com"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (new_owner, _) = app.tokens("alice").await;
    let response = app.with_bearer(Method::GET, "/me", &new_owner, None).await;
    assert_eq!(body_json(response).await["email"], "alice@example.com");
}

#[tokio::test]
async fn test_forwarded_for_from_untrusted_peer_cannot_dodge_throttle() {
    let app = test_app().await;
    app.register("alice").await;
    let attacker = "203.0.113.66";

    for i in 0..5 {
        let response = app
            .post_forwarded(
                "/login/",
                json!({"username": "alice", "password": "Wrong1!"}),
                attacker,
                &format!("198.51.100.{}", i),
            )
            .await;
        assert_eq!(error_code(response).await, "INVALID_CREDENTIALS");
    }

    let response = app
        .post_forwarded(
            "/login/",
            json!({"username": "alice", "password": PASSWORD}),
            attacker,
            "198.51.100.99",
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_trusted_proxy_throttles_the_forwarded_client() {
    let app = Setup {
        trusted_proxies: vec!["10.0.0.1"],
        ..Default::default()
    }
    .build()
    .await;
    app.register("alice").await;
    let proxy = "10.0.0.1";

    for _ in 0..5 {
        let response = app
            .post_forwarded(
                "/login/",
                json!({"username": "alice", "password": "Wrong1!"}),
                proxy,
                "203.0.113.66",
            )
            .await;
        assert_eq!(error_code(response).await, "INVALID_CREDENTIALS");
    }

    let login = json!({"username": "alice", "password": PASSWORD});
    let response = app
        .post_forwarded("/login/", login.clone(), proxy, "203.0.113.66")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client behind the same proxy is unaffected
    let response = app
        .post_forwarded("/login/", login, proxy, "198.51.100.2")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_role_writes_share_one_budget_across_ids() {
    let app = Setup {
        route_limits: vec![("PUT /roles/{role_id}", 2)],
        ..Default::default()
    }
    .build()
    .await;
    app.register("root").await;
    app.state.roles.assign_role("root", ADMIN_ROLE).await.unwrap();
    let (admin_access, _) = app.tokens("root").await;
    let update = json!({"name": "renamed"});

    for id in ["missing-1", "missing-2"] {
        let response = app
            .with_bearer(
                Method::PUT,
                &format!("/roles/{}", id),
                &admin_access,
                Some(update.clone()),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .with_bearer(Method::PUT, "/roles/missing-3", &admin_access, Some(update))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["X-RateLimit-Limit"], "2");

    // GET on the same template keeps its own budget
    let response = app
        .with_bearer(Method::GET, "/roles/missing-4", &admin_access, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
