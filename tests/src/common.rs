use app_config::AppConfig;
use app_database::db_connect::initialize_memory_db;
use app_middleware::{JwtService, LoginThrottle, limits::rate_limiter::create_login_rate_limiter};
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header, request::Builder},
    response::Response,
};
use chrono::Duration;
use jsonwebtoken::Algorithm;
use micro_user::{AppState, create_routes};
use serde_json::{Value, json};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tower::ServiceExt;

pub const SECRET: &[u8] = b"system-test-secret-with-enough-entropy";
pub const PASSWORD: &str = "S3cret!";
/// Peer address used when a test does not care who is calling.
pub const PEER: &str = "192.0.2.1";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct Setup {
    pub access_ttl: Duration,
    pub throttle: Option<Arc<dyn LoginThrottle>>,
    pub route_limits: Vec<(&'static str, usize)>,
    pub trusted_proxies: Vec<&'static str>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(5),
            throttle: None,
            route_limits: Vec::new(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Setup {
    pub async fn build(self) -> TestApp {
        let mut config = AppConfig::default();
        config.security.password.argon2.memory = 256;
        config.security.password.argon2.iterations = 1;
        // Keep the API limiter out of the way unless a test sets routes
        config.security.rate_limiting.api.max_attempts = 1_000;
        config.security.rate_limiting.paths = self
            .route_limits
            .iter()
            .map(|(route, limit)| (route.to_string(), *limit))
            .collect();
        config.security.trusted_proxies = self
            .trusted_proxies
            .iter()
            .map(|address| address.to_string())
            .collect();

        let throttle = self.throttle.unwrap_or_else(|| {
            Arc::new(create_login_rate_limiter(
                &config.security.rate_limiting.login,
            ))
        });
        let jwt = Arc::new(
            JwtService::new(SECRET, Algorithm::HS256, self.access_ttl, Duration::days(1))
                .unwrap(),
        );
        let db = initialize_memory_db().await.unwrap();

        let state = AppState::new(config, db, jwt, throttle).unwrap();
        state.bootstrap().await.unwrap();

        TestApp {
            router: create_routes(state.clone()),
            state,
        }
    }
}

pub async fn test_app() -> TestApp {
    Setup::default().build().await
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// POST as if the TCP peer were `from`.
    pub async fn post(&self, uri: &str, body: Value, from: &str) -> Response {
        self.send(
            json_post(uri, from)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST through a proxy at `peer` that reports `forwarded_for`.
    pub async fn post_forwarded(
        &self,
        uri: &str,
        body: Value,
        peer: &str,
        forwarded_for: &str,
    ) -> Response {
        self.send(
            json_post(uri, peer)
                .header("X-Forwarded-For", forwarded_for)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn with_bearer(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = from_peer(Request::builder(), PEER)
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    pub async fn register(&self, username: &str) -> Value {
        let response = self
            .post(
                "/registration/",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                }),
                PEER,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    pub async fn login(&self, username: &str, password: &str, from: &str) -> Response {
        self.post(
            "/login/",
            json!({"username": username, "password": password}),
            from,
        )
        .await
    }

    /// Logs in and returns `(access_token, refresh_token)`.
    pub async fn tokens(&self, username: &str) -> (String, String) {
        let response = self.login(username, PASSWORD, PEER).await;
        assert_eq!(response.status(), StatusCode::OK);
        let pair = body_json(response).await;
        assert_eq!(pair["token_type"], "bearer");
        (
            pair["access_token"].as_str().unwrap().to_string(),
            pair["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn refresh(&self, refresh_token: &str) -> Response {
        self.post(
            "/refresh/",
            json!({"refresh_token": refresh_token}),
            PEER,
        )
        .await
    }
}

pub fn from_peer(builder: Builder, peer: &str) -> Builder {
    let ip: IpAddr = peer.parse().unwrap();
    builder.extension(ConnectInfo(SocketAddr::new(ip, 40000)))
}

fn json_post(uri: &str, peer: &str) -> Builder {
    from_peer(Request::builder(), peer)
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn error_code(response: Response) -> String {
    body_json(response).await["code"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
