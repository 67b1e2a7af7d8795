use std::{any::Any, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use axum::{
    Router,
    extract::Extension,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use app_config::CorsConfig;
use app_error::{AppError, middleware_handling::error_handling_middleware};
use app_middleware::api_middleware::{
    api_rate_limit_middleware, jwt_auth_middleware, logging_middleware,
    security_headers_middleware,
};

use crate::{
    handlers::{auth, roles, system},
    state::AppState,
};

fn cors_layer(cors_config: &CorsConfig) -> CorsLayer {
    let origins = if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            cors_config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(
            cors_config
                .allowed_methods
                .iter()
                .filter_map(|method| method.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_headers(
            cors_config
                .allowed_headers
                .iter()
                .filter_map(|header| header.parse().ok())
                .collect::<Vec<_>>(),
        )
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    AppError::ServerError(anyhow::anyhow!("Request handler panicked")).into_response()
}

pub fn create_routes(state: AppState) -> Router {
    let server = &state.config.server;
    let body_limit = server.body_limit;
    let request_timeout = Duration::from_secs(server.request_timeout);
    let cors = cors_layer(&state.config.security.cors);
    let proxies = state.proxies.clone();

    // Bearer access token required
    let protected = Router::new()
        .route("/me", get(auth::me).put(auth::update_me))
        .route("/roles/", post(roles::create_role))
        .route(
            "/roles/{role_id}",
            get(roles::get_role)
                .put(roles::update_role)
                .delete(roles::delete_role),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.jwt),
            jwt_auth_middleware,
        ));

    let app = Router::new()
        .route("/registration/", post(auth::register))
        .route("/login/", post(auth::login))
        .route("/refresh/", post(auth::refresh))
        .route("/health", get(system::health_check))
        .route("/db-status", get(system::db_status))
        .route("/ws/tasks/", get(system::ws_tasks))
        .merge(protected);

    let app = app
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.api_limiter),
            api_rate_limit_middleware,
        ))
        .layer(Extension(state));

    let app = app
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(error_handling_middleware));

    // Client addressing has to be in place before logging and rate limiting
    let app = app
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(Extension(proxies));

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    )
}
