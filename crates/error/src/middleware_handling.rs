use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

use crate::ErrorResponse;

/// Replaces bodies of framework-generated failures (oversized payloads,
/// timeouts, panics) with the standard `ErrorResponse` shape. Responses that
/// already carry an `AppError` body pass through untouched.
pub async fn error_handling_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    let response = next.run(req).await;

    let status = response.status();
    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    let is_json = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    match status {
        StatusCode::PAYLOAD_TOO_LARGE => {
            error!(path = %path, "Request body too large");
            replace(
                status,
                "The request body exceeds the maximum allowed size",
                "PAYLOAD_TOO_LARGE",
                Some("Please reduce the size of your request and try again"),
            )
        }
        StatusCode::REQUEST_TIMEOUT => replace(
            status,
            "The request took too long to process",
            "REQUEST_TIMEOUT",
            Some("Please try again later"),
        ),
        s if s.is_server_error() => {
            error!(path = %path, status = s.as_u16(), "Server error occurred");
            replace(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred",
                "SERVER_ERROR",
                Some("Please try again later or contact support if the issue persists"),
            )
        }
        _ => response,
    }
}

fn replace(status: StatusCode, message: &str, code: &str, help: Option<&str>) -> Response {
    let body = ErrorResponse {
        status: status.to_string(),
        message: message.to_string(),
        code: code.to_string(),
        details: None,
        help: help.map(String::from),
    };
    (status, Json(body)).into_response()
}
