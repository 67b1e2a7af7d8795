use app_error::{AppError, AppResult};
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, Request, State},
    http::{Extensions, HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashSet,
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Instant,
};
use tracing::{debug, error, info, trace, warn};

use crate::JwtService;
use crate::limits::rate_limiter::{ApiRateLimiter, RateLimitStatus};

const UNKNOWN_CLIENT: &str = "unknown";

/// Peers allowed to report the original client through forwarding headers.
///
/// Installed as a request extension. Without one, or when the peer is not
/// listed, the socket address is the client and headers are ignored.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    addresses: HashSet<IpAddr>,
}

impl TrustedProxies {
    pub fn from_config(addresses: &[String]) -> AppResult<Self> {
        let addresses = addresses
            .iter()
            .map(|address| {
                IpAddr::from_str(address.trim()).map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Trusted proxy '{}' is not an IP address",
                        address
                    ))
                })
            })
            .collect::<AppResult<_>>()?;
        Ok(Self { addresses })
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.addresses.contains(&ip)
    }

    /// The client behind the connection. From a trusted peer this is the
    /// right-most `X-Forwarded-For` hop that is not itself a trusted proxy,
    /// else `X-Real-IP`, else the peer.
    pub fn resolve(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|connect_info| connect_info.ip())?;
        if !self.is_trusted(peer) {
            return Some(peer);
        }

        if let Some(forwarded) = headers
            .get("X-Forwarded-For")
            .and_then(|value| value.to_str().ok())
        {
            for hop in forwarded.rsplit(',') {
                match IpAddr::from_str(hop.trim()) {
                    Ok(ip) if self.is_trusted(ip) => continue,
                    Ok(ip) => return Some(ip),
                    Err(_) => break,
                }
            }
        }

        headers
            .get("X-Real-IP")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| IpAddr::from_str(value.trim()).ok())
            .or(Some(peer))
    }
}

/// Client IP as seen through the `TrustedProxies` extension.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    match extensions.get::<TrustedProxies>() {
        Some(proxies) => proxies.resolve(headers, extensions),
        None => TrustedProxies::default().resolve(headers, extensions),
    }
}

pub fn extract_client_id(req: &Request<Body>) -> String {
    client_ip(req.headers(), req.extensions())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Address the login throttle is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let address = client_ip(&parts.headers, &parts.extensions)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Ok(Self(address))
    }
}

pub fn add_rate_limit_headers(response: &mut Response, status: &RateLimitStatus) {
    let headers = response.headers_mut();

    headers.insert("X-RateLimit-Limit", HeaderValue::from(status.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(status.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(status.window_reset));

    if let Some(block_reset) = status.block_reset {
        headers.insert("X-RateLimit-BlockReset", HeaderValue::from(block_reset));
        headers.insert(header::RETRY_AFTER, HeaderValue::from(block_reset));
    }
}

/// Per client and route request limiting with `X-RateLimit-*` headers.
///
/// Buckets are keyed on the matched route template, so `/roles/a` and
/// `/roles/b` share one budget. Unmatched requests fall back to the raw path.
pub async fn api_rate_limit_middleware(
    State(rate_limiter): State<Arc<ApiRateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client_id = extract_client_id(&req);
    let method = req.method().as_str().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let bucket = format!("{}:{} {}", client_id, method, route);

    let outcome = rate_limiter
        .check_rate_limit_for_route(&bucket, &method, &route)
        .await;
    let status = rate_limiter
        .get_limit_status_for_route(&bucket, &method, &route)
        .await;

    let mut response = match outcome {
        Ok(()) => {
            trace!(client = %client_id, %method, %route, "Rate limit check passed");
            next.run(req).await
        }
        Err(err) => {
            warn!(client = %client_id, %method, %route, "Rate limit exceeded");
            err.into_response()
        }
    };

    add_rate_limit_headers(&mut response, &status);
    response
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::AuthenticationError("Missing Authorization header.".into()))?
        .to_str()
        .map_err(|_| AppError::AuthenticationError("Invalid Authorization header.".into()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::AuthenticationError("Expected a Bearer token.".into()))
}

/// Requires a valid access token and stores its `Claims` in the request
/// extensions.
pub async fn jwt_auth_middleware(
    State(jwt_service): State<Arc<JwtService>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let claims = match bearer_token(req.headers()).and_then(|token| jwt_service.validate_access(token)) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Bearer authentication failed: {}", err);
            return err.into_response();
        }
    };

    trace!(subject = %claims.sub, "Access token accepted");
    req.extensions_mut().insert(claims);
    next.run(req).await
}

pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'; connect-src 'self';"),
    );

    response
}

pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client_id = extract_client_id(&req);

    debug!(method = %method, path = %path, client = %client_id, "Request started");

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status < 400 {
        info!(method = %method, path = %path, client = %client_id, status, duration_ms, "Request completed");
    } else if status < 500 {
        warn!(method = %method, path = %path, client = %client_id, status, duration_ms, "Request completed with client error");
    } else {
        error!(method = %method, path = %path, client = %client_id, status, duration_ms, "Request completed with server error");
    }

    response
}
