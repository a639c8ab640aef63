//! Tower middleware for the inspection API

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Request ID wrapper
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Stamp every request with a fresh id, echoed back in `X-Request-ID`
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request tracing middleware
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        request_id = %request_id,
    );

    let response = next.run(request).instrument(span).await;

    tracing::info!(
        method = %method,
        path = %path,
        request_id = %request_id,
        status = %response.status().as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// CORS configuration helper.
/// Reads allowed origins from QSCOPE_CORS_ORIGINS (comma-separated) and
/// falls back to localhost only.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    cors_layer_for(std::env::var("QSCOPE_CORS_ORIGINS").ok().as_deref())
}

pub fn cors_layer_for(origins: Option<&str>) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, CorsLayer};

    let localhost = HeaderValue::from_static("http://localhost");

    let allow_origin = match origins {
        Some(origins_str) if !origins_str.trim().is_empty() => {
            let origins: Vec<HeaderValue> = origins_str
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                tracing::warn!("QSCOPE_CORS_ORIGINS contains no valid origins, using localhost only");
                AllowOrigin::exact(localhost)
            } else {
                tracing::info!("CORS configured for {} origin(s)", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            tracing::debug!("QSCOPE_CORS_ORIGINS not set, using localhost only");
            AllowOrigin::exact(localhost)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
}

/// Timeout layer helper
#[allow(deprecated)]
pub fn timeout_layer(duration: Duration) -> tower_http::timeout::TimeoutLayer {
    tower_http::timeout::TimeoutLayer::new(duration)
}
