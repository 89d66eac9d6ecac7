//! Path-prefix normalization and CORS, both implemented as
//! `axum::middleware::from_fn` layers so the route table itself stays prefix-agnostic.

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

const RECOGNIZED_PREFIXES: [&str; 3] = ["/v1/api", "/api", "/v1"];

/// Strips the longest matching recognized prefix from `path`. `/` alone is untouched.
pub fn normalize_path(path: &str) -> &str {
    for prefix in RECOGNIZED_PREFIXES {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return if stripped.is_empty() { "/" } else { stripped };
        }
    }
    path
}

/// Rewrites the request URI in place before the inner router dispatches, and
/// answers `HEAD` on any path with 204 before reaching any handler.
pub async fn normalize_and_dispatch(mut req: Request<axum::body::Body>, next: Next) -> Response {
    if req.method() == Method::HEAD {
        return StatusCode::NO_CONTENT.into_response();
    }

    let uri = req.uri();
    let normalized = normalize_path(uri.path());
    if normalized != uri.path() {
        let mut parts = uri.clone().into_parts();
        let path_and_query = match uri.query() {
            Some(q) => format!("{normalized}?{q}"),
            None => normalized.to_string(),
        };
        if let Ok(new_pq) = path_and_query.parse() {
            parts.path_and_query = Some(new_pq);
            if let Ok(new_uri) = axum::http::Uri::from_parts(parts) {
                *req.uri_mut() = new_uri;
            }
        }
    }

    next.run(req).await
}

/// Configured CORS origins.
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    fn allow_value(&self, origin: Option<&str>) -> Option<HeaderValue> {
        if self.allowed_origins.is_empty() {
            return None;
        }
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some(HeaderValue::from_static("*"));
        }
        let origin = origin?;
        if self.allowed_origins.iter().any(|o| o == origin) {
            return HeaderValue::from_str(origin).ok();
        }
        None
    }
}

/// Applies CORS headers: echoes the request origin when it matches the
/// configured allow-list, or `*` when the list is exactly `["*"]`. `OPTIONS`
/// preflight requests return 204 without reaching the inner router.
pub async fn cors_layer(
    State(cors): State<Arc<CorsConfig>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_preflight = req.method() == Method::OPTIONS;

    let mut response = if is_preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    if let Some(allow) = cors.allow_value(origin.as_deref()) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        );
    }

    response
}
