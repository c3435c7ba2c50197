//! Cross-origin headers
//!
//! One middleware decorates every response the relay produces, including
//! error redirects and 404s, and answers preflight requests directly.
//!
//! Policy: with an empty allow-list the caller's `Origin` is echoed back;
//! with a non-empty allow-list only listed origins are echoed and anything
//! else gets no `Access-Control-Allow-*` headers. A request without `Origin`
//! gets `*`.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::CorsConfig;
use crate::error::AppError;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, Cookie, X-Requested-With, Accept, Origin";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<HeaderValue>,
    max_age: HeaderValue,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Result<Self, AppError> {
        let allowed_origins = config
            .allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| {
                    AppError::Config(format!("cors.allowed_origins: invalid origin {origin:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            allowed_origins,
            max_age: HeaderValue::from(config.max_age_seconds),
        })
    }

    fn allows(&self, origin: &HeaderValue) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.contains(origin)
    }

    /// Add cross-origin headers for a request that sent `origin`.
    ///
    /// Returns `false` when the origin is refused and nothing but `Vary` was
    /// added.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) -> bool {
        headers.append(header::VARY, HeaderValue::from_static("Origin"));

        match origin {
            Some(origin) if self.allows(origin) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }
            Some(_) => return false,
            None => {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
            }
        }

        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        true
    }
}

/// Middleware applying [`CorsPolicy`] to every response.
///
/// `OPTIONS` requests carrying `Access-Control-Request-Method` are answered
/// with `204` without reaching the router; the requested method and headers
/// are echoed back.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    if request.method() == Method::OPTIONS {
        if let Some(requested_method) = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .cloned()
        {
            let requested_headers = request
                .headers()
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .cloned();

            let mut response = StatusCode::NO_CONTENT.into_response();
            let headers = response.headers_mut();
            if policy.apply(origin.as_ref(), headers) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, requested_method);
                if let Some(requested_headers) = requested_headers {
                    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested_headers);
                }
            }
            return response;
        }
    }

    let mut response = next.run(request).await;
    policy.apply(origin.as_ref(), response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn policy(allowed: &[&str]) -> Arc<CorsPolicy> {
        Arc::new(
            CorsPolicy::from_config(&CorsConfig {
                allowed_origins: allowed.iter().map(|o| o.to_string()).collect(),
                max_age_seconds: 86400,
            })
            .unwrap(),
        )
    }

    fn app(policy: Arc<CorsPolicy>) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(policy, cors_middleware))
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn echoes_origin_by_default() {
        let response = app(policy(&[]))
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("http://localhost:5173")
        );
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some("true")
        );
        assert_eq!(header_str(&response, header::ACCESS_CONTROL_MAX_AGE), Some("86400"));
        assert_eq!(header_str(&response, header::VARY), Some("Origin"));
    }

    #[tokio::test]
    async fn wildcard_without_origin() {
        let response = app(policy(&[]))
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_routes_are_decorated_too() {
        let response = app(policy(&[]))
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .header("Origin", "https://x.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://x.test")
        );
    }

    #[tokio::test]
    async fn allow_list_refuses_unlisted_origin() {
        let app = app(policy(&["https://app.example.com"]));

        let listed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("Origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            header_str(&listed, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://app.example.com")
        );

        let unlisted = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("Origin", "https://evil.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unlisted.status(), StatusCode::OK);
        assert!(
            unlisted
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn preflight_is_answered_directly() {
        let response = app(policy(&[]))
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/auth/sign-out")
                    .header("Origin", "http://localhost:3000")
                    .header("Access-Control-Request-Method", "POST")
                    .header("Access-Control-Request-Headers", "content-type, x-custom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("http://localhost:3000")
        );
        assert_eq!(header_str(&response, header::ACCESS_CONTROL_ALLOW_METHODS), Some("POST"));
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_HEADERS),
            Some("content-type, x-custom")
        );
    }
}
