//! authrelay - Cross-origin OAuth sign-in relay
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - /api/oauth-init (GET query, POST json/form/multipart)    │
//! │  - /oauth-init bootstrap page                               │
//! │  - /health, /api/health, /metrics                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Auth Layer                              │
//! │  - Callback URL resolution                                  │
//! │  - Session authority client                                 │
//! │  - Set-Cookie rewriting (SameSite=None; Secure)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every response passes through the CORS middleware, so browsers on other
//! origins can read error redirects and 404s as well as successes.
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: Delegation to the session authority
//! - `cors`: Cross-origin headers and preflight handling
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Runs initiations against the session authority
    pub initiator: Arc<auth::Initiator>,

    /// Cross-origin policy applied to every response
    pub cors: Arc<cors::CorsPolicy>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the outbound HTTP
    /// client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        config.validate()?;

        let initiator = auth::Initiator::new(&config)?;
        let cors = cors::CorsPolicy::from_config(&config.cors)?;

        tracing::info!(
            authority = %initiator.authority_url(),
            default_provider = initiator.default_provider(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            initiator: Arc::new(initiator),
            cors: Arc::new(cors),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower::ServiceBuilder;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::health_router())
        .merge(api::oauth_init_router(state.config.server.body_limit_bytes))
        .merge(api::metrics_router())
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.cors.clone(),
                    cors::cors_middleware,
                )),
        )
        .with_state(state)
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
