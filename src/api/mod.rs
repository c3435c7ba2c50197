//! API layer
//!
//! HTTP handlers for:
//! - OAuth initiation (`/api/oauth-init`, `/oauth-init`)
//! - Health checks
//! - Metrics (Prometheus)

mod health;
pub mod metrics;
mod oauth_init;
mod page;

pub use health::health_router;
pub use metrics::metrics_router;
pub use oauth_init::oauth_init_router;
