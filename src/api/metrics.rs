//! Prometheus metrics endpoint

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::error::AppError;
use crate::metrics::REGISTRY;

/// GET /metrics
///
/// Returns all relay metrics in Prometheus text format.
async fn metrics_handler() -> Result<Response, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let metrics_text = encoder.encode_to_string(&metric_families).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        AppError::Internal(e.into())
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type())],
        metrics_text,
    )
        .into_response())
}

/// Create metrics router
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}
