//! OAuth initiation endpoints

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, RawQuery, Request, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::get,
};

use super::page::bootstrap_page;
use crate::AppState;
use crate::auth::{CallerContext, InitiationParams};
use crate::metrics::ERRORS_TOTAL;

/// Create the OAuth initiation router
///
/// Routes:
/// - GET /api/oauth-init - Initiate from query parameters
/// - POST /api/oauth-init - Initiate from a JSON, form or multipart body
/// - GET /oauth-init - Auto-submitting page that posts to /api/oauth-init
/// - POST /oauth-init - Same as POST /api/oauth-init
///
/// Bodies over `body_limit` are read as undecodable rather than refused, so
/// the caller still gets a redirect.
pub fn oauth_init_router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/api/oauth-init",
            get(initiate_from_query).post(initiate_from_body),
        )
        .route("/oauth-init", get(bootstrap_page).post(initiate_from_body))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// GET /api/oauth-init
async fn initiate_from_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let params = InitiationParams::from_urlencoded(query.unwrap_or_default().as_bytes());
    let caller = CallerContext::from_headers(&headers);

    state.initiator.initiate(params, &caller).await.into_response()
}

/// POST /api/oauth-init
///
/// The `Content-Type` header picks the decoder. A body that cannot be
/// decoded is not an error: initiation proceeds with default values.
async fn initiate_from_body(State(state): State<AppState>, request: Request) -> Response {
    let caller = CallerContext::from_headers(request.headers());
    let params = decode_params(request, &state).await;

    state.initiator.initiate(params, &caller).await.into_response()
}

async fn decode_params(request: Request, state: &AppState) -> InitiationParams {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let decoded = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, state).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(rejection) => Err(rejection.body_text()),
        }
    } else {
        match Bytes::from_request(request, state).await {
            Ok(body) if content_type.contains("application/json") => {
                InitiationParams::from_json(&body)
            }
            Ok(body) => Ok(InitiationParams::from_urlencoded(&body)),
            Err(rejection) => Err(rejection.body_text()),
        }
    };

    decoded.unwrap_or_else(|reason| malformed(&reason))
}

async fn read_multipart(mut multipart: Multipart) -> Result<InitiationParams, String> {
    let mut params = InitiationParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| error.body_text())?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };
        let value = field.text().await.map_err(|error| error.body_text())?;
        params.set_field(&name, value);
    }

    Ok(params)
}

fn malformed(reason: &str) -> InitiationParams {
    tracing::warn!(%reason, "Undecodable oauth-init input; using defaults");
    ERRORS_TOTAL
        .with_label_values(&["malformed_body", "/api/oauth-init"])
        .inc();
    InitiationParams::default()
}
