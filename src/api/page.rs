//! Bootstrap page for starting a sign-in from a plain link
//!
//! Browsers only store cookies from a top-level navigation response, so the
//! initiation has to be a form submission rather than a `fetch`. This page
//! turns `GET /oauth-init?provider=...` into that submission.

use axum::{
    extract::{RawQuery, State},
    response::Html,
};

use crate::AppState;
use crate::auth::InitiationParams;

const INITIATE_ACTION: &str = "/api/oauth-init";

/// GET /oauth-init
pub(super) async fn bootstrap_page(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Html<String> {
    let params = InitiationParams::from_urlencoded(query.unwrap_or_default().as_bytes());
    let request = params.into_request(state.initiator.default_provider());

    Html(render_bootstrap_page(
        &request.provider,
        &request.callback_url,
        request.error_callback_url.as_deref(),
    ))
}

fn render_hidden_input(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\" />",
        html_escape::encode_double_quoted_attribute(name),
        html_escape::encode_double_quoted_attribute(value)
    )
}

fn render_bootstrap_page(
    provider: &str,
    callback_url: &str,
    error_callback_url: Option<&str>,
) -> String {
    let inputs = [
        Some(render_hidden_input("provider", provider)),
        Some(render_hidden_input("callbackURL", callback_url)),
        error_callback_url.map(|value| render_hidden_input("errorCallbackURL", value)),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n    ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Signing in</title>
</head>
<body style="display:flex;flex-direction:column;align-items:center;justify-content:center;min-height:100vh;padding:2rem">
  <p style="color:#666;margin-bottom:1rem">Redirecting to {}&hellip;</p>
  <form id="oauth-init" method="POST" action="{}">
    {}
    <noscript><button type="submit">Continue</button></noscript>
  </form>
  <script>document.getElementById("oauth-init").submit();</script>
</body>
</html>"#,
        html_escape::encode_text(provider),
        INITIATE_ACTION,
        inputs,
    )
}
