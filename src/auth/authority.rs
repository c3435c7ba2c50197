//! Session authority client
//!
//! The authority issues sessions and talks to the OAuth providers. The relay
//! only calls its social sign-in endpoint, which answers with the provider's
//! authorization URL and the cookies holding the OAuth state.

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::AuthorityConfig;
use crate::error::{AppError, InitError};
use crate::metrics::AUTHORITY_REQUEST_DURATION_SECONDS;

/// Body of `POST <authority>/sign-in/social`
#[derive(Debug, Clone, Serialize)]
pub struct SocialSignInRequest {
    pub provider: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    #[serde(rename = "errorCallbackURL", skip_serializing_if = "Option::is_none")]
    pub error_callback_url: Option<String>,
}

/// What the authority answered, reduced to the parts the relay uses.
#[derive(Debug, Clone, Default)]
pub struct AuthorityResponse {
    /// Provider authorization URL
    pub redirect_url: Option<String>,
    /// Application error reported alongside (or instead of) the URL
    pub error_message: Option<String>,
    /// Raw `Set-Cookie` values, in response order
    pub set_cookies: Vec<HeaderValue>,
}

/// HTTP client bound to one authority.
///
/// Outbound headers (User-Agent and any configured defaults) are fixed when
/// the client is built and apply to every call made through it.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    sign_in_url: Url,
    timeout: Duration,
}

impl AuthorityClient {
    pub fn new(config: &AuthorityConfig) -> Result<Self, AppError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Config(format!("invalid value for {name}: {e}")))?;
            default_headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(default_headers)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            sign_in_url: config.sign_in_url()?,
            timeout: config.timeout(),
        })
    }

    pub fn sign_in_url(&self) -> &Url {
        &self.sign_in_url
    }

    /// Ask the authority to start a social sign-in.
    ///
    /// `cookie` is the caller's raw `Cookie` header, forwarded unchanged so
    /// the authority can link the flow to an existing session.
    ///
    /// # Errors
    /// - `DelegationUnreachable`: connect failure, timeout, body read failure
    /// - `AuthorityError`: non-2xx status whose body names an error
    /// - `DelegationRejected`: any other non-2xx status, or a 2xx body that
    ///   is not JSON
    #[tracing::instrument(skip_all, fields(provider = %request.provider, url = %self.sign_in_url))]
    pub async fn sign_in_social(
        &self,
        request: &SocialSignInRequest,
        cookie: Option<&HeaderValue>,
    ) -> Result<AuthorityResponse, InitError> {
        let started = Instant::now();

        let mut builder = self.http.post(self.sign_in_url.clone()).json(request);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) => {
                observe_duration("error", started);
                return Err(self.transport_error(&error));
            }
        };

        let status = response.status();
        let set_cookies: Vec<HeaderValue> =
            response.headers().get_all(SET_COOKIE).iter().cloned().collect();

        let body = response.bytes().await.map_err(|error| {
            observe_duration("error", started);
            self.transport_error(&error)
        })?;
        observe_duration(status.as_str(), started);

        let json: Option<Value> = serde_json::from_slice(&body).ok();
        tracing::debug!(
            status = status.as_u16(),
            cookies = set_cookies.len(),
            "Authority responded"
        );

        if !status.is_success() {
            if let Some(message) = json.as_ref().and_then(error_message) {
                return Err(InitError::AuthorityError(message));
            }
            return Err(InitError::DelegationRejected(format!(
                "Auth service returned {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown status")
            )));
        }

        let json = json.ok_or_else(|| {
            InitError::DelegationRejected("Auth service returned a non-JSON response".to_string())
        })?;

        Ok(AuthorityResponse {
            redirect_url: string_field(&json, "url"),
            error_message: error_message(&json),
            set_cookies,
        })
    }

    fn transport_error(&self, error: &reqwest::Error) -> InitError {
        if error.is_timeout() {
            InitError::DelegationUnreachable(format!(
                "Auth service did not respond within {}s",
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            InitError::DelegationUnreachable(format!("Auth service unreachable: {error}"))
        } else {
            InitError::DelegationUnreachable(error.to_string())
        }
    }
}

fn observe_duration(status: &str, started: Instant) {
    AUTHORITY_REQUEST_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(started.elapsed().as_secs_f64());
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

// `{"error": "..."}`, `{"error": {"message": "..."}}` or `{"message": "..."}`
fn error_message(json: &Value) -> Option<String> {
    string_field(json, "error")
        .or_else(|| json.get("error").and_then(|error| string_field(error, "message")))
        .or_else(|| string_field(json, "message"))
}
