//! OAuth initiation
//!
//! One initiation runs:
//! `received -> callback resolved -> delegated -> redirect`
//!
//! The callback URL is resolved first so that every later failure has an
//! absolute URL to redirect to. The authority is called once; there is no
//! retry. Both outcomes are a `302`.

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde_json::Value;
use url::{Url, form_urlencoded};

use super::authority::{AuthorityClient, SocialSignInRequest};
use super::callback::{error_location, resolve_callback_url};
use super::cookie::{RewrittenCookie, rewrite_for_cross_origin};
use crate::config::AppConfig;
use crate::error::{AppError, InitError};
use crate::metrics::{FORWARDED_COOKIES_TOTAL, OAUTH_INIT_TOTAL};

const NO_REDIRECT_URL: &str = "No redirect URL from auth";

/// Initiation fields as decoded from a JSON body, a form or a query string.
///
/// Every field is optional; absent and empty values fall back to defaults.
/// When a field is given more than once the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitiationParams {
    pub provider: Option<String>,
    pub callback_url: Option<String>,
    pub error_callback_url: Option<String>,
}

/// Initiation request with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiationRequest {
    pub provider: String,
    /// As received; may be relative
    pub callback_url: String,
    pub error_callback_url: Option<String>,
}

impl InitiationParams {
    /// Record `value` for the wire field `name`, unless it is already set.
    /// Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "provider" => &mut self.provider,
            "callbackURL" => &mut self.callback_url,
            "errorCallbackURL" => &mut self.error_callback_url,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// Decode `application/x-www-form-urlencoded` input, body or query.
    pub fn from_urlencoded(input: &[u8]) -> Self {
        let mut params = Self::default();
        for (name, value) in form_urlencoded::parse(input) {
            params.set_field(&name, value.into_owned());
        }
        params
    }

    /// Decode a JSON object. Fields that are not strings count as absent
    /// without discarding the others.
    pub fn from_json(body: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        let Value::Object(fields) = value else {
            return Err("JSON body is not an object".to_string());
        };

        let mut params = Self::default();
        for (name, value) in fields {
            if let Value::String(value) = value {
                params.set_field(&name, value);
            }
        }
        Ok(params)
    }

    pub fn into_request(self, default_provider: &str) -> InitiationRequest {
        InitiationRequest {
            provider: non_empty(self.provider).unwrap_or_else(|| default_provider.to_string()),
            callback_url: non_empty(self.callback_url).unwrap_or_else(|| "/".to_string()),
            error_callback_url: non_empty(self.error_callback_url),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Headers of the incoming request the relay acts on.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub origin: Option<String>,
    pub referer: Option<String>,
    /// Raw `Cookie` header, forwarded to the authority unchanged
    pub cookie: Option<HeaderValue>,
    /// Number of cookies in `cookie`
    pub cookie_count: usize,
}

impl CallerContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };

        Self {
            origin: text(header::ORIGIN),
            referer: text(header::REFERER),
            cookie: headers.get(header::COOKIE).cloned(),
            cookie_count: CookieJar::from_headers(headers).iter().count(),
        }
    }
}

/// Result of one initiation.
#[derive(Debug)]
pub enum InitiationOutcome {
    /// Send the browser to the provider, carrying the authority's cookies.
    Redirecting {
        location: String,
        cookies: Vec<RewrittenCookie>,
    },
    /// Send the browser back to the callback with the failure attached.
    Failed { location: String },
}

impl InitiationOutcome {
    pub fn location(&self) -> &str {
        match self {
            InitiationOutcome::Redirecting { location, .. }
            | InitiationOutcome::Failed { location, .. } => location,
        }
    }
}

impl IntoResponse for InitiationOutcome {
    fn into_response(self) -> Response {
        let location = HeaderValue::from_str(self.location())
            .unwrap_or_else(|_| HeaderValue::from_static("/"));
        let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();

        if let InitiationOutcome::Redirecting { cookies, .. } = &self {
            let headers = response.headers_mut();
            for cookie in cookies {
                if let Some(value) = cookie.to_header_value() {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}

/// Runs initiations against one authority with one set of defaults.
#[derive(Debug, Clone)]
pub struct Initiator {
    authority: AuthorityClient,
    default_provider: String,
    default_origin: Url,
    providers: Vec<String>,
}

impl Initiator {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            authority: AuthorityClient::new(&config.authority)?,
            default_provider: config.oauth.default_provider.trim().to_string(),
            default_origin: config.default_origin()?,
            providers: config
                .oauth
                .providers
                .iter()
                .map(|provider| provider.trim().to_string())
                .filter(|provider| !provider.is_empty())
                .collect(),
        })
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn authority_url(&self) -> &Url {
        self.authority.sign_in_url()
    }

    /// Start a social sign-in on behalf of the caller.
    ///
    /// Never fails: every error becomes a redirect to the resolved callback
    /// URL with `error=oauth_init_failed`.
    #[tracing::instrument(skip_all, fields(provider = tracing::field::Empty))]
    pub async fn initiate(
        &self,
        params: InitiationParams,
        caller: &CallerContext,
    ) -> InitiationOutcome {
        let request = params.into_request(&self.default_provider);
        tracing::Span::current().record("provider", request.provider.as_str());

        let callback = resolve_callback_url(
            &request.callback_url,
            caller.origin.as_deref(),
            caller.referer.as_deref(),
            &self.default_origin,
        );

        match self.delegate(&request, &callback, caller).await {
            Ok((location, cookies)) => {
                OAUTH_INIT_TOTAL.with_label_values(&["redirected"]).inc();
                FORWARDED_COOKIES_TOTAL.inc_by(cookies.len() as u64);
                tracing::info!(
                    cookies = cookies.len(),
                    cookie_names = ?cookies.iter().filter_map(RewrittenCookie::name).collect::<Vec<_>>(),
                    "Redirecting to provider"
                );
                InitiationOutcome::Redirecting { location, cookies }
            }
            Err(error) => {
                OAUTH_INIT_TOTAL.with_label_values(&[error.kind()]).inc();
                tracing::warn!(
                    kind = error.kind(),
                    description = error.description(),
                    callback = %callback,
                    "OAuth initiation failed"
                );
                let location = error_location(&callback, error.description()).to_string();
                InitiationOutcome::Failed { location }
            }
        }
    }

    async fn delegate(
        &self,
        request: &InitiationRequest,
        callback: &Url,
        caller: &CallerContext,
    ) -> Result<(String, Vec<RewrittenCookie>), InitError> {
        if !self.providers.is_empty() && !self.providers.contains(&request.provider) {
            return Err(InitError::MalformedInput(format!(
                "Unsupported provider: {}",
                request.provider
            )));
        }

        if caller.cookie.is_some() {
            tracing::debug!(cookies = caller.cookie_count, "Forwarding caller cookies");
        }

        let payload = SocialSignInRequest {
            provider: request.provider.clone(),
            callback_url: callback.to_string(),
            error_callback_url: request.error_callback_url.clone(),
        };

        let response = self
            .authority
            .sign_in_social(&payload, caller.cookie.as_ref())
            .await?;

        let Some(redirect_url) = response.redirect_url else {
            return Err(InitError::AuthorityError(
                response
                    .error_message
                    .unwrap_or_else(|| NO_REDIRECT_URL.to_string()),
            ));
        };

        Url::parse(&redirect_url).map_err(|e| {
            InitError::AuthorityError(format!("Invalid redirect URL from auth: {e}"))
        })?;
        if HeaderValue::from_str(&redirect_url).is_err() {
            return Err(InitError::AuthorityError(
                "Invalid redirect URL from auth".to_string(),
            ));
        }

        let mut cookies = Vec::with_capacity(response.set_cookies.len());
        for raw in &response.set_cookies {
            let cookie = rewrite_for_cross_origin(raw.as_bytes());
            if cookie.to_header_value().is_none() {
                tracing::warn!("Dropping authority cookie that is not a valid header value");
                continue;
            }
            cookies.push(cookie);
        }

        Ok((redirect_url, cookies))
    }
}
