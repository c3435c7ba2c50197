//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use authrelay::{AppState, config};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const SIGN_IN_PATH: &str = "/api/auth/sign-in/social";
pub const PROVIDER_URL: &str = "https://github.com/login/oauth/authorize?client_id=abc&state=xyz";

/// How the mock authority answers the next sign-in calls
#[derive(Debug, Clone)]
pub enum AuthorityBehaviour {
    /// 200 with `{"url": ..., "redirect": true}` and the given Set-Cookie values
    Redirect { url: String, cookies: Vec<String> },
    /// Given status with a JSON body
    Json(u16, Value),
    /// Given status with a plain-text body
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
    /// Sleep, then behave like the default redirect
    Hang(Duration),
}

impl Default for AuthorityBehaviour {
    fn default() -> Self {
        AuthorityBehaviour::Redirect {
            url: PROVIDER_URL.to_string(),
            cookies: vec![
                "better-auth.state=abc123; Path=/; HttpOnly; SameSite=Lax; Max-Age=600".to_string(),
                "__Secure-pkce=verifier; Path=/; HttpOnly".to_string(),
            ],
        }
    }
}

/// One call received by the mock authority
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    behaviour: Arc<Mutex<AuthorityBehaviour>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

/// Scripted session authority on a random local port
pub struct MockAuthority {
    pub addr: String,
    state: MockState,
}

impl MockAuthority {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route(SIGN_IN_PATH, post(sign_in_social))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub async fn respond_with(&self, behaviour: AuthorityBehaviour) {
        *self.state.behaviour.lock().await = behaviour;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().await.clone()
    }

    pub async fn last_call(&self) -> RecordedCall {
        self.calls()
            .await
            .pop()
            .expect("mock authority received no calls")
    }
}

async fn sign_in_social(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    };
    state.calls.lock().await.push(RecordedCall {
        cookie: text(header::COOKIE),
        user_agent: text(header::USER_AGENT),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
            })
            .collect(),
        body,
    });

    let behaviour = state.behaviour.lock().await.clone();
    match behaviour {
        AuthorityBehaviour::Redirect { url, cookies } => redirect_response(&url, &cookies),
        AuthorityBehaviour::Json(status, body) => {
            (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
        }
        AuthorityBehaviour::Status(status) => {
            (StatusCode::from_u16(status).unwrap(), "upstream failure").into_response()
        }
        AuthorityBehaviour::Garbage => {
            (StatusCode::OK, "<html>definitely not json</html>").into_response()
        }
        AuthorityBehaviour::Hang(delay) => {
            tokio::time::sleep(delay).await;
            redirect_response(PROVIDER_URL, &[])
        }
    }
}

fn redirect_response(url: &str, cookies: &[String]) -> Response {
    let mut response = Json(json!({ "url": url, "redirect": true })).into_response();
    for cookie in cookies {
        response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_bytes(cookie.as_bytes()).unwrap());
    }
    response
}

/// Relay configuration pointing at `authority_url`
pub fn test_config(authority_url: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            body_limit_bytes: 65536,
        },
        authority: config::AuthorityConfig {
            base_url: authority_url.to_string(),
            sign_in_path: SIGN_IN_PATH.to_string(),
            timeout_seconds: 5,
            user_agent: "authrelay-test".to_string(),
            default_headers: HashMap::new(),
        },
        oauth: config::OAuthConfig {
            default_provider: "github".to_string(),
            default_origin: "http://localhost:3000".to_string(),
            providers: Vec::new(),
        },
        cors: config::CorsConfig {
            allowed_origins: Vec::new(),
            max_age_seconds: 86400,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub authority: MockAuthority,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server backed by a fresh mock authority
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, adjusting the configuration first
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        authrelay::metrics::init_metrics();

        let authority = MockAuthority::start().await;
        let mut config = test_config(&authority.addr);
        adjust(&mut config);

        let state = AppState::new(config).unwrap();

        // Redirects are asserted, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let app = authrelay::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            state,
            authority,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// Address on which nothing is listening
pub async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    addr
}

/// `Location` of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .expect("response has no Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Decoded query parameter of a URL
pub fn query_param(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// All `Set-Cookie` values of a response, in order, decoded as UTF-8
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .map(|value| String::from_utf8(value.as_bytes().to_vec()).unwrap())
        .collect()
}
