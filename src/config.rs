//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use url::Url;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub authority: AuthorityConfig,
    pub oauth: OAuthConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Maximum accepted request body size
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_body_limit_bytes() -> usize {
    64 * 1024
}

/// Session authority the relay delegates sign-in to
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the authority (e.g., "https://auth.internal:3001")
    pub base_url: String,
    /// Path of the social sign-in endpoint, appended to `base_url`
    pub sign_in_path: String,
    /// Upper bound for one delegation call
    pub timeout_seconds: u64,
    /// User-Agent sent on every outbound request
    pub user_agent: String,
    /// Extra headers sent on every outbound request
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

impl AuthorityConfig {
    /// Full URL of the social sign-in endpoint.
    ///
    /// The path is appended to the base URL verbatim so that a base URL
    /// with its own path prefix keeps it.
    pub fn sign_in_url(&self) -> Result<Url, crate::error::AppError> {
        let joined = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.sign_in_path
        );
        Url::parse(&joined).map_err(|e| {
            crate::error::AppError::Config(format!(
                "authority sign-in URL {joined:?} is invalid: {e}"
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// OAuth initiation defaults
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Provider used when the request names none
    pub default_provider: String,
    /// Origin used to resolve relative callback URLs when the request
    /// carries neither `Origin` nor `Referer`
    pub default_origin: String,
    /// Providers the relay forwards; empty means any
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Cross-origin policy
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Origins echoed back; empty means echo any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime
    pub max_age_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHRELAY__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.body_limit_bytes", 65536)?
            .set_default("authority.base_url", "http://localhost:3001")?
            .set_default("authority.sign_in_path", "/api/auth/sign-in/social")?
            .set_default("authority.timeout_seconds", 10)?
            .set_default(
                "authority.user_agent",
                concat!("authrelay/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("oauth.default_provider", "github")?
            .set_default("oauth.default_origin", "http://localhost:3000")?
            .set_default("cors.max_age_seconds", 86400)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHRELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("oauth.providers"),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Parsed fallback origin for callback resolution.
    pub fn default_origin(&self) -> Result<Url, crate::error::AppError> {
        parse_http_url("oauth.default_origin", &self.oauth.default_origin)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        parse_http_url("authority.base_url", &self.authority.base_url)?;
        self.default_origin()?;

        if !self.authority.sign_in_path.starts_with('/') {
            return Err(AppError::Config(
                "authority.sign_in_path must start with '/'".to_string(),
            ));
        }
        self.authority.sign_in_url()?;

        if self.authority.timeout_seconds == 0 {
            return Err(AppError::Config(
                "authority.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, value) in &self.authority.default_headers {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AppError::Config(format!(
                    "authority.default_headers: invalid header name {name:?}"
                ))
            })?;
            http::HeaderValue::from_str(value).map_err(|_| {
                AppError::Config(format!(
                    "authority.default_headers: invalid value for {name:?}"
                ))
            })?;
        }

        if self.oauth.default_provider.trim().is_empty() {
            return Err(AppError::Config(
                "oauth.default_provider must not be empty".to_string(),
            ));
        }

        for origin in &self.cors.allowed_origins {
            http::HeaderValue::from_str(origin).map_err(|_| {
                AppError::Config(format!("cors.allowed_origins: invalid origin {origin:?}"))
            })?;
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn parse_http_url(key: &str, value: &str) -> Result<Url, crate::error::AppError> {
    let url = Url::parse(value.trim()).map_err(|e| {
        crate::error::AppError::Config(format!("{key} must be an absolute URL: {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(crate::error::AppError::Config(format!(
            "{key} must use http or https"
        )));
    }

    Ok(url)
}
