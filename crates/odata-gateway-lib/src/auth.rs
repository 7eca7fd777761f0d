//! Outbound authentication headers.
//!
//! `basic` sends HTTP Basic credentials. `auto` asks the configured token
//! endpoint for a bearer token, caches it per user and client, and falls back
//! to basic credentials when no token can be obtained.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{AuthError, Error, Result};

const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Basic,
    Auto,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Basic => "basic",
            AuthType::Auto => "auto",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthType::Basic),
            "auto" => Ok(AuthType::Auto),
            other => Err(Error::validation(
                "auth_type",
                format!("unsupported auth type '{}'; expected basic or auto", other),
            )),
        }
    }
}

/// Per-call backend context the credentials are issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsContext {
    pub sap_client: String,
    pub sap_language: String,
}

impl CredentialsContext {
    /// Configured defaults, overridden by request-level values when present.
    pub fn resolve(config: &GatewayConfig, client: Option<&str>, language: Option<&str>) -> Self {
        let pick = |value: Option<&str>, default: &str| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            sap_client: pick(client, &config.sap_client),
            sap_language: pick(language, &config.sap_language),
        }
    }
}

/// Produces outbound auth headers for a call.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn headers(
        &self,
        auth_type: AuthType,
        context: &CredentialsContext,
    ) -> std::result::Result<Vec<(String, String)>, AuthError>;
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Basic and token-based auth against an SAP gateway.
pub struct SapAuthProvider {
    client: reqwest::Client,
    auth_url: Option<String>,
    username: Option<String>,
    password: Option<SecretString>,
    token_ttl: Duration,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl fmt::Debug for SapAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SapAuthProvider")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl SapAuthProvider {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AuthError::Provider(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &GatewayConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            auth_url: config.auth_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token_ttl: TOKEN_TTL,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    fn credentials(&self, auth_type: AuthType) -> std::result::Result<(&str, &SecretString), AuthError> {
        match (self.username.as_deref(), self.password.as_ref()) {
            (Some(user), Some(password)) if !user.is_empty() => Ok((user, password)),
            _ => Err(AuthError::MissingCredentials {
                mode: auth_type.to_string(),
            }),
        }
    }

    fn cache_key(user: &str, context: &CredentialsContext) -> String {
        format!("{}_{}", user, context.sap_client)
    }

    fn cached_token(&self, key: &str) -> Option<String> {
        let mut tokens = self.tokens.lock();
        match tokens.get(key) {
            Some(cached) if cached.expires_at > Instant::now() => {
                Some(cached.token.expose_secret().to_string())
            }
            Some(_) => {
                tokens.remove(key);
                None
            }
            None => None,
        }
    }

    fn store_token(&self, key: String, token: &str) {
        self.tokens.lock().insert(
            key,
            CachedToken {
                token: SecretString::from(token.to_string()),
                expires_at: Instant::now() + self.token_ttl,
            },
        );
    }

    async fn bearer_token(
        &self,
        user: &str,
        password: &SecretString,
        context: &CredentialsContext,
    ) -> Option<String> {
        let auth_url = self.auth_url.as_deref()?;
        let key = Self::cache_key(user, context);
        if let Some(token) = self.cached_token(&key) {
            debug!(client = %context.sap_client, "using cached SAP token");
            return Some(token);
        }

        let body = json!({
            "username": user,
            "password": password.expose_secret(),
            "client": context.sap_client,
        });
        let response = match self.client.post(auth_url).json(&body).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err.without_url(), "SAP token request failed; falling back to basic auth");
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            warn!(status = %response.status(), "SAP token endpoint refused; falling back to basic auth");
            return None;
        }

        #[derive(Deserialize)]
        struct TokenReply {
            access_token: Option<String>,
            token: Option<String>,
        }

        match response.json::<TokenReply>().await {
            Ok(reply) => {
                let token = reply
                    .access_token
                    .or(reply.token)
                    .filter(|token| !token.is_empty())?;
                self.store_token(key, &token);
                Some(token)
            }
            Err(err) => {
                warn!(error = %err.without_url(), "SAP token reply was not JSON; falling back to basic auth");
                None
            }
        }
    }
}

fn basic_value(user: &str, password: &SecretString) -> String {
    let raw = format!("{}:{}", user, password.expose_secret());
    format!("Basic {}", STANDARD.encode(raw))
}

fn finish_headers(
    authorization: String,
    context: &CredentialsContext,
) -> std::result::Result<Vec<(String, String)>, AuthError> {
    let headers = vec![
        ("Authorization".to_string(), authorization),
        ("sap-client".to_string(), context.sap_client.clone()),
        ("sap-language".to_string(), context.sap_language.clone()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ];
    for (name, value) in &headers {
        if HeaderValue::from_str(value).is_err() {
            return Err(AuthError::InvalidHeader { name: name.clone() });
        }
    }
    Ok(headers)
}

#[async_trait]
impl AuthProvider for SapAuthProvider {
    async fn headers(
        &self,
        auth_type: AuthType,
        context: &CredentialsContext,
    ) -> std::result::Result<Vec<(String, String)>, AuthError> {
        let (user, password) = self.credentials(auth_type)?;

        if auth_type == AuthType::Auto {
            if let Some(token) = self.bearer_token(user, password, context).await {
                return finish_headers(format!("Bearer {}", token), context);
            }
        }
        finish_headers(basic_value(user, password), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CredentialsContext {
        CredentialsContext::resolve(&GatewayConfig::default(), None, None)
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn auth_type_parses_case_insensitively() {
        assert_eq!("AUTO".parse::<AuthType>().unwrap(), AuthType::Auto);
        assert!("oauth".parse::<AuthType>().is_err());
    }

    #[test]
    fn context_prefers_request_overrides() {
        let config = GatewayConfig::default();
        let ctx = CredentialsContext::resolve(&config, Some("300"), Some(" "));
        assert_eq!(ctx.sap_client, "300");
        assert_eq!(ctx.sap_language, "EN");
    }

    #[tokio::test]
    async fn basic_headers_encode_credentials() {
        let config = GatewayConfig::default().with_credentials("user", "pass");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new());
        let headers = provider.headers(AuthType::Basic, &context()).await.unwrap();
        assert_eq!(header(&headers, "Authorization"), Some("Basic dXNlcjpwYXNz"));
        assert_eq!(header(&headers, "sap-client"), Some("100"));
        assert_eq!(header(&headers, "sap-language"), Some("EN"));
        assert_eq!(header(&headers, "Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn missing_credentials_fail() {
        let provider = SapAuthProvider::with_client(&GatewayConfig::default(), reqwest::Client::new());
        let err = provider.headers(AuthType::Auto, &context()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { ref mode } if mode == "auto"));

        let config = GatewayConfig::default().with_credentials("", "hunter2-secret");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new());
        let err = provider.headers(AuthType::Basic, &context()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { .. }));
        assert!(!err.to_string().contains("hunter2-secret"));
        assert!(!format!("{err:?}").contains("hunter2-secret"));
    }

    #[tokio::test]
    async fn auto_without_token_endpoint_falls_back_to_basic() {
        let config = GatewayConfig::default().with_credentials("user", "pass");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new());
        let headers = provider.headers(AuthType::Auto, &context()).await.unwrap();
        assert!(header(&headers, "Authorization").unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn auto_uses_cached_token() {
        let config = GatewayConfig::default()
            .with_credentials("user", "pass")
            .with_auth_url("https://auth.invalid/token");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new());
        provider.store_token("user_100".to_string(), "tok-123");
        let headers = provider.headers(AuthType::Auto, &context()).await.unwrap();
        assert_eq!(header(&headers, "Authorization"), Some("Bearer tok-123"));
    }

    #[test]
    fn expired_tokens_are_evicted() {
        let config = GatewayConfig::default().with_credentials("user", "pass");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new())
            .with_token_ttl(Duration::ZERO);
        provider.store_token("user_100".to_string(), "stale");
        assert!(provider.cached_token("user_100").is_none());
    }

    #[test]
    fn debug_output_hides_password() {
        let config = GatewayConfig::default().with_credentials("user", "s3cret");
        let provider = SapAuthProvider::with_client(&config, reqwest::Client::new());
        assert!(!format!("{provider:?}").contains("s3cret"));
    }
}
