use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

pub const DEFAULT_SAP_CLIENT: &str = "100";
pub const DEFAULT_SAP_LANGUAGE: &str = "EN";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Backend defaults injected into the orchestrator and auth provider.
///
/// Built from the environment by the service binary and by hand in tests.
/// The password is held as a secret and is redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub sap_client: String,
    pub sap_language: String,
    /// Token endpoint used by `auth_type=auto`.
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sap_client: DEFAULT_SAP_CLIENT.to_string(),
            sap_language: DEFAULT_SAP_LANGUAGE.to_string(),
            auth_url: None,
            username: None,
            password: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    /// Read `SAP_CLIENT`, `SAP_LANGUAGE`, `SAP_AUTH_URL`, `SAP_USERNAME`,
    /// `SAP_PASSWORD` and `ODATA_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();
        let request_timeout = match read("ODATA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(Error::validation(
                        "ODATA_REQUEST_TIMEOUT_SECS",
                        format!("'{}' is not a positive number of seconds", raw),
                    ))
                }
            },
            None => defaults.request_timeout,
        };

        if let Some(url) = read("SAP_AUTH_URL") {
            crate::url::validate_absolute_url(&url)?;
        }

        Ok(Self {
            sap_client: read("SAP_CLIENT").unwrap_or(defaults.sap_client),
            sap_language: read("SAP_LANGUAGE").unwrap_or(defaults.sap_language),
            auth_url: read("SAP_AUTH_URL"),
            username: read("SAP_USERNAME"),
            password: read("SAP_PASSWORD").map(SecretString::from),
            request_timeout,
        })
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn credentials_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[("SAP_CLIENT", "  ")])).unwrap();
        assert_eq!(config.sap_client, "100");
        assert_eq!(config.sap_language, "EN");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.credentials_configured());
    }

    #[test]
    fn reads_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("SAP_CLIENT", "200"),
            ("SAP_LANGUAGE", "ES"),
            ("SAP_AUTH_URL", "https://auth.example.com/token"),
            ("SAP_USERNAME", "svc"),
            ("SAP_PASSWORD", "hunter2"),
            ("ODATA_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.sap_client, "200");
        assert_eq!(config.sap_language, "ES");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.credentials_configured());
        assert_eq!(
            config.password.as_ref().map(|p| p.expose_secret().to_string()),
            Some("hunter2".to_string())
        );
    }

    #[test]
    fn password_is_redacted_from_debug() {
        let config = GatewayConfig::default().with_credentials("svc", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        for raw in ["0", "soon"] {
            let err = GatewayConfig::from_lookup(lookup(&[("ODATA_REQUEST_TIMEOUT_SECS", raw)]))
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }
    }
}
