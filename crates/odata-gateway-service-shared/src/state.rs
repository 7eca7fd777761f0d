//! Application state for the HTTP service.
//!
//! Handlers reach the [`Orchestrator`] through this state. The orchestrator
//! holds the gateway configuration and the auth and transport collaborators.
//! The shutdown token cancels in-flight backend calls when the server stops.

use std::sync::Arc;

use odata_gateway_lib::{
    AuthProvider, Error as LibError, GatewayConfig, Orchestrator, Transport,
};
use tokio_util::sync::CancellationToken;

/// Error during application state initialization.
#[derive(Debug)]
pub enum AppStateError {
    /// Environment configuration was rejected.
    Config(LibError),

    /// The production collaborators could not be built.
    Collaborators(LibError),
}

impl std::fmt::Display for AppStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid gateway configuration: {}", e),
            Self::Collaborators(e) => write!(f, "failed to build gateway collaborators: {}", e),
        }
    }
}

impl std::error::Error for AppStateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) | Self::Collaborators(e) => Some(e),
        }
    }
}

/// Shared application state for all axum handlers.
///
/// Cheap to clone; share it through axum's `State` extractor.
///
/// ```ignore
/// use axum::{extract::State, routing::post, Router};
/// use odata_gateway_service_shared::AppState;
///
/// async fn handler(State(state): State<AppState>) {
///     let orchestrator = state.orchestrator();
/// }
///
/// let state = AppState::from_env().unwrap();
/// let app = Router::new()
///     .route("/api/v1/execute-odata", post(handler))
///     .with_state(state);
/// ```
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orchestrator: Orchestrator,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build state from `SAP_*` and `ODATA_*` environment variables with the
    /// production auth provider and reqwest transport.
    pub fn from_env() -> Result<Self, AppStateError> {
        let config = GatewayConfig::from_env().map_err(AppStateError::Config)?;
        Self::from_config(config)
    }

    pub fn from_config(config: GatewayConfig) -> Result<Self, AppStateError> {
        tracing::info!(
            sap_client = %config.sap_client,
            sap_language = %config.sap_language,
            token_endpoint = config.auth_url.is_some(),
            credentials = config.credentials_configured(),
            timeout_secs = config.request_timeout.as_secs(),
            "building gateway state"
        );
        let orchestrator =
            Orchestrator::from_config(config).map_err(AppStateError::Collaborators)?;
        Ok(Self::from_orchestrator(orchestrator))
    }

    /// Wire explicit collaborators, e.g. mocks in handler tests.
    pub fn with_collaborators(
        config: GatewayConfig,
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::from_orchestrator(Orchestrator::new(config, auth, transport))
    }

    pub fn from_orchestrator(orchestrator: Orchestrator) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orchestrator,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub fn config(&self) -> &GatewayConfig {
        self.inner.orchestrator.config()
    }

    /// Token for one backend call; cancelled by [`shutdown`](Self::shutdown).
    pub fn call_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Abandon every in-flight backend call.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config();
        f.debug_struct("AppState")
            .field("sap_client", &config.sap_client)
            .field("credentials_configured", &config.credentials_configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_gateway_lib::test_support::{MockTransport, StaticAuthProvider};

    fn mock_state(config: GatewayConfig) -> AppState {
        AppState::with_collaborators(
            config,
            Arc::new(StaticAuthProvider::with_headers([])),
            Arc::new(MockTransport::new()),
        )
    }

    #[test]
    fn test_state_exposes_config() {
        let state = mock_state(GatewayConfig::default().with_credentials("user", "pass"));
        assert_eq!(state.config().sap_client, "100");
        assert!(state.config().credentials_configured());
    }

    #[test]
    fn test_state_clone_shares_orchestrator() {
        let state1 = mock_state(GatewayConfig::default());
        let state2 = state1.clone();
        assert!(std::ptr::eq(state1.orchestrator(), state2.orchestrator()));
    }

    #[test]
    fn test_debug_never_prints_password() {
        let state = mock_state(GatewayConfig::default().with_credentials("user", "hunter2"));
        let debug = format!("{:?}", state);
        assert!(debug.contains("AppState"));
        assert!(debug.contains("credentials_configured"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_shutdown_cancels_call_tokens() {
        let state = mock_state(GatewayConfig::default());
        let token = state.call_token();
        assert!(!token.is_cancelled());

        state.clone().shutdown();
        assert!(token.is_cancelled());
        assert!(state.is_shutting_down());
        assert!(state.call_token().is_cancelled());
    }

    #[test]
    fn test_from_config_builds_production_wiring() {
        let state = AppState::from_config(GatewayConfig::default()).unwrap();
        assert_eq!(state.config().sap_language, "EN");
    }

    #[test]
    fn test_app_state_error_display() {
        let err = AppStateError::Config(LibError::Unexpected("bad".to_string()));
        assert!(err.to_string().contains("invalid gateway configuration"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
