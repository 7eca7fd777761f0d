//! Test utilities for handler testing.
//!
//! Builds [`AppState`] around the library's mock collaborators so handlers
//! run end to end without a backend.

use std::sync::Arc;
use std::time::Duration;

use odata_gateway_lib::test_support::{MockTransport, StaticAuthProvider};
use odata_gateway_lib::GatewayConfig;

use crate::state::AppState;

pub const TEST_USERNAME: &str = "gateway-user";
pub const TEST_PASSWORD: &str = "gateway-pass";

/// `Basic base64(gateway-user:gateway-pass)`.
pub const TEST_AUTHORIZATION: &str = "Basic Z2F0ZXdheS11c2VyOmdhdGV3YXktcGFzcw==";

/// Credentials set and a short backend timeout so a stuck mock fails fast.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_credentials(TEST_USERNAME, TEST_PASSWORD)
        .with_request_timeout(Duration::from_secs(5))
}

/// Auth provider answering with fixed basic-auth headers.
pub fn test_auth() -> Arc<StaticAuthProvider> {
    Arc::new(StaticAuthProvider::with_headers([
        ("Authorization", TEST_AUTHORIZATION),
        ("sap-client", "100"),
        ("sap-language", "EN"),
        ("Content-Type", "application/json"),
    ]))
}

/// State whose transport replays `transport`'s queued responses.
///
/// Keep the returned `Arc` to inspect the requests the handler sent.
pub fn state_with_transport(transport: MockTransport) -> (AppState, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let state = AppState::with_collaborators(test_config(), test_auth(), transport.clone());
    (state, transport)
}

/// Ready state with no canned backend responses.
pub fn test_state() -> AppState {
    state_with_transport(MockTransport::new()).0
}

/// State without credentials, as a freshly deployed service would have.
pub fn unconfigured_state() -> AppState {
    AppState::with_collaborators(
        GatewayConfig::default(),
        test_auth(),
        Arc::new(MockTransport::new()),
    )
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    format!("test-{}", uuid::Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_ready() {
        assert!(test_state().config().credentials_configured());
        assert!(!unconfigured_state().config().credentials_configured());
    }

    #[test]
    fn test_request_id_unique() {
        assert_ne!(test_request_id(), test_request_id());
    }
}
