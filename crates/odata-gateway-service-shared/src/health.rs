//! Health check handlers for Kubernetes probes.
//!
//! `/health/live` always answers 200. `/health/ready` answers 503 until backend
//! credentials are configured, since every execute call would fail without them.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health status response for liveness and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Status indicator: "ok" or "not_ready: <reason>".
    pub status: String,

    /// Service name for identification.
    pub service: String,

    /// Service version from build-time.
    pub version: String,

    /// Default SAP client used when a request does not override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sap_client: Option<String>,

    /// Whether a token endpoint is configured for `auth_type=auto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_configured: Option<bool>,
}

impl HealthStatus {
    /// Create a healthy liveness status.
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            sap_client: None,
            token_endpoint_configured: None,
        }
    }

    /// Create a ready status with backend configuration details.
    pub fn ready(service: &str, version: &str, sap_client: &str, token_endpoint: bool) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            sap_client: Some(sap_client.to_string()),
            token_endpoint_configured: Some(token_endpoint),
        }
    }

    /// Create a not-ready status.
    pub fn not_ready(service: &str, version: &str, reason: &str) -> Self {
        Self {
            status: format!("not_ready: {}", reason),
            service: service.to_string(),
            version: version.to_string(),
            sap_client: None,
            token_endpoint_configured: None,
        }
    }
}

/// Liveness probe handler.
///
/// ```text
/// GET /health/live
/// {"status":"ok","service":"odata-gateway-service-shared","version":"0.1.0"}
/// ```
pub async fn health_live() -> impl IntoResponse {
    let status = HealthStatus::alive(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// Readiness probe handler.
///
/// ```text
/// GET /health/ready
/// {"status":"ok","service":"odata-gateway-service-shared","version":"0.1.0","sap_client":"100","token_endpoint_configured":false}
/// ```
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    let config = state.config();

    if !config.credentials_configured() {
        let status = HealthStatus::not_ready(service, version, "SAP credentials not configured");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    let status = HealthStatus::ready(
        service,
        version,
        &config.sap_client,
        config.auth_url.is_some(),
    );
    (StatusCode::OK, Json(status)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_state, unconfigured_state};

    #[test]
    fn test_health_status_alive() {
        let status = HealthStatus::alive("test-service", "1.0.0");
        assert_eq!(status.status, "ok");
        assert_eq!(status.service, "test-service");
        assert!(status.sap_client.is_none());
    }

    #[test]
    fn test_health_status_not_ready() {
        let status = HealthStatus::not_ready("test-service", "1.0.0", "no credentials");
        assert!(status.status.starts_with("not_ready:"));
        assert!(status.status.contains("no credentials"));
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus::alive("gateway", "0.1.0");
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(!json.contains("sap_client"));
    }

    #[tokio::test]
    async fn test_ready_with_credentials() {
        let response = health_ready(State(test_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_ready_without_credentials() {
        let response = health_ready(State(unconfigured_state())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
