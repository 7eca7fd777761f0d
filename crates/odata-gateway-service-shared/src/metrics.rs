//! Prometheus metrics for the gateway service.
//!
//! HTTP-level series are recorded by [`MetricsLayer`](crate::MetricsLayer).
//! The helpers here record gateway outcomes:
//!
//! - `odata_calls_total{mode, outcome}`
//! - `odata_backend_status_total{bucket}`
//!
//! ```no_run
//! use odata_gateway_service_shared::metrics::{init_metrics, metrics_handler, MetricsConfig};
//! use axum::{routing::get, Router};
//!
//! init_metrics(&MetricsConfig::default()).expect("failed to initialize metrics");
//! let app: Router = Router::new().route("/metrics", get(metrics_handler));
//! ```

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use odata_gateway_lib::{Error as LibError, ODataCall};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Path the binary mounts [`metrics_handler`] on.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Reads `METRICS_ENABLED` (anything but `false` enables) and `METRICS_PATH`.
    pub fn from_env() -> Self {
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let path = std::env::var("METRICS_PATH")
            .ok()
            .filter(|p| p.starts_with('/'))
            .unwrap_or_else(|| "/metrics".to_string());

        Self { enabled, path }
    }
}

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)
}

/// Returns `None` until [`init_metrics`] has run.
fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Prometheus exposition text for `GET /metrics`.
pub async fn metrics_handler() -> String {
    prometheus_handle()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

#[derive(Debug, Clone)]
pub enum MetricsError {
    Disabled,
    AlreadyInitialized,
    InstallFailed(String),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Disabled => write!(f, "metrics are disabled"),
            MetricsError::AlreadyInitialized => write!(f, "metrics recorder already initialized"),
            MetricsError::InstallFailed(e) => {
                write!(f, "failed to install metrics recorder: {}", e)
            }
        }
    }
}

impl std::error::Error for MetricsError {}

// =============================================================================
// Gateway Metrics Helpers
// =============================================================================

/// Label for the request shape: `structured`, `direct` or `target`.
pub fn call_mode(call: &ODataCall) -> &'static str {
    match call {
        ODataCall::Structured(_) => "structured",
        ODataCall::Direct(_) => "direct",
        ODataCall::Target(_) => "target",
    }
}

/// Outcome label for a failed gateway operation.
pub fn error_outcome(error: &LibError) -> &'static str {
    match error {
        err if err.is_client_error() => "invalid_request",
        LibError::Auth(_) => "auth_error",
        LibError::Transport(err) => err.kind(),
        LibError::Cancelled => "cancelled",
        LibError::MalformedResponse { .. } => "malformed_response",
        _ => "internal_error",
    }
}

/// Increment `odata_calls_total`.
///
/// * `mode` - `structured`, `direct`, `generate` or `parse`
/// * `outcome` - `success`, `backend_error` or an [`error_outcome`] label
pub fn record_odata_call(mode: &str, outcome: &str) {
    metrics::counter!(
        "odata_calls_total",
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment `odata_backend_status_total` with the backend status bucket.
pub fn record_backend_status(status: u16) {
    metrics::counter!(
        "odata_backend_status_total",
        "bucket" => crate::middleware::status_bucket(status)
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_gateway_lib::TransportError;
    use serde_json::json;

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.path, "/metrics");
    }

    #[test]
    fn test_disabled_config_is_rejected() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(matches!(init_metrics(&config), Err(MetricsError::Disabled)));
    }

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let output = metrics_handler().await;
        assert!(output.contains('#') || output.is_empty());
    }

    #[test]
    fn test_call_mode_labels() {
        let direct = ODataCall::from_value(json!({"full_url": "https://s.com/SRV/A"})).unwrap();
        assert_eq!(call_mode(&direct), "direct");

        let structured = ODataCall::from_value(json!({"source_entity": "A"})).unwrap();
        assert_eq!(call_mode(&structured), "structured");

        let target = ODataCall::from_value(json!({"target_entity": "B", "payload": {}})).unwrap();
        assert_eq!(call_mode(&target), "target");
    }

    #[test]
    fn test_error_outcome_labels() {
        assert_eq!(error_outcome(&LibError::Cancelled), "cancelled");
        assert_eq!(
            error_outcome(&LibError::Transport(TransportError::Dns {
                detail: "x".to_string()
            })),
            "dns"
        );
        assert_eq!(
            error_outcome(&LibError::InvalidNavigation {
                index: 0,
                reason: "x".to_string()
            }),
            "invalid_request"
        );
    }

    #[test]
    fn test_gateway_metrics_record_without_recorder() {
        record_odata_call("structured", "success");
        record_odata_call("direct", "timeout");
        record_backend_status(200);
        record_backend_status(503);
    }

    #[test]
    fn test_metrics_error_display() {
        assert_eq!(MetricsError::Disabled.to_string(), "metrics are disabled");
        let failed = MetricsError::InstallFailed("test error".to_string());
        assert!(failed.to_string().contains("test error"));
    }
}
