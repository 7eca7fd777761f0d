//! OData gateway HTTP service.
//!
//! # Endpoints
//!
//! - `POST /api/v1/execute-odata` - Execute a structured or direct OData call
//! - `POST /api/v1/generate-odata-url` - Compile a structured request to a URL
//! - `GET /api/v1/parse-odata-url` - Decompose an OData URL
//! - `GET /api/v1/helpcheck` - Service status in the response envelope
//! - `GET /version` - API version
//! - `GET /metrics` - Prometheus metrics endpoint
//! - `GET /health/live` - Kubernetes liveness probe
//! - `GET /health/ready` - Kubernetes readiness probe
//!
//! Every other path answers 404 problem details.

use axum::{
    routing::{get, post},
    Router,
};

use odata_gateway_service_shared::{
    cors_layer, health_live, health_ready, metrics_handler, AppState, MetricsConfig, MetricsLayer,
};

pub mod handlers;

/// Build the router with every endpoint, the request-id/metrics layer and CORS.
pub fn app(state: AppState, metrics: &MetricsConfig) -> Router {
    let mut router = Router::new()
        .route("/api/v1/execute-odata", post(handlers::execute_odata))
        .route("/api/v1/generate-odata-url", post(handlers::generate_odata_url))
        .route("/api/v1/parse-odata-url", get(handlers::parse_odata_url))
        .route("/api/v1/helpcheck", get(handlers::helpcheck))
        .route("/version", get(handlers::version))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready));

    if metrics.enabled {
        router = router.route(&metrics.path, get(metrics_handler));
    }

    router
        .fallback(handlers::not_found)
        .layer(MetricsLayer)
        .layer(cors_layer())
        .with_state(state)
}
