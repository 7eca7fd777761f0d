//! Shared HTTP infrastructure for the OData gateway service.
//!
//! - [`AppState`]: the orchestrator and its collaborators, plus the shutdown token
//! - [`health`]: liveness/readiness handlers
//! - [`ProblemDetails`]: RFC 9457 error bodies, mapped from library errors
//! - [`ServiceResponse`]: the `{data, metadata}` presenter with JSON/XML output
//! - [`metrics`]: Prometheus recorder and gateway counters
//! - [`logging`]: JSON or text `tracing` setup
//! - [`middleware`]: request ids, request spans, HTTP metrics and CORS
//! - Query and body decoding with validation for each endpoint
//!
//! # Architecture
//!
//! Handlers stay thin; URL compilation, parsing, execution and response
//! normalization all live in `odata-gateway-lib`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Decode query string and JSON body                        │
//! │  - Validate parameters                                      │
//! │  - Call the Orchestrator                                    │
//! │  - Present result as JSON/XML or ProblemDetails             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! [`test_utils`] builds state around mock collaborators. Enable the
//! `test-utils` feature to use it from dependent crates.

mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
mod request;
mod response;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use health::{health_live, health_ready, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    call_mode, error_outcome, init_metrics, metrics_handler, record_backend_status,
    record_odata_call, MetricsConfig, MetricsError,
};
pub use middleware::{
    cors_layer, extract_or_generate_request_id, status_bucket, MetricsLayer, RequestId,
    REQUEST_ID_HEADER,
};
pub use problem::{
    from_lib_error, ProblemDetails, PROBLEM_BACKEND_UNAVAILABLE, PROBLEM_BAD_REQUEST,
    PROBLEM_FORBIDDEN, PROBLEM_INTERNAL_ERROR, PROBLEM_INVALID_REQUEST, PROBLEM_NOT_FOUND,
    PROBLEM_REQUEST_CANCELLED, PROBLEM_UNAUTHORIZED,
};
pub use request::{call_from_body, generation_from_body, ExecuteQuery, ParseUrlQuery, Validate};
pub use response::{value_to_xml, ResponseFormat, ResponseMetadata, ServiceResponse};
pub use state::{AppState, AppStateError};
