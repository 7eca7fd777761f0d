//! OData gateway library entry points.
//!
//! This crate translates structured data-operation requests into OData URLs,
//! parses existing OData URLs back into their components, executes requests
//! through pluggable auth and transport collaborators, and normalizes backend
//! responses. Higher-level consumers (the HTTP service) should only depend on
//! the functions exported here instead of reimplementing behavior.
//!

pub mod auth;
pub mod config;
pub mod error;
pub mod key;
pub mod navigation;
pub mod orchestrator;
pub mod parser;
pub mod query;
pub mod request;
pub mod response;
pub mod transport;
pub mod url;
pub mod xml;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use auth::{AuthProvider, AuthType, CredentialsContext, SapAuthProvider};
pub use config::GatewayConfig;
pub use error::{AuthError, Error, Result, TransportError};
pub use key::{EntityKey, KeyField, KeyFormatter, KeyValue};
pub use navigation::{
    compile_navigation, NavigationChain, NavigationProperty, NavigationStep, ResourcePath,
    StepFilter,
};
pub use orchestrator::{ExecuteOptions, ExecutionResult, GeneratedUrl, Orchestrator};
pub use parser::{parse_odata_url, ParsedODataUrl};
pub use query::{compile_query, QueryOptions};
pub use request::{DirectRequest, HttpMethod, ODataCall, ODataRequest, TargetEntityRequest};
pub use response::{
    normalize_response, EntityRecord, NormalizedResponse, ODataPayload, RawFormat,
};
pub use transport::{OutboundRequest, ReqwestTransport, Transport, TransportResponse};
pub use crate::url::{assemble_url, validate_absolute_url};
