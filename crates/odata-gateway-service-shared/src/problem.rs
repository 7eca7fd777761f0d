//! RFC 9457 Problem Details for HTTP APIs.
//!
//! Provides structured error responses following the Problem Details standard.
//! See: <https://www.rfc-editor.org/rfc/rfc9457.html>

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use odata_gateway_lib::{AuthError, Error as LibError};

/// Problem type URI for request bodies that are not valid JSON.
pub const PROBLEM_BAD_REQUEST: &str = "/problems/bad-request";

/// Problem type URI for requests that parse but cannot be compiled or executed.
pub const PROBLEM_INVALID_REQUEST: &str = "/problems/invalid-request";

/// Problem type URI for missing or rejected backend credentials.
pub const PROBLEM_UNAUTHORIZED: &str = "/problems/unauthorized";

/// Problem type URI for callers the auth provider refused.
pub const PROBLEM_FORBIDDEN: &str = "/problems/forbidden";

/// Problem type URI for unknown gateway routes.
pub const PROBLEM_NOT_FOUND: &str = "/problems/not-found";

/// Problem type URI for calls abandoned before the backend answered.
pub const PROBLEM_REQUEST_CANCELLED: &str = "/problems/request-cancelled";

/// Problem type URI for backend calls that could not complete.
pub const PROBLEM_BACKEND_UNAVAILABLE: &str = "/problems/backend-unavailable";

/// Problem type URI for internal server errors.
pub const PROBLEM_INTERNAL_ERROR: &str = "/problems/internal-error";

/// RFC 9457 Problem Details response structure.
///
/// # Example
///
/// ```
/// use odata_gateway_service_shared::{ProblemDetails, PROBLEM_INVALID_REQUEST};
/// use axum::http::StatusCode;
///
/// let problem = ProblemDetails::new(
///     PROBLEM_INVALID_REQUEST,
///     "Invalid Request",
///     StatusCode::UNPROCESSABLE_ENTITY,
/// )
/// .with_detail("invalid request field 'source_entity': must not be empty")
/// .with_request_id("req-12345");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type (relative).
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary of the problem.
    pub title: String,

    /// HTTP status code for this problem.
    pub status: u16,

    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Request id of the failing call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Content type for this response (always "application/problem+json").
    pub content_type: String,
}

impl ProblemDetails {
    /// Create a new ProblemDetails with required fields.
    pub fn new(type_uri: impl Into<String>, title: impl Into<String>, status: StatusCode) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
            instance: None,
            content_type: "application/problem+json".to_string(),
        }
    }

    /// Add a detailed explanation of this specific problem occurrence.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Add the request identifier for tracing.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.instance = Some(request_id.into());
        self
    }

    /// 400 for bodies that are not JSON at all.
    pub fn bad_request(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(PROBLEM_BAD_REQUEST, "Bad Request", StatusCode::BAD_REQUEST)
            .with_detail(detail)
            .with_request_id(request_id)
    }

    /// 422 for request shapes, keys, navigation steps and URLs that fail validation.
    pub fn invalid_request(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .with_detail(detail)
        .with_request_id(request_id)
    }

    pub fn unauthorized(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(PROBLEM_UNAUTHORIZED, "Unauthorized", StatusCode::UNAUTHORIZED)
            .with_detail(detail)
            .with_request_id(request_id)
    }

    pub fn forbidden(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(PROBLEM_FORBIDDEN, "Forbidden", StatusCode::FORBIDDEN)
            .with_detail(detail)
            .with_request_id(request_id)
    }

    /// 404 for paths the gateway does not serve.
    pub fn not_found(path: &str, request_id: impl Into<String>) -> Self {
        Self::new(PROBLEM_NOT_FOUND, "Not Found", StatusCode::NOT_FOUND)
            .with_detail(format!("No endpoint at '{}'", path))
            .with_request_id(request_id)
    }

    pub fn request_cancelled(request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_REQUEST_CANCELLED,
            "Request Cancelled",
            StatusCode::REQUEST_TIMEOUT,
        )
        .with_detail("The request was cancelled before the backend responded")
        .with_request_id(request_id)
    }

    /// 503 for backend calls that timed out or never connected.
    pub fn backend_unavailable(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_BACKEND_UNAVAILABLE,
            "Backend Unavailable",
            StatusCode::SERVICE_UNAVAILABLE,
        )
        .with_detail(detail)
        .with_request_id(request_id)
    }

    /// Create a 500 Internal Server Error problem.
    pub fn internal_error(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INTERNAL_ERROR,
            "Internal Error",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(detail)
        .with_request_id(request_id)
    }
}

impl std::fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.title,
            self.detail.as_deref().unwrap_or("")
        )
    }
}

impl std::error::Error for ProblemDetails {}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Json(&self).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        *response.status_mut() = status;
        response
    }
}

/// Convert library errors to ProblemDetails.
///
/// The `request_id` must be provided separately since library errors don't have it.
pub fn from_lib_error(error: &LibError, request_id: &str) -> ProblemDetails {
    match error {
        err if err.is_client_error() => ProblemDetails::invalid_request(err.to_string(), request_id),
        LibError::Auth(AuthError::PermissionDenied { .. }) => {
            ProblemDetails::forbidden(error.to_string(), request_id)
        }
        LibError::Auth(_) => ProblemDetails::unauthorized(error.to_string(), request_id),
        LibError::Cancelled => ProblemDetails::request_cancelled(request_id),
        LibError::Transport(_) => ProblemDetails::backend_unavailable(error.to_string(), request_id),
        _ => ProblemDetails::internal_error(error.to_string(), request_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_gateway_lib::TransportError;

    #[test]
    fn test_problem_details_new() {
        let problem = ProblemDetails::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::UNPROCESSABLE_ENTITY,
        );
        assert_eq!(problem.type_uri, PROBLEM_INVALID_REQUEST);
        assert_eq!(problem.status, 422);
        assert_eq!(problem.content_type, "application/problem+json");
    }

    #[test]
    fn test_problem_details_serialization() {
        let problem = ProblemDetails::bad_request("Test error", "req-test");
        let json = serde_json::to_string(&problem).unwrap();

        assert!(json.contains("\"type\":\"/problems/bad-request\""));
        assert!(json.contains("\"status\":400"));
        assert!(json.contains("\"detail\":\"Test error\""));
        assert!(json.contains("\"instance\":\"req-test\""));
    }

    #[test]
    fn test_not_found_names_path() {
        let problem = ProblemDetails::not_found("/api/v2/nothing", "req-1");
        assert_eq!(problem.status, 404);
        assert!(problem.detail.as_deref().unwrap().contains("/api/v2/nothing"));
    }

    #[test]
    fn test_client_errors_map_to_422() {
        let errors = [
            LibError::Validation {
                field: "source_entity".to_string(),
                message: "must not be empty".to_string(),
            },
            LibError::InvalidKey {
                field: Some("SalesOrderItem".to_string()),
                reason: "expected an integer".to_string(),
            },
            LibError::InvalidNavigation {
                index: 1,
                reason: "empty entity".to_string(),
            },
            LibError::InvalidUrl {
                url: "ftp://x".to_string(),
                reason: "unsupported scheme".to_string(),
            },
            LibError::MalformedUrl {
                segment: None,
                reason: "no entity".to_string(),
            },
        ];
        for error in &errors {
            let problem = from_lib_error(error, "req-422");
            assert_eq!(problem.status, 422, "{}", error);
            assert_eq!(problem.instance.as_deref(), Some("req-422"));
        }
    }

    #[test]
    fn test_validation_detail_names_field() {
        let error = LibError::Validation {
            field: "source_entity".to_string(),
            message: "must not be empty".to_string(),
        };
        let problem = from_lib_error(&error, "req");
        assert!(problem.detail.as_deref().unwrap().contains("source_entity"));
    }

    #[test]
    fn test_auth_errors() {
        let missing = LibError::Auth(AuthError::MissingCredentials {
            mode: "basic".to_string(),
        });
        assert_eq!(from_lib_error(&missing, "r").status, 401);

        let denied = LibError::Auth(AuthError::PermissionDenied {
            reason: "client 300 not allowed".to_string(),
        });
        let problem = from_lib_error(&denied, "r");
        assert_eq!(problem.status, 403);
        assert_eq!(problem.type_uri, PROBLEM_FORBIDDEN);
    }

    #[test]
    fn test_runtime_errors() {
        assert_eq!(from_lib_error(&LibError::Cancelled, "r").status, 408);

        let transport = LibError::Transport(TransportError::Refused {
            detail: "connection refused".to_string(),
        });
        let problem = from_lib_error(&transport, "r");
        assert_eq!(problem.status, 503);
        assert!(problem.detail.as_deref().unwrap().contains("refused"));

        let malformed = LibError::MalformedResponse {
            reason: "invalid UTF-8".to_string(),
        };
        assert_eq!(from_lib_error(&malformed, "r").status, 500);
    }
}
