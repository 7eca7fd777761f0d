//! Request types and validation for HTTP endpoints.
//!
//! Bodies arrive as raw bytes so that every rejection, including malformed
//! JSON, is reported as problem details rather than axum's plain-text
//! rejections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use odata_gateway_lib::{AuthType, ExecuteOptions, ODataCall};

use crate::{from_lib_error, ProblemDetails};

/// Validation trait for request types.
///
/// Implementations should validate all fields and return a `ProblemDetails`
/// error for invalid input.
pub trait Validate {
    /// Validate the request, returning an error if invalid.
    ///
    /// The `request_id` is used to populate the `instance` field of any
    /// returned `ProblemDetails`.
    ///
    /// Returns a boxed `ProblemDetails` to avoid large `Result::Err` variants.
    fn validate(&self, request_id: &str) -> Result<(), Box<ProblemDetails>>;
}

/// Query string of `POST /api/v1/execute-odata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteQuery {
    /// `basic` (default) or `auto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    /// `true` (default) or `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_response: Option<String>,
}

impl ExecuteQuery {
    /// Resolve into orchestrator options, applying defaults.
    pub fn to_options(&self, request_id: &str) -> Result<ExecuteOptions, Box<ProblemDetails>> {
        let mut options = ExecuteOptions::default();

        if let Some(raw) = self.auth_type.as_deref() {
            options.auth_type = raw
                .parse::<AuthType>()
                .map_err(|err| Box::new(from_lib_error(&err, request_id)))?;
        }

        if let Some(raw) = self.parse_response.as_deref() {
            options.parse_response = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(Box::new(ProblemDetails::invalid_request(
                        format!("The 'parse_response' parameter must be true or false, got '{}'", raw),
                        request_id,
                    )))
                }
            };
        }

        Ok(options)
    }
}

/// Query string of `GET /api/v1/parse-odata-url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseUrlQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
}

impl ParseUrlQuery {
    pub fn url(&self) -> &str {
        self.full_url.as_deref().unwrap_or("").trim()
    }
}

impl Validate for ParseUrlQuery {
    fn validate(&self, request_id: &str) -> Result<(), Box<ProblemDetails>> {
        if self.url().is_empty() {
            return Err(Box::new(ProblemDetails::invalid_request(
                "The 'full_url' parameter is required and cannot be empty",
                request_id,
            )));
        }
        Ok(())
    }
}

fn json_body(body: &[u8], request_id: &str) -> Result<Value, Box<ProblemDetails>> {
    serde_json::from_slice(body).map_err(|err| {
        Box::new(ProblemDetails::bad_request(
            format!("Request body is not valid JSON: {}", err),
            request_id,
        ))
    })
}

/// Decode an execute body into either request shape.
pub fn call_from_body(body: &[u8], request_id: &str) -> Result<ODataCall, Box<ProblemDetails>> {
    let value = json_body(body, request_id)?;
    ODataCall::from_value(value).map_err(|err| Box::new(from_lib_error(&err, request_id)))
}

/// Decode a generate body; a raw `full_url` has nothing to compile.
pub fn generation_from_body(
    body: &[u8],
    request_id: &str,
) -> Result<ODataCall, Box<ProblemDetails>> {
    match call_from_body(body, request_id)? {
        ODataCall::Direct(_) => Err(Box::new(ProblemDetails::invalid_request(
            "URL generation needs 'source_entity' or 'target_entity', not 'full_url'",
            request_id,
        ))),
        call => Ok(call),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_query_defaults() {
        let options = ExecuteQuery::default().to_options("test").unwrap();
        assert_eq!(options.auth_type, AuthType::Basic);
        assert!(options.parse_response);
    }

    #[test]
    fn test_execute_query_parses_values() {
        let query = ExecuteQuery {
            auth_type: Some("auto".to_string()),
            parse_response: Some("False".to_string()),
        };
        let options = query.to_options("test").unwrap();
        assert_eq!(options.auth_type, AuthType::Auto);
        assert!(!options.parse_response);
    }

    #[test]
    fn test_execute_query_rejects_unknown_auth_type() {
        let query = ExecuteQuery {
            auth_type: Some("oauth".to_string()),
            parse_response: None,
        };
        let err = query.to_options("test").unwrap_err();
        assert_eq!(err.status, 422);
        assert!(err.detail.as_deref().unwrap().contains("auth_type"));
    }

    #[test]
    fn test_execute_query_rejects_bad_flag() {
        let query = ExecuteQuery {
            auth_type: None,
            parse_response: Some("maybe".to_string()),
        };
        let err = query.to_options("test").unwrap_err();
        assert!(err.detail.as_deref().unwrap().contains("'parse_response'"));
    }

    #[test]
    fn test_parse_url_query_requires_url() {
        let err = ParseUrlQuery { full_url: Some("  ".to_string()) }
            .validate("test")
            .unwrap_err();
        assert!(err.detail.as_deref().unwrap().contains("'full_url'"));
        assert!(ParseUrlQuery::default().validate("test").is_err());
    }

    #[test]
    fn test_non_json_body_is_bad_request() {
        let err = call_from_body(b"not json", "req-1").unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.instance.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_body_shapes() {
        let call = call_from_body(br#"{"full_url":"https://s.com/SRV/A"}"#, "r").unwrap();
        assert!(matches!(call, ODataCall::Direct(_)));

        let err = call_from_body(br#"{"http_method":"GET"}"#, "r").unwrap_err();
        assert_eq!(err.status, 422);
    }

    #[test]
    fn test_generate_rejects_direct_shape() {
        let err = generation_from_body(br#"{"odata_url":"https://s.com/SRV/A"}"#, "r").unwrap_err();
        assert_eq!(err.status, 422);

        let call = generation_from_body(
            br#"{"base_url":"https://s.com","service_name":"SRV","source_entity":"A"}"#,
            "r",
        )
        .unwrap();
        assert!(matches!(call, ODataCall::Structured(ref request) if request.source_entity == "A"));

        let call = generation_from_body(
            br#"{"base_url":"https://s.com","service_name":"SRV","target_entity":"B","payload":{"X":1}}"#,
            "r",
        )
        .unwrap();
        assert!(matches!(call, ODataCall::Target(_)));
    }
}
