//! Endpoint handlers. Each one decodes, calls the orchestrator and presents.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use odata_gateway_lib::{Error as LibError, ExecuteOptions};
use odata_gateway_service_shared::{
    call_from_body, call_mode, error_outcome, from_lib_error, record_backend_status,
    record_odata_call, generation_from_body, AppState, ExecuteQuery, ParseUrlQuery,
    ProblemDetails, RequestId, ServiceResponse, Validate,
};

/// Version reported by `GET /version`.
pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub status: &'static str,
}

fn rejected(mode: &str, problem: Box<ProblemDetails>) -> Response {
    record_odata_call(mode, "invalid_request");
    (*problem).into_response()
}

fn failed(mode: &str, error: &LibError, request_id: &RequestId) -> Response {
    let problem = from_lib_error(error, request_id.as_str());
    if problem.status >= 500 {
        warn!(request_id = %request_id, mode, error = %error, "gateway operation failed");
    } else {
        info!(request_id = %request_id, mode, error = %error, "gateway operation rejected");
    }
    record_odata_call(mode, error_outcome(error));
    problem.into_response()
}

fn query_problem(rejection: QueryRejection, request_id: &RequestId) -> Box<ProblemDetails> {
    Box::new(ProblemDetails::invalid_request(
        rejection.body_text(),
        request_id.as_str(),
    ))
}

/// `POST /api/v1/execute-odata?auth_type=basic|auto&parse_response=true|false`
///
/// Backend failures still answer 200; the envelope's `success` and
/// `status_code` carry the backend outcome.
pub async fn execute_odata(
    State(state): State<AppState>,
    request_id: RequestId,
    query: Result<Query<ExecuteQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected("execute", query_problem(rejection, &request_id)),
    };
    let options = match query.to_options(request_id.as_str()) {
        Ok(options) => ExecuteOptions {
            cancel: Some(state.call_token()),
            ..options
        },
        Err(problem) => return rejected("execute", problem),
    };
    let call = match call_from_body(&body, request_id.as_str()) {
        Ok(call) => call,
        Err(problem) => return rejected("execute", problem),
    };

    let mode = call_mode(&call);
    info!(
        request_id = %request_id,
        mode,
        method = %call.http_method(),
        auth_type = %options.auth_type,
        "handling execute request"
    );

    match state.orchestrator().execute(call, options).await {
        Ok(result) => {
            record_backend_status(result.response.status_code);
            let outcome = if result.response.success {
                "success"
            } else {
                "backend_error"
            };
            record_odata_call(mode, outcome);
            ServiceResponse::new(result)
                .negotiated(&headers)
                .into_response()
        }
        Err(err) => failed(mode, &err, &request_id),
    }
}

/// `POST /api/v1/generate-odata-url`
pub async fn generate_odata_url(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = match generation_from_body(&body, request_id.as_str()) {
        Ok(call) => call,
        Err(problem) => return rejected("generate", problem),
    };

    match state.orchestrator().generate(&call) {
        Ok(generated) => {
            record_odata_call("generate", "success");
            ServiceResponse::new(generated)
                .negotiated(&headers)
                .into_response()
        }
        Err(err) => failed("generate", &err, &request_id),
    }
}

/// `GET /api/v1/parse-odata-url?full_url=...`
pub async fn parse_odata_url(
    State(state): State<AppState>,
    request_id: RequestId,
    query: Result<Query<ParseUrlQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected("parse", query_problem(rejection, &request_id)),
    };
    if let Err(problem) = query.validate(request_id.as_str()) {
        return rejected("parse", problem);
    }

    match state.orchestrator().parse_url(query.url()) {
        Ok(parsed) => {
            record_odata_call("parse", "success");
            ServiceResponse::new(parsed)
                .negotiated(&headers)
                .into_response()
        }
        Err(err) => failed("parse", &err, &request_id),
    }
}

/// `GET /api/v1/helpcheck`
pub async fn helpcheck(headers: HeaderMap) -> Response {
    ServiceResponse::new(json!({
        "status": "ok",
        "message": "Service is running",
        "service": {
            "name": "OData Gateway",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
    .negotiated(&headers)
    .into_response()
}

/// `GET /version`
pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: API_VERSION,
        status: "active",
    })
}

/// Problem details for every path the router does not serve.
pub async fn not_found(request_id: RequestId, uri: Uri) -> Response {
    ProblemDetails::not_found(uri.path(), request_id.as_str()).into_response()
}
