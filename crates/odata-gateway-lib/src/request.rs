//! Request model and the validation boundary.
//!
//! Incoming bodies are discriminated once into [`ODataCall`]: a structured
//! [`ODataRequest`] (compiled into a URL), a [`DirectRequest`] carrying a
//! pre-built URL, or a [`TargetEntityRequest`] creating an entity under a
//! parent. Nothing deeper in the pipeline inspects raw JSON.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::key::{validate_identifier, EntityKey, KeyFormatter};
use crate::navigation::{compile_navigation, NavigationChain, NavigationProperty, ResourcePath};
use crate::query::{ordered_pairs, QueryOptions};
use crate::url::{assemble_url, validate_absolute_url};

/// Outbound HTTP method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST, PUT and PATCH carry a body; GET and DELETE never do.
    pub fn takes_payload(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(Error::validation(
                "http_method",
                format!("unsupported method '{}'; expected GET, POST, PUT, PATCH or DELETE", other),
            )),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Structured description of one OData operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ODataRequest {
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub base_url: String,
    /// Service path, e.g. `/sap/opu/odata/sap/API_SALES_ORDER_SRV`.
    #[serde(default, alias = "sap_api_endpoint")]
    pub service_name: String,
    #[serde(default)]
    pub source_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_property: Option<NavigationProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlinecount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skiptoken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deltatoken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub custom_params: Vec<(String, String)>,
    /// Key fields rendered as numeric OData literals instead of strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numeric_key_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub custom_headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ODataRequest {
    /// Shape checks shared by URL generation and execution.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::validation("base_url", "is required"));
        }
        if self.service_name.trim().trim_matches('/').is_empty() {
            return Err(Error::validation("service_name", "is required"));
        }
        if self.source_entity.trim().is_empty() {
            return Err(Error::validation("source_entity", "is required"));
        }
        check_payload(self.http_method, self.payload.as_ref(), false)?;
        check_headers(&self.custom_headers, "custom_headers")?;
        check_timeout(self.timeout_secs)
    }

    pub fn navigation_chain(&self) -> NavigationChain {
        self.navigation_property
            .clone()
            .map(NavigationProperty::into_chain)
            .unwrap_or_default()
    }

    pub fn key_formatter(&self) -> KeyFormatter {
        KeyFormatter::with_numeric_fields(self.numeric_key_fields.iter().cloned())
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            select: self.select.clone(),
            filter: self.filter.clone(),
            expand: self.expand.clone(),
            top: self.top,
            skip: self.skip,
            orderby: self.orderby.clone(),
            inlinecount: self.inlinecount.clone(),
            format: self.format.clone(),
            skiptoken: self.skiptoken.clone(),
            search: self.search.clone(),
            deltatoken: self.deltatoken.clone(),
            levels: self.levels,
            from_date: self.from_date.clone(),
            to_date: self.to_date.clone(),
            custom: self.custom_params.clone(),
        }
    }

    pub fn resource_path(&self) -> Result<ResourcePath> {
        compile_navigation(
            self.source_entity.trim(),
            self.source_key.as_ref(),
            &self.navigation_chain(),
            &self.key_formatter(),
        )
    }

    /// Validate and compile into an absolute URL.
    pub fn compile_url(&self) -> Result<String> {
        self.validate()?;
        let path = self.resource_path()?;
        assemble_url(&self.base_url, &self.service_name, &path, &self.query_options())
    }
}

fn default_create_method() -> HttpMethod {
    HttpMethod::Post
}

/// Creation of a new entity under a parent: the parent's keys are merged
/// into the body sent to `<base_url>/<service_name>/<target_entity>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntityRequest {
    #[serde(default = "default_create_method")]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub base_url: String,
    #[serde(default, alias = "sap_api_endpoint")]
    pub service_name: String,
    pub target_entity: String,
    /// Parent key fields; they win over payload fields of the same name.
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub parent_keys: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub custom_headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl TargetEntityRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.http_method.takes_payload() {
            return Err(Error::validation(
                "http_method",
                format!("entity creation needs POST, PUT or PATCH, not {}", self.http_method),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::validation("base_url", "is required"));
        }
        if self.service_name.trim().trim_matches('/').is_empty() {
            return Err(Error::validation("service_name", "is required"));
        }
        let entity = self.target_entity.trim();
        if let Err(reason) = validate_identifier(entity) {
            return Err(Error::validation(
                "target_entity",
                format!("'{}' {}", entity, reason),
            ));
        }
        if self.parent_keys.iter().any(|(name, _)| name.trim().is_empty()) {
            return Err(Error::validation("parent_keys", "key names must not be empty"));
        }
        if self.payload.is_empty() && self.parent_keys.is_empty() {
            return Err(Error::validation(
                "payload",
                "entity creation needs a payload or parent_keys",
            ));
        }
        check_headers(&self.custom_headers, "custom_headers")?;
        check_timeout(self.timeout_secs)
    }

    /// Payload fields followed by the parent keys, which replace same-named fields.
    pub fn combined_payload(&self) -> Value {
        let mut body = self.payload.clone();
        for (name, value) in &self.parent_keys {
            body.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(body)
    }

    /// Validate and build the entity set URL.
    pub fn compile_url(&self) -> Result<String> {
        self.validate()?;
        let path = compile_navigation(
            self.target_entity.trim(),
            None,
            &NavigationChain::default(),
            &KeyFormatter::new(),
        )?;
        assemble_url(&self.base_url, &self.service_name, &path, &QueryOptions::default())
    }
}

/// A request against a caller-composed URL, used verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectRequest {
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(alias = "odata_url")]
    pub full_url: String,
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_language: Option<String>,
}

impl DirectRequest {
    pub fn validate(&self) -> Result<()> {
        validate_absolute_url(&self.full_url)?;
        check_payload(self.http_method, self.payload.as_ref(), false)?;
        check_headers(&self.headers, "headers")?;
        check_timeout(self.timeout_secs)
    }
}

/// The request shapes, resolved once at the validation boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataCall {
    Structured(Box<ODataRequest>),
    Direct(DirectRequest),
    Target(Box<TargetEntityRequest>),
}

impl ODataCall {
    /// Discriminate a JSON body by its `full_url`, `source_entity` or
    /// `target_entity` field. Exactly one must be present.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(Error::validation("body", "request body must be a JSON object"));
        };

        let direct = present(map, "full_url") || present(map, "odata_url");
        let structured = present(map, "source_entity");
        let target = present(map, "target_entity");
        match (direct, structured, target) {
            (true, false, false) => serde_json::from_value::<DirectRequest>(value)
                .map(ODataCall::Direct)
                .map_err(body_error),
            (false, true, false) => serde_json::from_value::<ODataRequest>(value)
                .map(|request| ODataCall::Structured(Box::new(request)))
                .map_err(body_error),
            (false, false, true) => serde_json::from_value::<TargetEntityRequest>(value)
                .map(|request| ODataCall::Target(Box::new(request)))
                .map_err(body_error),
            (false, false, false) => Err(Error::validation(
                "source_entity",
                "request needs one of full_url, source_entity or target_entity",
            )),
            (true, _, _) => Err(Error::validation(
                "full_url",
                "cannot be combined with source_entity or target_entity",
            )),
            (false, true, true) => Err(Error::validation(
                "target_entity",
                "cannot be combined with source_entity",
            )),
        }
    }

    pub fn http_method(&self) -> HttpMethod {
        match self {
            ODataCall::Structured(request) => request.http_method,
            ODataCall::Direct(request) => request.http_method,
            ODataCall::Target(request) => request.http_method,
        }
    }

    /// Body to send, if any. Target requests carry their merged payload.
    pub fn payload(&self) -> Option<Cow<'_, Value>> {
        match self {
            ODataCall::Structured(request) => request.payload.as_ref().map(Cow::Borrowed),
            ODataCall::Direct(request) => request.payload.as_ref().map(Cow::Borrowed),
            ODataCall::Target(request) => Some(Cow::Owned(request.combined_payload())),
        }
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        match self {
            ODataCall::Structured(request) => &request.custom_headers,
            ODataCall::Direct(request) => &request.headers,
            ODataCall::Target(request) => &request.custom_headers,
        }
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            ODataCall::Structured(request) => request.timeout_secs,
            ODataCall::Direct(request) => request.timeout_secs,
            ODataCall::Target(request) => request.timeout_secs,
        }
    }

    pub fn sap_client(&self) -> Option<&str> {
        match self {
            ODataCall::Structured(request) => request.sap_client.as_deref(),
            ODataCall::Direct(request) => request.sap_client.as_deref(),
            ODataCall::Target(request) => request.sap_client.as_deref(),
        }
    }

    pub fn sap_language(&self) -> Option<&str> {
        match self {
            ODataCall::Structured(request) => request.sap_language.as_deref(),
            ODataCall::Direct(request) => request.sap_language.as_deref(),
            ODataCall::Target(request) => request.sap_language.as_deref(),
        }
    }

    /// Validate for execution: write methods must carry a payload.
    pub fn validate_for_execute(&self) -> Result<()> {
        match self {
            ODataCall::Structured(request) => request.validate()?,
            ODataCall::Direct(request) => request.validate()?,
            ODataCall::Target(request) => request.validate()?,
        }
        check_payload(self.http_method(), self.payload().as_deref(), true)
    }

    /// Absolute URL for this call: compiled, or the direct URL verbatim.
    pub fn target_url(&self) -> Result<String> {
        match self {
            ODataCall::Structured(request) => request.compile_url(),
            ODataCall::Direct(request) => {
                validate_absolute_url(&request.full_url)?;
                Ok(request.full_url.trim().to_string())
            }
            ODataCall::Target(request) => request.compile_url(),
        }
    }
}

impl From<ODataRequest> for ODataCall {
    fn from(request: ODataRequest) -> Self {
        ODataCall::Structured(Box::new(request))
    }
}

impl From<DirectRequest> for ODataCall {
    fn from(request: DirectRequest) -> Self {
        ODataCall::Direct(request)
    }
}

impl From<TargetEntityRequest> for ODataCall {
    fn from(request: TargetEntityRequest) -> Self {
        ODataCall::Target(Box::new(request))
    }
}

fn present(map: &Map<String, Value>, field: &str) -> bool {
    match map.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}

fn body_error(err: serde_json::Error) -> Error {
    Error::validation("body", err.to_string())
}

fn check_payload(method: HttpMethod, payload: Option<&Value>, executing: bool) -> Result<()> {
    let has_payload = payload.is_some_and(|value| !value.is_null());
    if has_payload && !method.takes_payload() {
        return Err(Error::validation(
            "payload",
            format!("{} requests must not carry a payload", method),
        ));
    }
    if executing && !has_payload && method.takes_payload() {
        return Err(Error::validation(
            "payload",
            format!("{} requests require a payload", method),
        ));
    }
    Ok(())
}

fn check_headers(headers: &[(String, String)], field: &str) -> Result<()> {
    for (name, _) in headers {
        if name.trim().is_empty() {
            return Err(Error::validation(field, "header names must not be empty"));
        }
        if name.eq_ignore_ascii_case("authorization") {
            return Err(Error::validation(
                field,
                "the Authorization header is managed by the auth provider",
            ));
        }
    }
    Ok(())
}

fn check_timeout(timeout_secs: Option<u64>) -> Result<()> {
    if timeout_secs == Some(0) {
        return Err(Error::validation("timeout_secs", "must be greater than zero"));
    }
    Ok(())
}
