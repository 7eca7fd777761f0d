//! Response presenter for successful HTTP responses.
//!
//! Every result is wrapped as `{"data": ..., "metadata": {...}}` and rendered
//! as JSON, or as XML when the caller's `Accept` header asks for
//! `application/xml`.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ProblemDetails;

/// Root element of XML responses.
pub const XML_ROOT: &str = "response";

/// Element used for each entry of a JSON array.
pub const XML_ITEM: &str = "item";

/// Wire format picked from the request's `Accept` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

impl ResponseFormat {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_xml = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.to_ascii_lowercase().contains("application/xml"));
        if wants_xml {
            ResponseFormat::Xml
        } else {
            ResponseFormat::Json
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Xml => "application/xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// RFC 3339 UTC timestamp of when the response was built.
    pub timestamp: String,
    pub response_id: String,
}

impl ResponseMetadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            response_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Successful response envelope.
///
/// # Example
///
/// ```
/// use odata_gateway_service_shared::{ResponseFormat, ServiceResponse};
/// use serde_json::json;
///
/// let response = ServiceResponse::new(json!({"odata_url": "https://s.com/SRV/A"}))
///     .with_format(ResponseFormat::Xml);
/// assert_eq!(response.format, ResponseFormat::Xml);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    /// The actual response payload.
    pub data: T,

    pub metadata: ResponseMetadata,

    #[serde(skip)]
    pub format: ResponseFormat,
}

impl<T> ServiceResponse<T> {
    /// Wrap `data` with fresh metadata, rendered as JSON with status 200.
    pub fn new(data: T) -> Self {
        Self {
            data,
            metadata: ResponseMetadata::now(),
            format: ResponseFormat::Json,
        }
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Render in whatever format the request's `Accept` header names.
    pub fn negotiated(self, headers: &HeaderMap) -> Self {
        self.with_format(ResponseFormat::from_headers(headers))
    }
}

impl<T> From<T> for ServiceResponse<T> {
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: Serialize> ServiceResponse<T> {
    /// Serialize the envelope in the selected format.
    pub fn render(&self) -> Result<Vec<u8>, String> {
        match self.format {
            ResponseFormat::Json => serde_json::to_vec(self).map_err(|err| err.to_string()),
            ResponseFormat::Xml => {
                let value = serde_json::to_value(self).map_err(|err| err.to_string())?;
                value_to_xml(&value)
            }
        }
    }
}

impl<T: Serialize> IntoResponse for ServiceResponse<T> {
    fn into_response(self) -> Response {
        match self.render() {
            Ok(body) => {
                let content_type = HeaderValue::from_static(self.format.content_type());
                (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to render response");
                ProblemDetails::internal_error(
                    "Response could not be serialized",
                    self.metadata.response_id,
                )
                .into_response()
            }
        }
    }
}

/// Render a JSON value as an XML document under a `<response>` root.
///
/// Object keys become element names (sanitized), arrays repeat `<item>`,
/// nulls become empty elements and scalars become escaped text.
pub fn value_to_xml(value: &Value) -> Result<Vec<u8>, String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|err| err.to_string())?;
    write_element(&mut writer, XML_ROOT, value)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), String> {
    if value.is_null() {
        return writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(|err| err.to_string());
    }

    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|err| err.to_string())?;
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                write_element(writer, &element_name(key), child)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                write_element(writer, XML_ITEM, item)?;
            }
        }
        Value::String(text) => writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|err| err.to_string())?,
        scalar => writer
            .write_event(Event::Text(BytesText::new(&scalar.to_string())))
            .map_err(|err| err.to_string())?,
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|err| err.to_string())
}

/// Map an arbitrary JSON key onto a legal XML element name.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let starts_legally = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if !starts_legally {
        name.insert(0, '_');
    }
    name
}
