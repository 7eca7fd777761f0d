//! Response Normalizer.
//!
//! Every backend answer becomes a [`NormalizedResponse`]. Bodies are decoded
//! as JSON, then XML, then plain text; non-2xx bodies are still decoded so the
//! backend's own error message can be surfaced. When requested, the decoded
//! body is also interpreted as an OData payload (v2 JSON, v4 JSON, or Atom).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::query::decode_component;
use crate::xml::{attribute, text_of, xml_to_value, ATTRIBUTES_KEY};

/// Longest plain-text backend body echoed back as `error_detail`.
const MAX_TEXT_DETAIL: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    Json,
    Xml,
    Text,
}

/// Uniform envelope for one backend response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResponse {
    pub success: bool,
    pub status_code: u16,
    pub data: Option<Value>,
    pub raw_format: RawFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ODataPayload>,
}

/// Structured view of a successful OData body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ODataPayload {
    Collection {
        entities: Vec<EntityRecord>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_link: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        skip_token: Option<String>,
    },
    Entity {
        entity: EntityRecord,
    },
    Generic {
        data: Value,
    },
}

/// One entity with its metadata split from its properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

/// Normalize a backend body.
///
/// Fails only when the body is present but is not JSON, XML, or UTF-8 text.
pub fn normalize_response(
    body: &[u8],
    content_type: Option<&str>,
    status_code: u16,
    parse_response: bool,
) -> Result<NormalizedResponse> {
    let success = (200..300).contains(&status_code);
    let (data, raw_format) = decode_body(body, content_type)?;

    let (error_detail, error_code) = if success {
        (None, None)
    } else {
        let (detail, code) = extract_error(data.as_ref(), status_code);
        (Some(detail), code)
    };

    let payload = match (&data, parse_response && success) {
        (Some(value), true) => Some(interpret_payload(value)),
        _ => None,
    };

    Ok(NormalizedResponse {
        success,
        status_code,
        data,
        raw_format,
        error_detail,
        error_code,
        payload,
    })
}

fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<(Option<Value>, RawFormat)> {
    let text = std::str::from_utf8(body).map_err(|err| Error::MalformedResponse {
        reason: format!(
            "body of {} bytes is neither JSON, XML, nor UTF-8 text: {}",
            body.len(),
            err
        ),
    })?;
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok((None, RawFormat::Text));
    }

    let declared_xml = content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("xml") || ct.contains("atom")
    });

    if declared_xml {
        if let Ok(value) = xml_to_value(trimmed) {
            return Ok((Some(value), RawFormat::Xml));
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok((Some(value), RawFormat::Json));
    }
    if !declared_xml && trimmed.starts_with('<') {
        if let Ok(value) = xml_to_value(trimmed) {
            return Ok((Some(value), RawFormat::Xml));
        }
    }
    Ok((Some(Value::String(text.to_string())), RawFormat::Text))
}

/// Pull a readable message and optional code out of an error body.
fn extract_error(data: Option<&Value>, status_code: u16) -> (String, Option<String>) {
    let fallback = || format!("backend returned HTTP {}", status_code);

    let Some(data) = data else {
        return (fallback(), None);
    };

    if let Value::String(text) = data {
        let detail: String = text.trim().chars().take(MAX_TEXT_DETAIL).collect();
        if detail.is_empty() {
            return (fallback(), None);
        }
        return (detail, None);
    }

    let error = data.get("error").unwrap_or(data);
    let message = error.get("message").and_then(message_text);
    let code = error.get("code").and_then(scalar_text);
    (message.unwrap_or_else(fallback), code)
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("value")
            .and_then(Value::as_str)
            .or_else(|| text_of(value))
            .map(str::to_string),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(_) => text_of(value).map(str::to_string),
        _ => None,
    }
}

fn interpret_payload(data: &Value) -> ODataPayload {
    if let Some(feed) = data.get("feed") {
        return atom_collection(feed);
    }
    if let Some(entry) = data.get("entry") {
        return ODataPayload::Entity {
            entity: atom_entry(entry),
        };
    }
    if let Some(d) = data.get("d") {
        if let Some(results) = d.get("results").and_then(Value::as_array) {
            return ODataPayload::Collection {
                entities: results.iter().map(json_entity).collect(),
                count: d.get("__count").and_then(count_value),
                next_link: d.get("__next").and_then(Value::as_str).map(str::to_string),
                skip_token: d
                    .get("__skiptoken")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| skip_token_from(d.get("__next"))),
            };
        }
        if d.is_object() {
            return ODataPayload::Entity {
                entity: json_entity(d),
            };
        }
    }
    if let Some(values) = data.get("value").and_then(Value::as_array) {
        return ODataPayload::Collection {
            entities: values.iter().map(json_entity).collect(),
            count: data.get("@odata.count").and_then(count_value),
            next_link: data
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string),
            skip_token: skip_token_from(data.get("@odata.nextLink")),
        };
    }
    let has_odata_metadata = ["@odata.context", "odata.metadata", "odata.type"]
        .iter()
        .any(|key| data.get(*key).is_some());
    if has_odata_metadata {
        return ODataPayload::Entity {
            entity: json_entity(data),
        };
    }
    ODataPayload::Generic {
        data: clean_value(data),
    }
}

fn count_value(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
}

fn skip_token_from(next_link: Option<&Value>) -> Option<String> {
    let link = next_link?.as_str()?;
    let (_, query) = link.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "$skiptoken" || *name == "%24skiptoken")
        .and_then(|(_, value)| decode_component(value).ok())
}

/// Split a v2/v4 JSON entity into metadata, links and properties.
fn json_entity(value: &Value) -> EntityRecord {
    let mut record = EntityRecord::default();
    let Some(object) = value.as_object() else {
        record
            .properties
            .insert("value".to_string(), clean_value(value));
        return record;
    };

    if let Some(metadata) = object.get("__metadata") {
        record.id = metadata
            .get("id")
            .or_else(|| metadata.get("uri"))
            .and_then(Value::as_str)
            .map(str::to_string);
        record.entity_type = metadata.get("type").and_then(Value::as_str).map(str::to_string);
        record.etag = metadata.get("etag").and_then(Value::as_str).map(str::to_string);
    }

    for (key, field) in object {
        if key.starts_with("__") || key.starts_with("odata.") {
            continue;
        }
        if let Some((property, annotation)) = key.split_once("@odata.") {
            match (property, field.as_str()) {
                ("", Some(text)) => match annotation {
                    "id" => record.id = Some(text.to_string()),
                    "type" => record.entity_type = Some(text.trim_start_matches('#').to_string()),
                    "etag" => record.etag = Some(text.to_string()),
                    link if link.ends_with("Link") => {
                        record.links.insert(link.to_string(), text.to_string());
                    }
                    _ => {}
                },
                (property, Some(text)) if annotation.ends_with("Link") => {
                    record.links.insert(property.to_string(), text.to_string());
                }
                _ => {}
            }
            continue;
        }
        if let Some(uri) = field
            .get("__deferred")
            .and_then(|deferred| deferred.get("uri"))
            .and_then(Value::as_str)
        {
            record.links.insert(key.clone(), uri.to_string());
            continue;
        }
        record.properties.insert(key.clone(), clean_value(field));
    }
    record
}

/// Trim string padding recursively.
fn clean_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.trim().to_string()),
        Value::Array(items) => Value::Array(items.iter().map(clean_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), clean_value(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

fn atom_collection(feed: &Value) -> ODataPayload {
    let entities: Vec<EntityRecord> = as_list(feed.get("entry")).into_iter().map(atom_entry).collect();
    let next_link = as_list(feed.get("link"))
        .into_iter()
        .find(|link| attribute(link, "rel") == Some("next"))
        .and_then(|link| attribute(link, "href"))
        .map(str::to_string);
    let count = feed
        .get("count")
        .and_then(text_of)
        .and_then(|text| text.trim().parse().ok());
    let skip_token = next_link
        .as_ref()
        .and_then(|link| skip_token_from(Some(&Value::String(link.clone()))));

    ODataPayload::Collection {
        entities,
        count,
        next_link,
        skip_token,
    }
}

fn atom_entry(entry: &Value) -> EntityRecord {
    let mut record = EntityRecord {
        id: entry.get("id").and_then(text_of).map(str::to_string),
        entity_type: entry
            .get("category")
            .and_then(|category| attribute(category, "term"))
            .map(str::to_string),
        etag: attribute(entry, "etag").map(str::to_string),
        ..EntityRecord::default()
    };

    for link in as_list(entry.get("link")) {
        let Some(href) = attribute(link, "href") else {
            continue;
        };
        let name = attribute(link, "title")
            .or_else(|| attribute(link, "rel"))
            .unwrap_or("link");
        record.links.insert(name.to_string(), href.to_string());
    }

    // Media-link entries carry m:properties beside content instead of inside it.
    let properties = entry
        .get("content")
        .and_then(|content| content.get("properties"))
        .or_else(|| entry.get("properties"));
    if let Some(Value::Object(properties)) = properties {
        for (name, value) in properties {
            if name == ATTRIBUTES_KEY {
                continue;
            }
            record.properties.insert(name.clone(), typed_value(value));
        }
    }
    record
}

/// Convert an Atom property using its `m:type` and `m:null` attributes.
fn typed_value(value: &Value) -> Value {
    if attribute(value, "null") == Some("true") {
        return Value::Null;
    }

    let nested: Map<String, Value> = value
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| !key.starts_with('@') && !key.starts_with('#'))
                .map(|(key, child)| (key.clone(), typed_value(child)))
                .collect()
        })
        .unwrap_or_default();
    if !nested.is_empty() {
        return Value::Object(nested);
    }

    let text = text_of(value).unwrap_or("").trim();
    let edm_type = attribute(value, "type").unwrap_or("Edm.String");
    match edm_type {
        "Edm.Int16" | "Edm.Int32" | "Edm.Int64" | "Edm.Byte" | "Edm.SByte" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "Edm.Decimal" | "Edm.Double" | "Edm.Single" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "Edm.Boolean" => Value::Bool(matches!(text, "true" | "1")),
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_error_body_extracts_message() {
        let body = br#"{"error":{"code":"SY/530","message":{"lang":"en","value":"Resource not found for segment 'A_SalesOrder'"}}}"#;
        let response = normalize_response(body, Some("application/json"), 404, true).unwrap();
        assert!(!response.success);
        assert_eq!(response.status_code, 404);
        assert_eq!(response.raw_format, RawFormat::Json);
        assert_eq!(
            response.error_detail.as_deref(),
            Some("Resource not found for segment 'A_SalesOrder'")
        );
        assert_eq!(response.error_code.as_deref(), Some("SY/530"));
        assert!(response.payload.is_none());
    }

    #[test]
    fn v4_error_message_is_plain_string() {
        let body = br#"{"error":{"code":"400","message":"Bad filter"}}"#;
        let response = normalize_response(body, None, 400, false).unwrap();
        assert_eq!(response.error_detail.as_deref(), Some("Bad filter"));
        assert_eq!(response.error_code.as_deref(), Some("400"));
    }

    #[test]
    fn xml_error_body_is_decoded() {
        let body = br#"<?xml version="1.0"?><error><code>ZC/001</code><message>Locked</message></error>"#;
        let response = normalize_response(body, Some("application/xml"), 423, false).unwrap();
        assert_eq!(response.raw_format, RawFormat::Xml);
        assert_eq!(response.error_detail.as_deref(), Some("Locked"));
        assert_eq!(response.error_code.as_deref(), Some("ZC/001"));
    }

    #[test]
    fn text_error_body_is_truncated() {
        let body = "x".repeat(2_000);
        let response = normalize_response(body.as_bytes(), Some("text/plain"), 502, false).unwrap();
        assert_eq!(response.raw_format, RawFormat::Text);
        assert_eq!(response.error_detail.map(|d| d.len()), Some(MAX_TEXT_DETAIL));
    }

    #[test]
    fn empty_error_body_uses_status_fallback() {
        let response = normalize_response(b"", None, 503, false).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.error_detail.as_deref(), Some("backend returned HTTP 503"));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = normalize_response(&[0xff, 0xfe, 0x00, 0x41], None, 200, false).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn undeclared_xml_is_sniffed() {
        let response = normalize_response(b"<root><a>1</a></root>", None, 200, false).unwrap();
        assert_eq!(response.raw_format, RawFormat::Xml);
        assert_eq!(response.data.unwrap()["root"]["a"]["#text"], json!("1"));
    }

    #[test]
    fn v2_collection_splits_metadata() {
        let body = json!({
            "d": {
                "__count": "2",
                "__next": "https://s.com/SRV/A_SalesOrder?$skiptoken=20",
                "results": [
                    {
                        "__metadata": {
                            "id": "https://s.com/SRV/A_SalesOrder('1')",
                            "type": "API_SALES_ORDER_SRV.A_SalesOrderType",
                            "etag": "W/\"1\""
                        },
                        "SalesOrder": "1 ",
                        "to_Item": {"__deferred": {"uri": "https://s.com/SRV/A_SalesOrder('1')/to_Item"}}
                    },
                    {"SalesOrder": "2"}
                ]
            }
        });
        let response =
            normalize_response(body.to_string().as_bytes(), Some("application/json"), 200, true)
                .unwrap();
        let Some(ODataPayload::Collection {
            entities,
            count,
            next_link,
            skip_token,
        }) = response.payload
        else {
            panic!("expected collection payload");
        };
        assert_eq!(count, Some(2));
        assert_eq!(skip_token.as_deref(), Some("20"));
        assert!(next_link.is_some());
        assert_eq!(entities.len(), 2);
        assert_eq!(
            entities[0].entity_type.as_deref(),
            Some("API_SALES_ORDER_SRV.A_SalesOrderType")
        );
        assert_eq!(entities[0].properties["SalesOrder"], json!("1"));
        assert!(!entities[0].properties.contains_key("to_Item"));
        assert!(entities[0].links.contains_key("to_Item"));
    }

    #[test]
    fn v4_collection_reads_annotations() {
        let body = json!({
            "@odata.context": "$metadata#Products",
            "@odata.count": 1,
            "value": [{"@odata.etag": "W/\"x\"", "ID": 7, "Name": "Chair"}]
        });
        let response = normalize_response(body.to_string().as_bytes(), None, 200, true).unwrap();
        let Some(ODataPayload::Collection { entities, count, .. }) = response.payload else {
            panic!("expected collection payload");
        };
        assert_eq!(count, Some(1));
        assert_eq!(entities[0].etag.as_deref(), Some("W/\"x\""));
        assert_eq!(entities[0].properties["ID"], json!(7));
    }

    #[test]
    fn v2_single_entity() {
        let body = br#"{"d":{"__metadata":{"uri":"https://s.com/SRV/A('1')","type":"T"},"Id":"1"}}"#;
        let response = normalize_response(body, None, 200, true).unwrap();
        match response.payload {
            Some(ODataPayload::Entity { entity }) => {
                assert_eq!(entity.id.as_deref(), Some("https://s.com/SRV/A('1')"));
                assert_eq!(entity.properties["Id"], json!("1"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn atom_feed_properties_are_typed() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices">
  <m:count>1</m:count>
  <entry m:etag="W/&quot;1&quot;">
    <id>https://s.com/SRV/Products(1)</id>
    <category term="SRV.Product" scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme"/>
    <link rel="edit" title="Product" href="Products(1)"/>
    <content type="application/xml">
      <m:properties>
        <d:ID m:type="Edm.Int32">1</d:ID>
        <d:Price m:type="Edm.Decimal">9.5</d:Price>
        <d:Active m:type="Edm.Boolean">true</d:Active>
        <d:Name>Chair</d:Name>
        <d:Note m:null="true"/>
      </m:properties>
    </content>
  </entry>
</feed>"#;
        let response =
            normalize_response(body.as_bytes(), Some("application/atom+xml"), 200, true).unwrap();
        let Some(ODataPayload::Collection { entities, count, .. }) = response.payload else {
            panic!("expected collection payload");
        };
        assert_eq!(count, Some(1));
        let entity = &entities[0];
        assert_eq!(entity.id.as_deref(), Some("https://s.com/SRV/Products(1)"));
        assert_eq!(entity.entity_type.as_deref(), Some("SRV.Product"));
        assert_eq!(entity.etag.as_deref(), Some("W/\"1\""));
        assert_eq!(entity.properties["ID"], json!(1));
        assert_eq!(entity.properties["Price"], json!(9.5));
        assert_eq!(entity.properties["Active"], json!(true));
        assert_eq!(entity.properties["Name"], json!("Chair"));
        assert_eq!(entity.properties["Note"], Value::Null);
        assert_eq!(entity.links.get("Product").map(String::as_str), Some("Products(1)"));
    }

    #[test]
    fn unknown_shapes_are_generic() {
        let response = normalize_response(br#"{"status":" ok "}"#, None, 200, true).unwrap();
        assert_eq!(
            response.payload,
            Some(ODataPayload::Generic {
                data: json!({"status": "ok"})
            })
        );
    }

    #[test]
    fn serializes_null_data_and_lowercase_format() {
        let response = normalize_response(b"", None, 204, false).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["data"], Value::Null);
        assert_eq!(value["raw_format"], json!("text"));
        assert!(value.get("error_detail").is_none());
    }
}
