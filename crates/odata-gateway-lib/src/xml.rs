//! XML body to JSON value conversion.
//!
//! Every element becomes an object keyed by local name (namespace prefixes are
//! dropped). Attributes live under `@attributes`, non-blank text under `#text`,
//! and repeated child elements collapse into an array.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const ATTRIBUTES_KEY: &str = "@attributes";
pub const TEXT_KEY: &str = "#text";

/// Convert an XML document into `{"<root>": {...}}`.
pub fn xml_to_value(text: &str) -> Result<Value> {
    let document = Document::parse(text).map_err(|err| Error::MalformedResponse {
        reason: format!("invalid XML: {}", err),
    })?;
    let root = document.root_element();

    let mut wrapper = Map::new();
    wrapper.insert(root.tag_name().name().to_string(), element_to_value(root));
    Ok(Value::Object(wrapper))
}

fn element_to_value(node: Node<'_, '_>) -> Value {
    let mut object = Map::new();

    let attributes: Map<String, Value> = node
        .attributes()
        .map(|attr| (attr.name().to_string(), Value::String(attr.value().to_string())))
        .collect();
    if !attributes.is_empty() {
        object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(attributes));
    }

    for child in node.children().filter(Node::is_element) {
        let name = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match object.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(name, value);
            }
        }
    }

    let text: String = node
        .children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect();
    let text = text.trim();
    if !text.is_empty() {
        object.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
    }

    Value::Object(object)
}

/// Text content of a converted element, if it has any.
pub(crate) fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text),
        Value::Object(map) => map.get(TEXT_KEY).and_then(Value::as_str),
        _ => None,
    }
}

/// Attribute of a converted element by local name.
pub(crate) fn attribute<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(ATTRIBUTES_KEY)
        .and_then(|attrs| attrs.get(name))
        .and_then(Value::as_str)
}
