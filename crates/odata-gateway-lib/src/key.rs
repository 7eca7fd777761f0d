//! Key Formatter: renders entity keys as OData key predicates and parses
//! key predicates back out of URL segments.
//!
//! Quoting policy is explicit: text values are always quoted, integers are
//! never quoted, and a text value is rendered unquoted only when its field is
//! registered as numeric on the [`KeyFormatter`].

use std::collections::BTreeSet;
use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Characters escaped inside quoted literals so they cannot end the path early.
const KEY_LITERAL: &AsciiSet = &CONTROLS.add(b'%').add(b'?').add(b'#');

/// A single key value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    /// String literal, rendered as `'value'`.
    Text(String),
    /// Integer literal, rendered unquoted.
    Integer(i64),
    /// Typed literal kept verbatim (`guid'...'`, `1.5M`). Produced by the URL parser.
    Literal(String),
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Text(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Integer(value)
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::Text(text) | KeyValue::Literal(text) => serializer.serialize_str(text),
            KeyValue::Integer(value) => serializer.serialize_i64(*value),
        }
    }
}

struct KeyValueVisitor;

impl<'de> Visitor<'de> for KeyValueVisitor {
    type Value = KeyValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or integer key value")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<KeyValue, E> {
        Ok(KeyValue::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<KeyValue, E> {
        Ok(KeyValue::Text(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<KeyValue, E> {
        Ok(KeyValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<KeyValue, E> {
        i64::try_from(value)
            .map(KeyValue::Integer)
            .map_err(|_| E::custom(format!("key value {} is out of range", value)))
    }
}

impl<'de> Deserialize<'de> for KeyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(KeyValueVisitor)
    }
}

/// One named field of a composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub name: String,
    pub value: KeyValue,
}

/// Entity key: either a single value or an ordered set of named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    Single(KeyValue),
    /// Fields in caller-supplied order.
    Composite(Vec<KeyField>),
}

impl EntityKey {
    pub fn single(value: impl Into<KeyValue>) -> Self {
        EntityKey::Single(value.into())
    }

    pub fn composite<I, N, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<KeyValue>,
    {
        EntityKey::Composite(
            fields
                .into_iter()
                .map(|(name, value)| KeyField {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        )
    }

    /// A single empty string key, which callers use to mean "no key".
    pub fn is_blank(&self) -> bool {
        matches!(self, EntityKey::Single(KeyValue::Text(text)) if text.is_empty())
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EntityKey::Single(value) => value.serialize(serializer),
            EntityKey::Composite(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    map.serialize_entry(&field.name, &field.value)?;
                }
                map.end()
            }
        }
    }
}

struct EntityKeyVisitor;

impl<'de> Visitor<'de> for EntityKeyVisitor {
    type Value = EntityKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a key value or a mapping of key field names to values")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<EntityKey, E> {
        KeyValueVisitor.visit_str(value).map(EntityKey::Single)
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<EntityKey, E> {
        KeyValueVisitor.visit_string(value).map(EntityKey::Single)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<EntityKey, E> {
        KeyValueVisitor.visit_i64(value).map(EntityKey::Single)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<EntityKey, E> {
        KeyValueVisitor.visit_u64(value).map(EntityKey::Single)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<EntityKey, A::Error> {
        let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(2));
        while let Some((name, value)) = access.next_entry::<String, KeyValue>()? {
            fields.push(KeyField { name, value });
        }
        Ok(EntityKey::Composite(fields))
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(EntityKeyVisitor)
    }
}

/// Renders [`EntityKey`] values as OData key predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFormatter {
    numeric_fields: BTreeSet<String>,
}

impl KeyFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter that renders the named composite fields as numeric OData types.
    pub fn with_numeric_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numeric_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_numeric(&self, field: &str) -> bool {
        self.numeric_fields.contains(field)
    }

    /// Render `key` as `('value')` or `(Field1='v1',Field2='v2')`.
    pub fn format(&self, key: &EntityKey) -> Result<String> {
        match key {
            EntityKey::Single(value) => Ok(format!("({})", self.render_value(None, value)?)),
            EntityKey::Composite(fields) => {
                if fields.is_empty() {
                    return Err(Error::InvalidKey {
                        field: None,
                        reason: "composite key mapping is empty".to_string(),
                    });
                }

                let mut parts = Vec::with_capacity(fields.len());
                for field in fields {
                    if field.name.trim().is_empty() {
                        return Err(Error::InvalidKey {
                            field: None,
                            reason: "composite key contains an empty field name".to_string(),
                        });
                    }
                    if let Err(reason) = validate_identifier(&field.name) {
                        return Err(Error::InvalidKey {
                            field: Some(field.name.clone()),
                            reason: format!("field name {}", reason),
                        });
                    }
                    let rendered = self.render_value(Some(&field.name), &field.value)?;
                    parts.push(format!("{}={}", field.name, rendered));
                }
                Ok(format!("({})", parts.join(",")))
            }
        }
    }

    fn render_value(&self, field: Option<&str>, value: &KeyValue) -> Result<String> {
        let invalid = |reason: String| Error::InvalidKey {
            field: field.map(str::to_string),
            reason,
        };

        match value {
            KeyValue::Integer(number) => Ok(number.to_string()),
            KeyValue::Text(text) if field.is_some_and(|name| self.is_numeric(name)) => {
                if is_numeric_literal(text) {
                    Ok(text.clone())
                } else {
                    Err(invalid(format!(
                        "value '{}' is not numeric but the field is declared numeric",
                        text
                    )))
                }
            }
            KeyValue::Text(text) => {
                if text.is_empty() {
                    return Err(invalid("key value is empty".to_string()));
                }
                Ok(quote_literal(text))
            }
            KeyValue::Literal(raw) => {
                if raw.is_empty() {
                    return Err(invalid("key literal is empty".to_string()));
                }
                Ok(raw.clone())
            }
        }
    }
}

fn quote_literal(text: &str) -> String {
    let escaped = text.replace('\'', "''");
    format!("'{}'", utf8_percent_encode(&escaped, KEY_LITERAL))
}

fn is_numeric_literal(text: &str) -> bool {
    if text.parse::<i64>().is_ok() {
        return true;
    }
    text.parse::<f64>().is_ok()
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || b == b'.' || b == b'-')
}

/// Check that `name` can stand alone as an OData path identifier.
pub(crate) fn validate_identifier(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("is empty");
    }
    if name.chars().any(char::is_whitespace) {
        return Err("contains whitespace");
    }
    if name.contains('/') {
        return Err("contains '/'");
    }
    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, '(' | ')' | '?' | '#' | '&' | '\'' | '=' | ','))
    {
        return Err("contains reserved characters");
    }
    Ok(())
}

/// Split a decoded path segment into its entity name and optional key.
pub(crate) fn parse_key_segment(segment: &str) -> Result<(String, Option<EntityKey>)> {
    let Some(open) = segment.find('(') else {
        if segment.contains(')') {
            return Err(Error::malformed(
                Some(segment),
                "closing parenthesis without an opening parenthesis",
            ));
        }
        return Ok((segment.to_string(), None));
    };

    let name = &segment[..open];
    if name.is_empty() {
        return Err(Error::malformed(
            Some(segment),
            "key predicate has no entity name",
        ));
    }

    let rest = &segment[open + 1..];
    let Some(close) = find_outside_quotes(rest, ')') else {
        return Err(Error::malformed(Some(segment), "key predicate is not closed"));
    };
    if close + 1 != rest.len() {
        return Err(Error::malformed(
            Some(segment),
            "unexpected characters after key predicate",
        ));
    }

    let key = parse_key_predicate(&rest[..close])
        .map_err(|reason| Error::malformed(Some(segment), reason))?;
    Ok((name.to_string(), Some(key)))
}

fn parse_key_predicate(inner: &str) -> std::result::Result<EntityKey, String> {
    if inner.trim().is_empty() {
        return Err("key predicate is empty".to_string());
    }

    let mut named = Vec::new();
    let mut unnamed = Vec::new();
    for part in split_outside_quotes(inner, ',')? {
        match find_outside_quotes(part, '=') {
            Some(idx) => {
                let name = part[..idx].trim();
                let raw = part[idx + 1..].trim();
                if name.is_empty() {
                    return Err(format!("composite key part '{}' has no field name", part));
                }
                if raw.is_empty() {
                    return Err(format!("composite key field '{}' has no value", name));
                }
                named.push(KeyField {
                    name: name.to_string(),
                    value: parse_key_value(raw)?,
                });
            }
            None => unnamed.push(parse_key_value(part.trim())?),
        }
    }

    match (named.is_empty(), unnamed.len()) {
        (true, 1) => Ok(EntityKey::Single(unnamed.remove(0))),
        (false, 0) => Ok(EntityKey::Composite(named)),
        (true, _) => Err("multiple unnamed key values; composite keys need Field=value pairs".to_string()),
        (false, _) => Err("inconsistent composite key: named and unnamed values are mixed".to_string()),
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<KeyValue, String> {
    if raw.is_empty() {
        return Err("key value is empty".to_string());
    }

    if let Some(body) = raw.strip_prefix('\'') {
        let Some(body) = body.strip_suffix('\'') else {
            return Err(format!("unterminated string literal {}", raw));
        };
        return unescape_quoted(body).map(KeyValue::Text);
    }

    if let Some(quote) = raw.find('\'') {
        // Typed literal such as guid'...' or datetime'...'.
        let prefix = &raw[..quote];
        let valid_prefix = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric());
        if valid_prefix && raw.len() > quote + 1 && raw.ends_with('\'') {
            unescape_quoted(&raw[quote + 1..raw.len() - 1])?;
            return Ok(KeyValue::Literal(raw.to_string()));
        }
        return Err(format!("invalid key literal {}", raw));
    }

    if let Ok(number) = raw.parse::<i64>() {
        return Ok(KeyValue::Integer(number));
    }

    if raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '+' | '-'))
    {
        return Ok(KeyValue::Literal(raw.to_string()));
    }

    Err(format!("invalid key value {}", raw))
}

fn unescape_quoted(body: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.next() != Some('\'') {
                return Err(format!("unescaped quote inside string literal '{}'", body));
            }
        }
        out.push(c);
    }
    Ok(out)
}

/// Index of the first `needle` that is not inside a quoted literal.
pub(crate) fn find_outside_quotes(haystack: &str, needle: char) -> Option<usize> {
    let mut in_quote = false;
    for (idx, c) in haystack.char_indices() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if c == needle && !in_quote {
            return Some(idx);
        }
    }
    None
}

fn split_outside_quotes(input: &str, separator: char) -> std::result::Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if c == separator && !in_quote {
            parts.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    if in_quote {
        return Err("unbalanced quotes in key predicate".to_string());
    }
    parts.push(&input[start..]);
    Ok(parts)
}
