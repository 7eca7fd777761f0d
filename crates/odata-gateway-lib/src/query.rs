//! Query Option Compiler.
//!
//! System options are emitted in a fixed order regardless of how the caller
//! supplied them: `$select`, `$filter`, `$expand`, `$top`, `$skip`,
//! `$orderby`, `$inlinecount`, `$format`, `$skiptoken`, `$search`,
//! `$deltatoken`, `$levels`, then the SAP date window `fromDate`/`toDate`, then
//! custom parameters in caller order. Spaces and single quotes are left
//! literal so filter expressions stay readable.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Encoded in query values: anything that would end or split the parameter.
const QUERY_VALUE: &AsciiSet = &CONTROLS.add(b'%').add(b'&').add(b'#').add(b'+');
const QUERY_NAME: &AsciiSet = &QUERY_VALUE.add(b'=');

/// Standard and custom query options for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
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
    /// Rendered as `fromDate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    /// Rendered as `toDate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    /// Non-system parameters, in the order they were supplied.
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<(String, String)>,
}

impl QueryOptions {
    pub fn is_empty(&self) -> bool {
        compile_query(self).is_empty()
    }

    /// Fold a last-step navigation filter into `$filter`.
    ///
    /// With both present the result is `(step) and (own)`.
    pub fn with_step_filter(mut self, step: Option<&str>) -> Self {
        let Some(step) = step.map(str::trim).filter(|step| !step.is_empty()) else {
            return self;
        };
        let merged = match self.filter.as_deref().map(str::trim).filter(|own| !own.is_empty()) {
            Some(own) => format!("({}) and ({})", step, own),
            None => step.to_string(),
        };
        self.filter = Some(merged);
        self
    }

    /// First custom parameter called `name`.
    pub fn custom_value(&self, name: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Store a decoded `name=value` pair taken from a URL.
    pub(crate) fn assign(&mut self, name: &str, value: String) -> Result<()> {
        let slot = match name {
            "$select" => &mut self.select,
            "$filter" => &mut self.filter,
            "$expand" => &mut self.expand,
            "$orderby" => &mut self.orderby,
            "$inlinecount" => &mut self.inlinecount,
            "$format" => &mut self.format,
            "$skiptoken" => &mut self.skiptoken,
            "$search" => &mut self.search,
            "$deltatoken" => &mut self.deltatoken,
            "$top" => return assign_count(&mut self.top, name, &value),
            "$skip" => return assign_count(&mut self.skip, name, &value),
            "$levels" => return assign_count(&mut self.levels, name, &value),
            "fromDate" if self.from_date.is_none() => {
                self.from_date = Some(value);
                return Ok(());
            }
            "toDate" if self.to_date.is_none() => {
                self.to_date = Some(value);
                return Ok(());
            }
            _ => {
                self.custom.push((name.to_string(), value));
                return Ok(());
            }
        };

        if slot.is_some() {
            return Err(duplicate(name));
        }
        *slot = Some(value);
        Ok(())
    }
}

fn assign_count(slot: &mut Option<u64>, name: &str, value: &str) -> Result<()> {
    if slot.is_some() {
        return Err(duplicate(name));
    }
    let parsed = value.trim().parse::<u64>().map_err(|_| {
        Error::malformed(
            Some(&format!("{}={}", name, value)),
            format!("{} must be a non-negative integer", name),
        )
    })?;
    *slot = Some(parsed);
    Ok(())
}

fn duplicate(name: &str) -> Error {
    Error::malformed(Some(name), format!("query option {} appears more than once", name))
}

/// Render `options` as `?name=value&...`, or an empty string when nothing is set.
pub fn compile_query(options: &QueryOptions) -> String {
    let mut params = Vec::new();

    push_option(&mut params, "$select", options.select.as_deref());
    push_option(&mut params, "$filter", options.filter.as_deref());
    push_option(&mut params, "$expand", options.expand.as_deref());
    push_option(&mut params, "$top", options.top.map(|n| n.to_string()).as_deref());
    push_option(&mut params, "$skip", options.skip.map(|n| n.to_string()).as_deref());
    push_option(&mut params, "$orderby", options.orderby.as_deref());
    push_option(&mut params, "$inlinecount", options.inlinecount.as_deref());
    push_option(&mut params, "$format", options.format.as_deref());
    push_option(&mut params, "$skiptoken", options.skiptoken.as_deref());
    push_option(&mut params, "$search", options.search.as_deref());
    push_option(&mut params, "$deltatoken", options.deltatoken.as_deref());
    push_option(&mut params, "$levels", options.levels.map(|n| n.to_string()).as_deref());
    push_option(&mut params, "fromDate", options.from_date.as_deref());
    push_option(&mut params, "toDate", options.to_date.as_deref());

    for (name, value) in &options.custom {
        if name.is_empty() {
            continue;
        }
        push_option(&mut params, &encode_name(name), Some(value));
    }

    if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.join("&"))
    }
}

fn push_option(params: &mut Vec<String>, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        params.push(format!("{}={}", name, encode_value(value)));
    }
}

pub(crate) fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, QUERY_NAME).to_string()
}

/// Decode one query component: `+` is a space, then percent escapes.
pub(crate) fn decode_component(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::malformed(Some(raw), "query component is not valid UTF-8"))
}

/// Serde adapter for ordered `(name, value)` lists written as JSON objects.
///
/// Scalar values are stringified; `null` objects and `null` values are skipped.
pub(crate) mod ordered_pairs {
    use std::fmt;

    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        pairs: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (name, value) in pairs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        deserializer.deserialize_any(PairsVisitor)
    }

    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of string, number or boolean values")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::new();
            while let Some((name, value)) = access.next_entry::<String, Value>()? {
                let value = match value {
                    Value::Null => continue,
                    Value::String(text) => text,
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    other => {
                        return Err(de::Error::custom(format!(
                            "value for '{}' must be a scalar, got {}",
                            name, other
                        )))
                    }
                };
                pairs.push((name, value));
            }
            Ok(pairs)
        }
    }
}
