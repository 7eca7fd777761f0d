//! Navigation Compiler.
//!
//! A request names a source entity, an optional key, and an ordered chain of
//! navigation steps. Both the legacy `"to_Items/to_Product"` string and the
//! structured step array are normalized into one [`NavigationChain`] at the
//! request boundary, so there is exactly one compiler path.
//!
//! Per-step filters are not standard OData. A filter on the last step alone is
//! an ordinary `$filter` on the addressed collection and is handed to the query
//! compiler. Once an intermediate step carries a filter, every step filter is
//! kept as a literal inline `?$filter=` suffix on its segment, so a chain where
//! every step carries a filter renders as `A/to_Items?$filter=X/to_Product?$filter=Y`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::key::{validate_identifier, EntityKey, KeyFormatter};
use crate::query::encode_value;

/// One hop through a navigation property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationStep {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl NavigationStep {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: None,
            filter: None,
        }
    }

    pub fn with_key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Ordered navigation steps, left to right as they appear in the URL path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NavigationChain(Vec<NavigationStep>);

impl NavigationChain {
    pub fn new(steps: Vec<NavigationStep>) -> Self {
        Self(steps)
    }

    /// Expand the legacy `to_Items/to_Product` form into key-less, filter-less steps.
    ///
    /// Outer slashes are ignored. Inner empty segments are kept so the compiler
    /// can report them with their index.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Self::default();
        }
        trimmed.split('/').map(NavigationStep::new).collect()
    }

    pub fn steps(&self) -> &[NavigationStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, step: NavigationStep) {
        self.0.push(step);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NavigationStep> {
        self.0.iter()
    }
}

impl FromIterator<NavigationStep> for NavigationChain {
    fn from_iter<I: IntoIterator<Item = NavigationStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NavigationChain {
    type Item = &'a NavigationStep;
    type IntoIter = std::slice::Iter<'a, NavigationStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Navigation as supplied by callers: a legacy path string or a step array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NavigationProperty {
    Path(String),
    Steps(Vec<NavigationStep>),
}

impl NavigationProperty {
    pub fn into_chain(self) -> NavigationChain {
        match self {
            NavigationProperty::Path(path) => NavigationChain::from_path(&path),
            NavigationProperty::Steps(steps) => NavigationChain::new(steps),
        }
    }
}

/// A per-step filter recorded by the compiler, indexed by chain position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFilter {
    pub index: usize,
    pub entity: String,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathSegment {
    text: String,
    filter: Option<String>,
}

/// Compiled resource path: source segment followed by one segment per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    segments: Vec<PathSegment>,
    /// Some segment before the last one carries a filter.
    inline: bool,
}

impl ResourcePath {
    fn new(segments: Vec<PathSegment>) -> Self {
        let inline = segments
            .split_last()
            .is_some_and(|(_, before)| before.iter().any(|segment| segment.filter.is_some()));
        Self { segments, inline }
    }

    /// Render the path, inlining per-step filters after their segment.
    ///
    /// A filter on the last step alone is left to [`ResourcePath::query_filter`].
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                out.push('/');
            }
            out.push_str(&segment.text);
            if let Some(filter) = segment.filter.as_ref().filter(|_| self.inline) {
                out.push_str("?$filter=");
                out.push_str(&encode_value(filter));
            }
        }
        out
    }

    /// The last step's filter when it belongs in the query string.
    pub fn query_filter(&self) -> Option<&str> {
        if self.inline {
            return None;
        }
        self.segments.last().and_then(|segment| segment.filter.as_deref())
    }

    pub fn step_filters(&self) -> Vec<StepFilter> {
        self.segments
            .iter()
            .skip(1)
            .enumerate()
            .filter_map(|(index, segment)| {
                segment.filter.as_ref().map(|filter| StepFilter {
                    index,
                    entity: entity_name(&segment.text).to_string(),
                    filter: filter.clone(),
                })
            })
            .collect()
    }

    /// True when a per-step filter already opened a query string inside the path.
    pub fn has_inline_query(&self) -> bool {
        self.inline
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn entity_name(segment: &str) -> &str {
    segment.split('(').next().unwrap_or(segment)
}

/// Compile `source_entity`, its key, and `chain` into a resource path.
pub fn compile_navigation(
    source_entity: &str,
    source_key: Option<&EntityKey>,
    chain: &NavigationChain,
    keys: &KeyFormatter,
) -> Result<ResourcePath> {
    if source_entity.is_empty() {
        return Err(Error::validation("source_entity", "is required"));
    }
    if let Err(reason) = validate_identifier(source_entity) {
        return Err(Error::validation(
            "source_entity",
            format!("'{}' {}", source_entity, reason),
        ));
    }

    let mut segments = Vec::with_capacity(chain.len() + 1);
    segments.push(PathSegment {
        text: keyed_segment(source_entity, source_key, keys)?,
        filter: None,
    });

    for (index, step) in chain.iter().enumerate() {
        if let Err(reason) = validate_identifier(&step.entity) {
            return Err(Error::InvalidNavigation {
                index,
                reason: format!("entity '{}' {}", step.entity, reason),
            });
        }

        let filter = step
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
            .map(str::to_string);

        segments.push(PathSegment {
            text: keyed_segment(&step.entity, step.key.as_ref(), keys)?,
            filter,
        });
    }

    let path = ResourcePath::new(segments);
    debug!(path = %path, steps = chain.len(), "compiled navigation path");
    Ok(path)
}

fn keyed_segment(entity: &str, key: Option<&EntityKey>, keys: &KeyFormatter) -> Result<String> {
    match key {
        Some(key) if !key.is_blank() => Ok(format!("{}{}", entity, keys.format(key)?)),
        _ => Ok(entity.to_string()),
    }
}
