//! URL Parser: the inverse of the assembler.
//!
//! Splits an absolute OData URL into base URL, service name, entity and key,
//! navigation chain, and query options. The service segment is the first one
//! shaped like a service (`API_*`, `*_SRV`, `*.svc`, no key predicate) that
//! still has an entity segment after it. Failing that it follows the
//! conventional `/odata/[sap/]` prefix, and otherwise it is the first path
//! segment. The base URL keeps the scheme and authority exactly as written.

use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::key::{parse_key_segment, validate_identifier, EntityKey, KeyFormatter};
use crate::navigation::{compile_navigation, NavigationChain, NavigationStep};
use crate::query::{decode_component, QueryOptions};
use crate::request::{HttpMethod, ODataRequest};

/// Components of an OData URL. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedODataUrl {
    pub base_url: String,
    pub service_name: String,
    pub entity: String,
    pub key: Option<EntityKey>,
    pub navigation_chain: NavigationChain,
    pub query_options: QueryOptions,
    /// `sap-client` query parameter; it also stays in `query_options.custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sap_client: Option<String>,
    /// `sap-language` query parameter; it also stays in `query_options.custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sap_language: Option<String>,
}

impl ParsedODataUrl {
    /// Re-render this URL through the navigation compiler and assembler.
    pub fn to_url(&self) -> Result<String> {
        let path = compile_navigation(
            &self.entity,
            self.key.as_ref(),
            &self.navigation_chain,
            &KeyFormatter::new(),
        )?;
        crate::url::assemble_url(&self.base_url, &self.service_name, &path, &self.query_options)
    }

    /// Structured request equivalent to this URL.
    ///
    /// `sap-client`/`sap-language` drive the request headers and stay in the
    /// custom parameters, so the rebuilt URL is unchanged.
    pub fn to_request(&self, http_method: HttpMethod) -> ODataRequest {
        let options = self.query_options.clone();
        ODataRequest {
            http_method,
            base_url: self.base_url.clone(),
            service_name: self.service_name.clone(),
            source_entity: self.entity.clone(),
            source_key: self.key.clone(),
            navigation_property: Some(crate::NavigationProperty::Steps(
                self.navigation_chain.steps().to_vec(),
            )),
            select: options.select,
            filter: options.filter,
            expand: options.expand,
            top: options.top,
            skip: options.skip,
            orderby: options.orderby,
            inlinecount: options.inlinecount,
            format: options.format,
            skiptoken: options.skiptoken,
            search: options.search,
            deltatoken: options.deltatoken,
            levels: options.levels,
            from_date: options.from_date,
            to_date: options.to_date,
            custom_params: options.custom,
            sap_client: self.sap_client.clone(),
            sap_language: self.sap_language.clone(),
            ..ODataRequest::default()
        }
    }
}

/// Decompose `raw` into its OData components.
pub fn parse_odata_url(raw: &str) -> Result<ParsedODataUrl> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| {
        Error::malformed(None, format!("'{}' is not an absolute URL: {}", trimmed, err))
    })?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::malformed(None, "URL has no host"));
    }

    let path = percent_decode_str(parsed.path())
        .decode_utf8()
        .map_err(|_| Error::malformed(Some(parsed.path()), "path is not valid UTF-8"))?;
    let segments = split_path(&path);
    if segments.is_empty() {
        return Err(Error::malformed(
            None,
            "URL has no path beyond scheme and host",
        ));
    }

    let service_idx = locate_service(&segments);
    let Some(entity_segment) = segments.get(service_idx + 1) else {
        return Err(Error::malformed(
            Some(segments[service_idx]),
            "URL has no entity segment after the service name",
        ));
    };

    let authority = authority_prefix(trimmed)
        .map(str::to_string)
        .unwrap_or_else(|| parsed.origin().ascii_serialization());
    let base_url = segments[..service_idx]
        .iter()
        .fold(authority, |mut acc, segment| {
            acc.push('/');
            acc.push_str(segment);
            acc
        });

    let (entity, key) = parse_entity_segment(entity_segment)?;
    let mut navigation_chain = NavigationChain::default();
    for segment in &segments[service_idx + 2..] {
        let (entity, key) = parse_entity_segment(segment)?;
        navigation_chain.push(NavigationStep {
            entity,
            key,
            filter: None,
        });
    }

    let mut query_options = QueryOptions::default();
    if let Some(query) = parsed.query() {
        for pair in query.split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = decode_component(name)?;
            if name.is_empty() {
                continue;
            }
            query_options.assign(&name, decode_component(value)?)?;
        }
    }

    let result = ParsedODataUrl {
        base_url,
        service_name: segments[service_idx].to_string(),
        entity,
        key,
        navigation_chain,
        sap_client: query_options.custom_value("sap-client").map(str::to_string),
        sap_language: query_options.custom_value("sap-language").map(str::to_string),
        query_options,
    };
    debug!(
        service = %result.service_name,
        entity = %result.entity,
        steps = result.navigation_chain.len(),
        "parsed OData URL"
    );
    Ok(result)
}

fn parse_entity_segment(segment: &str) -> Result<(String, Option<EntityKey>)> {
    let (name, key) = parse_key_segment(segment)?;
    if let Err(reason) = validate_identifier(&name) {
        return Err(Error::malformed(
            Some(segment),
            format!("entity name {}", reason),
        ));
    }
    Ok((name, key))
}

/// Scheme and authority exactly as written, e.g. `https://user@h.com:443`.
fn authority_prefix(raw: &str) -> Option<&str> {
    let start = raw.find("://")? + 3;
    let end = raw[start..]
        .find(|c| matches!(c, '/' | '?' | '#'))
        .map_or(raw.len(), |idx| start + idx);
    Some(&raw[..end])
}

/// `_SRV` and `.svc` mark a service outright; an `API_` prefix only when nothing stronger matches.
fn service_marker_rank(segment: &str) -> Option<u8> {
    if segment.contains('(') {
        return None;
    }
    if segment.to_ascii_uppercase().ends_with("_SRV") || segment.ends_with(".svc") {
        Some(0)
    } else if segment.starts_with("API_") {
        Some(1)
    } else {
        None
    }
}

fn locate_service(segments: &[&str]) -> usize {
    let last = segments.len().saturating_sub(1);
    let marked = (0..last)
        .filter_map(|idx| service_marker_rank(segments[idx]).map(|rank| (rank, idx)))
        .min();
    if let Some((_, idx)) = marked {
        return idx;
    }

    if let Some(odata) = segments.iter().position(|s| s.eq_ignore_ascii_case("odata")) {
        let mut candidate = odata + 1;
        if segments
            .get(candidate)
            .is_some_and(|s| s.eq_ignore_ascii_case("sap"))
            && candidate + 2 < segments.len()
        {
            candidate += 1;
        }
        if candidate < segments.len() {
            return candidate;
        }
    }

    0
}

/// Split on `/` outside quotes and key parentheses, dropping empty segments.
fn split_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quote = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (idx, c) in path.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            '/' if !in_quote && depth == 0 => {
                if idx > start {
                    segments.push(&path[start..idx]);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }
    if path.len() > start {
        segments.push(&path[start..]);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyValue;

    #[test]
    fn parses_keyed_navigation() {
        let parsed = parse_odata_url("https://s.com/SRV/A_SalesOrder('5001')/to_Items('10')").unwrap();
        assert_eq!(parsed.base_url, "https://s.com");
        assert_eq!(parsed.service_name, "SRV");
        assert_eq!(parsed.entity, "A_SalesOrder");
        assert_eq!(parsed.key, Some(EntityKey::single("5001")));
        assert_eq!(
            parsed.navigation_chain,
            NavigationChain::new(vec![
                NavigationStep::new("to_Items").with_key(EntityKey::single("10"))
            ])
        );
    }

    #[test]
    fn locates_sap_service_behind_path_prefix() {
        let parsed = parse_odata_url(
            "https://my.s4hana.ondemand.com/sap/opu/odata/sap/API_BUSINESS_PARTNER/A_Supplier(BusinessPartner='12345',Supplier='12345')",
        )
        .unwrap();
        assert_eq!(parsed.base_url, "https://my.s4hana.ondemand.com/sap/opu/odata/sap");
        assert_eq!(parsed.service_name, "API_BUSINESS_PARTNER");
        assert_eq!(parsed.entity, "A_Supplier");
        assert_eq!(
            parsed.key,
            Some(EntityKey::composite([
                ("BusinessPartner", "12345"),
                ("Supplier", "12345")
            ]))
        );
        assert!(parsed.navigation_chain.is_empty());
    }

    #[test]
    fn odata_prefix_without_marker() {
        let parsed = parse_odata_url("https://h.example/odata/sap/ZSALES/Orders").unwrap();
        assert_eq!(parsed.base_url, "https://h.example/odata/sap");
        assert_eq!(parsed.service_name, "ZSALES");
        assert_eq!(parsed.entity, "Orders");
    }

    #[test]
    fn maps_query_options_onto_slots() {
        let parsed = parse_odata_url(
            "https://s.com/SRV/Orders?$top=10&sap-client=100&$filter=Status%20eq%20'A'&$select=Id,Name&flag",
        )
        .unwrap();
        let options = parsed.query_options;
        assert_eq!(options.top, Some(10));
        assert_eq!(options.filter.as_deref(), Some("Status eq 'A'"));
        assert_eq!(options.select.as_deref(), Some("Id,Name"));
        assert_eq!(
            options.custom,
            vec![("sap-client".to_string(), "100".to_string())]
        );
        assert_eq!(parsed.sap_client.as_deref(), Some("100"));
    }

    #[test]
    fn maps_sap_parameters_onto_request_slots() {
        let url = "https://s.com/SRV/Orders?$deltatoken=D1&$levels=2&fromDate=2024-01-01&toDate=2024-12-31&sap-client=200&sap-language=DE";
        let parsed = parse_odata_url(url).unwrap();
        assert_eq!(parsed.query_options.deltatoken.as_deref(), Some("D1"));
        assert_eq!(parsed.query_options.levels, Some(2));
        assert_eq!(parsed.sap_language.as_deref(), Some("DE"));

        let request = parsed.to_request(HttpMethod::Get);
        assert_eq!(request.from_date.as_deref(), Some("2024-01-01"));
        assert_eq!(request.to_date.as_deref(), Some("2024-12-31"));
        assert_eq!(request.sap_client.as_deref(), Some("200"));
        assert_eq!(request.sap_language.as_deref(), Some("DE"));
        assert_eq!(request.compile_url().unwrap(), url);
    }

    #[test]
    fn service_marker_needs_an_entity_after_it() {
        let parsed = parse_odata_url("https://s.com/SRV/API_Orders('5001')").unwrap();
        assert_eq!(parsed.service_name, "SRV");
        assert_eq!(parsed.entity, "API_Orders");
        assert_eq!(parsed.key, Some(EntityKey::single("5001")));

        let parsed = parse_odata_url("https://s.com/SRV/API_Orders").unwrap();
        assert_eq!(parsed.service_name, "SRV");
        assert_eq!(parsed.entity, "API_Orders");

        let parsed =
            parse_odata_url("https://s.com/API_ORDER_SRV/API_Orders/to_Items").unwrap();
        assert_eq!(parsed.service_name, "API_ORDER_SRV");
        assert_eq!(parsed.entity, "API_Orders");
        assert_eq!(parsed.navigation_chain.steps().len(), 1);
    }

    #[test]
    fn base_url_keeps_authority_as_written() {
        let url = "https://gateway@s.com:443/sap/opu/odata/sap/API_SALES_ORDER_SRV/A_SalesOrder";
        let parsed = parse_odata_url(url).unwrap();
        assert_eq!(parsed.base_url, "https://gateway@s.com:443/sap/opu/odata/sap");
        assert_eq!(parsed.to_url().unwrap(), url);
    }

    #[test]
    fn integer_keys_stay_unquoted_on_round_trip() {
        let url = "https://s.com/SRV/Products(42)/to_Supplier";
        let parsed = parse_odata_url(url).unwrap();
        assert_eq!(parsed.key, Some(EntityKey::Single(KeyValue::Integer(42))));
        assert_eq!(parsed.to_url().unwrap(), url);
    }

    #[test]
    fn slash_inside_key_literal_does_not_split() {
        let parsed = parse_odata_url("https://s.com/SRV/Docs('a%2Fb')").unwrap();
        assert_eq!(parsed.key, Some(EntityKey::single("a/b")));
    }

    #[test]
    fn rejects_urls_without_path_or_entity() {
        assert!(matches!(
            parse_odata_url("https://s.com").unwrap_err(),
            Error::MalformedUrl { .. }
        ));
        assert!(matches!(
            parse_odata_url("https://s.com/SRV").unwrap_err(),
            Error::MalformedUrl { .. }
        ));
        assert!(matches!(
            parse_odata_url("not a url").unwrap_err(),
            Error::MalformedUrl { .. }
        ));
    }

    #[test]
    fn rejects_unclosed_key_predicate() {
        let err = parse_odata_url("https://s.com/SRV/A_SalesOrder('5001'").unwrap_err();
        match err {
            Error::MalformedUrl { segment, .. } => {
                assert_eq!(segment.as_deref(), Some("A_SalesOrder('5001'"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn to_request_carries_components() {
        let parsed =
            parse_odata_url("https://s.com/SRV/A_SalesOrder('1')/to_Item?$top=2&fromDate=2024")
                .unwrap();
        let request = parsed.to_request(HttpMethod::Get);
        assert_eq!(request.source_entity, "A_SalesOrder");
        assert_eq!(request.top, Some(2));
        assert_eq!(request.from_date.as_deref(), Some("2024"));
        assert!(request.custom_params.is_empty());
    }
}
