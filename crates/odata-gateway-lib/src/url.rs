//! URL Assembler.

use url::Url;

use crate::error::{Error, Result};
use crate::navigation::ResourcePath;
use crate::query::{compile_query, QueryOptions};

/// Check that `raw` is an absolute URL with a scheme and a host.
pub fn validate_absolute_url(raw: &str) -> Result<Url> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("URL is empty"));
    }

    let parsed = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host"));
    }
    Ok(parsed)
}

/// Join base URL, service path, resource path and query options.
///
/// A last-step filter carried by `path` is folded into `$filter`. When the
/// path already carries an inline step filter the query opens with `&`.
pub fn assemble_url(
    base_url: &str,
    service_name: &str,
    path: &ResourcePath,
    options: &QueryOptions,
) -> Result<String> {
    let parsed = validate_absolute_url(base_url)?;
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(Error::InvalidUrl {
            url: base_url.to_string(),
            reason: "base URL must not carry a query string or fragment".to_string(),
        });
    }

    let base = base_url.trim().trim_end_matches('/');
    let service = service_name.trim().trim_matches('/');
    if service.is_empty() {
        return Err(Error::validation("service_name", "is required"));
    }

    let query = compile_query(&options.clone().with_step_filter(path.query_filter()));
    let mut url = format!("{}/{}/{}", base, service, path.render());
    if let Some(params) = query.strip_prefix('?') {
        url.push(if path.has_inline_query() { '&' } else { '?' });
        url.push_str(params);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{EntityKey, KeyFormatter};
    use crate::navigation::{compile_navigation, NavigationChain, NavigationStep};

    fn top(n: u64) -> QueryOptions {
        QueryOptions {
            top: Some(n),
            ..QueryOptions::default()
        }
    }

    fn path(chain: NavigationChain) -> ResourcePath {
        compile_navigation(
            "A_SalesOrder",
            Some(&EntityKey::single("5001")),
            &chain,
            &KeyFormatter::new(),
        )
        .unwrap()
    }

    #[test]
    fn trims_duplicate_slashes() {
        let url = assemble_url(
            "https://sap.example.com/",
            "/sap/opu/odata/sap/API_SALES_ORDER_SRV/",
            &path(NavigationChain::default()),
            &top(1),
        )
        .unwrap();
        assert_eq!(
            url,
            "https://sap.example.com/sap/opu/odata/sap/API_SALES_ORDER_SRV/A_SalesOrder('5001')?$top=1"
        );
    }

    #[test]
    fn query_joins_with_ampersand_after_inline_filter() {
        let chain = NavigationChain::new(vec![
            NavigationStep::new("to_Items").with_filter("Status eq 'ACTIVE'"),
            NavigationStep::new("to_Product"),
        ]);
        let url = assemble_url("https://s.com", "SRV", &path(chain), &top(5)).unwrap();
        assert_eq!(
            url,
            "https://s.com/SRV/A_SalesOrder('5001')/to_Items?$filter=Status eq 'ACTIVE'/to_Product&$top=5"
        );
    }

    #[test]
    fn last_step_filter_takes_canonical_position() {
        let chain = NavigationChain::new(vec![
            NavigationStep::new("to_Items").with_filter("Status eq 'ACTIVE'")
        ]);
        let options = QueryOptions {
            select: Some("Id".to_string()),
            ..top(5)
        };
        let url = assemble_url("https://s.com", "SRV", &path(chain), &options).unwrap();
        assert_eq!(
            url,
            "https://s.com/SRV/A_SalesOrder('5001')/to_Items?$select=Id&$filter=Status eq 'ACTIVE'&$top=5"
        );
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = assemble_url(
            "sap.example.com",
            "SRV",
            &path(NavigationChain::default()),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn base_url_with_query_is_rejected() {
        let err = assemble_url(
            "https://s.com/?a=1",
            "SRV",
            &path(NavigationChain::default()),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn empty_service_is_validation_error() {
        let err = assemble_url(
            "https://s.com",
            "//",
            &path(NavigationChain::default()),
            &QueryOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        assert!(validate_absolute_url("ftp://s.com/file").is_err());
        assert!(validate_absolute_url("https://s.com/SRV/A").is_ok());
    }
}
