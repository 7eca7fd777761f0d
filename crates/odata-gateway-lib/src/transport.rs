//! Outbound HTTP transport.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::TransportError;
use crate::request::HttpMethod;

/// One outbound call, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Sends one request. Implementations perform no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by an async `reqwest` client.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| TransportError::Other {
                detail: format!("invalid header name '{}'", name),
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| TransportError::Other {
                detail: format!("invalid value for header '{}'", name),
            })?;
            headers.append(name, value);
        }

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        debug!(status, bytes = body.len(), "backend responded");
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// Map a reqwest failure onto the timeout/refused/dns/other subtypes.
fn classify(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    let detail = error_chain(&err);
    if err.is_timeout() {
        TransportError::Timeout { detail }
    } else if err.is_connect() {
        let lowered = detail.to_ascii_lowercase();
        if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            TransportError::Dns { detail }
        } else {
            TransportError::Refused { detail }
        }
    } else {
        TransportError::Other { detail }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = TransportResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Vec::new(),
        };
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header("etag"), None);
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let transport = ReqwestTransport::default();
        let err = transport
            .send(OutboundRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:9/SRV/A".to_string(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Refused { .. } | TransportError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn invalid_header_is_rejected_before_sending() {
        let transport = ReqwestTransport::default();
        let err = transport
            .send(OutboundRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:9/".to_string(),
                headers: vec![("bad header".to_string(), "x".to_string())],
                body: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "other");
    }
}
