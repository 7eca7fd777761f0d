//! Mock collaborators for tests. Enabled by the `test-utils` feature.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::auth::{AuthProvider, AuthType, CredentialsContext};
use crate::error::{AuthError, TransportError};
use crate::transport::{OutboundRequest, Transport, TransportResponse};

/// Auth provider that always returns the same headers or the same failure.
pub struct StaticAuthProvider {
    outcome: Result<Vec<(String, String)>, AuthError>,
    calls: Mutex<Vec<(AuthType, CredentialsContext)>>,
}

impl StaticAuthProvider {
    pub fn with_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            outcome: Ok(headers
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AuthError) -> Self {
        Self {
            outcome: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Auth modes and contexts this provider was asked for, in order.
    pub fn calls(&self) -> Vec<(AuthType, CredentialsContext)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn headers(
        &self,
        auth_type: AuthType,
        context: &CredentialsContext,
    ) -> Result<Vec<(String, String)>, AuthError> {
        self.calls.lock().push((auth_type, context.clone()));
        self.outcome.clone()
    }
}

/// Transport that replays queued responses and records every request.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<OutboundRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.lock().push_back(Ok(TransportResponse {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.into(),
        }));
        self
    }

    pub fn respond_json(self, status: u16, body: &Value) -> Self {
        self.respond(status, "application/json", body.to_string())
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Other {
                    detail: "no canned response queued".to_string(),
                })
            })
    }
}
