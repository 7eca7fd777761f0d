use thiserror::Error;

/// Convenient result alias for the OData gateway library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
///
/// Structural errors always name the field, key field, navigation step or URL
/// segment that failed so callers can debug without server-side logs.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when the incoming request shape is malformed or incomplete.
    #[error("invalid request field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Raised when a key value or composite key mapping cannot be rendered.
    #[error("invalid key{}: {reason}", format_field(.field))]
    InvalidKey {
        field: Option<String>,
        reason: String,
    },

    /// Raised when a navigation step cannot be compiled into a path segment.
    #[error("invalid navigation step {index}: {reason}")]
    InvalidNavigation { index: usize, reason: String },

    /// Raised when a base or direct URL is not an absolute URL.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Raised when an OData URL cannot be decomposed.
    #[error("malformed OData URL{}: {reason}", format_segment(.segment))]
    MalformedUrl {
        segment: Option<String>,
        reason: String,
    },

    /// Raised when a backend body is neither JSON, XML, nor decodable text.
    #[error("malformed backend response: {reason}")]
    MalformedResponse { reason: String },

    /// Raised when the auth collaborator cannot produce credentials.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Raised when the outbound call could not complete.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Raised when the caller abandoned the call before the backend answered.
    #[error("request was cancelled before the backend responded")]
    Cancelled,

    /// Catch-all for failures that fit no other class.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(segment: Option<&str>, reason: impl Into<String>) -> Self {
        Error::MalformedUrl {
            segment: segment.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// True for the deterministic input errors that callers must fix themselves.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::InvalidKey { .. }
                | Error::InvalidNavigation { .. }
                | Error::InvalidUrl { .. }
                | Error::MalformedUrl { .. }
        )
    }
}

/// Failures raised by an [`AuthProvider`](crate::AuthProvider).
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No username/password is configured for the requested mode.
    #[error("SAP username and password are required for {mode} authentication")]
    MissingCredentials { mode: String },

    /// A produced header value contained characters HTTP does not allow.
    #[error("authorization header '{name}' contains invalid characters")]
    InvalidHeader { name: String },

    /// The provider refused to issue credentials for this caller.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// The provider failed for a reason of its own.
    #[error("auth provider failure: {0}")]
    Provider(String),
}

/// Failures raised by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("backend request timed out: {detail}")]
    Timeout { detail: String },

    #[error("backend connection refused: {detail}")]
    Refused { detail: String },

    #[error("backend host could not be resolved: {detail}")]
    Dns { detail: String },

    #[error("backend transport failure: {detail}")]
    Other { detail: String },
}

impl TransportError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "timeout",
            TransportError::Refused { .. } => "refused",
            TransportError::Dns { .. } => "dns",
            TransportError::Other { .. } => "other",
        }
    }
}

fn format_field(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" for field '{}'", name),
        None => String::new(),
    }
}

fn format_segment(segment: &Option<String>) -> String {
    match segment {
        Some(segment) => format!(" at segment '{}'", segment),
        None => String::new(),
    }
}
