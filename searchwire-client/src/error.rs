//! Error types and response classification.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for searchwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the dispatch core.
#[derive(Debug, Error)]
pub enum Error {
    /// A configured or requested URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Conflicting or invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The underlying transport could not be built.
    #[error("Failed to build HTTP transport: {0}")]
    Build(String),

    /// Every configured node is currently marked dead.
    #[error("no Elasticsearch node available")]
    NoClientAvailable,

    /// Connection refused, DNS failure and other transport faults.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller-supplied deadline elapsed before a response arrived.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Elastic(#[from] ElasticError),

    /// The response body exceeded the configured limit.
    #[error("Response body exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Maximum accepted size in bytes.
        limit: u64,
    },

    /// Malformed or unexpected JSON.
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error while encoding a request body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A service builder was missing required parameters.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// The typed server error, if this is one.
    pub fn as_elastic(&self) -> Option<&ElasticError> {
        match self {
            Self::Elastic(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status reported by the server, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Elastic(e) => Some(e.status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this is a "not found" server error.
    pub fn is_not_found(&self) -> bool {
        is_not_found(self)
    }

    /// Check if this is a timeout, client or server side.
    pub fn is_timeout(&self) -> bool {
        is_timeout(self)
    }
}

/// Structured error returned by Elasticsearch.
///
/// `status` is always populated; `details` only when the server sent a
/// decodable error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticError {
    /// HTTP status code.
    #[serde(default)]
    pub status: u16,
    /// Server supplied details.
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl ElasticError {
    /// Error carrying only a status code.
    pub fn from_status(status: u16) -> Self {
        Self {
            status,
            details: None,
        }
    }

    fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }
}

impl fmt::Display for ElasticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(
                f,
                "elastic: Error {} ({}): {} [type={}]",
                self.status,
                self.status_text(),
                details.reason,
                details.kind
            ),
            None => write!(f, "elastic: Error {} ({})", self.status, self.status_text()),
        }
    }
}

impl std::error::Error for ElasticError {}

/// Details of a server error, nested for causes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDetails {
    /// Exception type, e.g. `index_not_found_exception`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
    /// Kind of the offending resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Identifier of the offending resource.
    #[serde(rename = "resource.id", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<serde_json::Value>,
    /// Offending index name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Search phase that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Whether shard failures were grouped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouped: Option<bool>,
    /// Underlying cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ErrorDetails>>,
    /// Root causes, same shape as this value.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorDetails>,
    /// Raw per-shard failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_shards: Vec<serde_json::Value>,
}

/// Older servers answer with a plain string in `error`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Details(ErrorDetails),
    Message(String),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<ErrorField>,
}

/// Classify a response.
///
/// Statuses in `200..=299` and those listed in `ignore_errors` are success.
/// Anything else becomes an [`ElasticError`]; a body that is empty or not a
/// JSON error envelope yields an error carrying only `status`.
pub fn check_response(status: StatusCode, body: &[u8], ignore_errors: &[u16]) -> Result<()> {
    if status.is_success() || ignore_errors.contains(&status.as_u16()) {
        return Ok(());
    }
    Err(Error::Elastic(decode_error(status, body)))
}

fn decode_error(status: StatusCode, body: &[u8]) -> ElasticError {
    if body.iter().all(u8::is_ascii_whitespace) {
        return ElasticError::from_status(status.as_u16());
    }

    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let details = envelope.error.map(|field| match field {
                ErrorField::Details(details) => details,
                ErrorField::Message(reason) => ErrorDetails {
                    reason,
                    ..Default::default()
                },
            });
            ElasticError {
                status: envelope
                    .status
                    .filter(|s| *s != 0)
                    .unwrap_or(status.as_u16()),
                details,
            }
        }
        Err(e) => {
            tracing::debug!(status = %status, error = %e, "Error body is not a JSON envelope");
            ElasticError::from_status(status.as_u16())
        }
    }
}

fn has_status(err: &Error, code: u16) -> bool {
    matches!(err, Error::Elastic(e) if e.status == code)
}

/// True only for a typed server error with status 404.
pub fn is_not_found(err: &Error) -> bool {
    has_status(err, 404)
}

/// True for a typed server error with status 409.
pub fn is_conflict(err: &Error) -> bool {
    has_status(err, 409)
}

/// True for a typed server error with status 401.
pub fn is_unauthorized(err: &Error) -> bool {
    has_status(err, 401)
}

/// True for a typed server error with status 403.
pub fn is_forbidden(err: &Error) -> bool {
    has_status(err, 403)
}

/// True for a server-side 408 or a client-side deadline.
pub fn is_timeout(err: &Error) -> bool {
    match err {
        Error::Timeout(_) => true,
        Error::Transport(e) => e.is_timeout(),
        _ => has_status(err, 408),
    }
}

/// True for a typed server error with the given status.
pub fn is_status_code(err: &Error, code: u16) -> bool {
    has_status(err, code)
}

/// True when no node could be reached.
pub fn is_connection_error(err: &Error) -> bool {
    match err {
        Error::NoClientAvailable => true,
        Error::Transport(e) => e.is_connect(),
        _ => false,
    }
}
