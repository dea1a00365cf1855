//! Error types for the delivery API client.
//!
//! # Design
//! Query construction errors (`InvalidFieldPath`, `InvalidOperandKind`,
//! `DuplicateParameter`) are caller bugs and are reported before any request
//! exists. `NotFound` gets a dedicated variant because callers frequently
//! distinguish "the resource does not exist" from "the server returned an
//! unexpected status". Transport failures reported by the host land in
//! `Request`. An unresolved link is not an error; it stays a
//! `FieldValue::Link` in the parsed graph.

use thiserror::Error;

/// Result type for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the query builder, the `DeliveryClient` parse methods
/// and the locale API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A field path was empty or contained an empty or reserved segment.
    #[error("invalid field path: {0:?}")]
    InvalidFieldPath(String),

    /// The operand does not fit the operator (wrong arity or kind).
    #[error("invalid operand for {field}[{operator}]: expected {expected}")]
    InvalidOperandKind {
        field: String,
        operator: String,
        expected: &'static str,
    },

    /// Two parts of a query produced the same wire parameter.
    #[error("duplicate query parameter: {0}")]
    DuplicateParameter(String),

    /// `set_locale` was called on a resource fetched with a single locale.
    #[error("resource {id} was not fetched with the wildcard locale")]
    LocaleNotWildcardFetched { id: String },

    /// The server returned 404, or a single-resource lookup came back empty.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {message}")]
    HttpError {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    /// The host failed to execute the request (network, TLS, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// A field held a value of a different kind than the mapping reads.
    #[error("field {field} of entry {id}: expected {expected}")]
    FieldType {
        id: String,
        field: String,
        expected: &'static str,
    },

    /// A required field was absent.
    #[error("entry {id} has no field {field}")]
    MissingField { id: String, field: String },

    /// A typed mapping was applied to an entry of another content type.
    #[error("entry {id} is not a {expected} (content type {found:?})")]
    ContentTypeMismatch {
        id: String,
        expected: &'static str,
        found: Option<String>,
    },

    /// Client configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The fetch was cancelled before a result was delivered.
    #[error("fetch cancelled")]
    Cancelled,
}

impl ApiError {
    /// Returns true for errors caused by malformed caller input rather than
    /// the server or the transport.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidFieldPath(_)
                | ApiError::InvalidOperandKind { .. }
                | ApiError::DuplicateParameter(_)
                | ApiError::LocaleNotWildcardFetched { .. }
                | ApiError::Config(_)
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound => Some(404),
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::DeserializationError(e.to_string())
    }
}
