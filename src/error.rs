//! Error taxonomy: one `#[non_exhaustive]` tagged enum instead of a class hierarchy.

use bytes::Bytes;
use http::HeaderMap;

/// Recognized-status tag, a lookup from status code to name rather than a subclass tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatusTag {
    BadRequest,
    Unauthorized,
    PaymentRequired,
    Forbidden,
    NotFound,
    MethodNotImplemented,
    Conflict,
    RateLimit,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    Other,
}

impl StatusTag {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => StatusTag::BadRequest,
            401 => StatusTag::Unauthorized,
            402 => StatusTag::PaymentRequired,
            403 => StatusTag::Forbidden,
            404 => StatusTag::NotFound,
            405 => StatusTag::MethodNotImplemented,
            409 => StatusTag::Conflict,
            429 => StatusTag::RateLimit,
            500 => StatusTag::InternalServerError,
            501 => StatusTag::NotImplemented,
            502 => StatusTag::BadGateway,
            503 => StatusTag::ServiceUnavailable,
            504 => StatusTag::GatewayTimeout,
            _ => StatusTag::Other,
        }
    }
}

/// Coarse discriminant for callers that want to `match` on error shape without destructuring the
/// full enum (mirrors a single `kind` field rather than a type hierarchy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    ConnectionError,
    ConnectionTimeout,
    TlsError,
    Api,
    Serialization,
    Validation,
    Closed,
}

/// A server response that was classified as an error (non-2xx, not in `ignore_status`).
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub tag: StatusTag,
    pub body: Bytes,
    pub headers: HeaderMap,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server returned status {}", self.status)
    }
}

/// The transport's unified error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// DNS failure, connection refused, reset, or any other non-TLS, non-timeout connector
    /// failure.
    #[error("connection error: {0}")]
    ConnectionError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The node did not respond within the effective request timeout.
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    /// TLS handshake or certificate verification failure.
    #[error("tls error: {0}")]
    TlsError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server returned a non-2xx status not covered by `ignore_status`.
    #[error("api error: {0}")]
    Api(ApiError),

    /// Request or response body could not be (de)serialized for its declared MIME type.
    #[error("serialization error: {0}")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Caller-side misconfiguration: missing `Content-Type` for a structured body, unknown
    /// mimetype, or an inconsistent sniff configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// `perform_request` called after `Transport::close()`.
    #[error("transport is closed")]
    Closed,

    /// All attempts were exhausted; `last` is the final classified error and `errors` holds every
    /// prior swallowed error, oldest first.
    #[error("request failed after {} attempt(s): {last}", errors.len() + 1)]
    RetriesExhausted {
        #[source]
        last: Box<TransportError>,
        errors: Vec<TransportError>,
    },
}

impl TransportError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::ConnectionError(_) => ErrorKind::ConnectionError,
            TransportError::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            TransportError::TlsError(_) => ErrorKind::TlsError,
            TransportError::Api(_) => ErrorKind::Api,
            TransportError::Serialization(_) => ErrorKind::Serialization,
            TransportError::Validation(_) => ErrorKind::Validation,
            TransportError::Closed => ErrorKind::Closed,
            TransportError::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// The HTTP status carried by an `Api` error, if any (including when wrapped in
    /// `RetriesExhausted`).
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api(api) => Some(api.status),
            TransportError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// True for connection-level failures that are always retried regardless of configuration
    /// (DNS, refused, reset, TLS) — distinct from timeouts, which are gated by
    /// `retry_on_timeout`.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionError | ErrorKind::TlsError
        )
    }
}
