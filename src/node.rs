//! The `Node` interface required from any HTTP backend (§6.2). The transport core never reaches
//! past this trait — `HyperNode` (in `hyper_node.rs`) is the shipped implementation, but any type
//! meeting this contract is interchangeable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::response::ApiResponseMeta;

/// One outbound request as the transport hands it to a `Node`. Merging caller headers over node
/// defaults (caller wins) is the backend's responsibility per §6.2, so `headers` here is the
/// caller-supplied layer only; the backend combines it with its own `NodeConfig::headers`.
#[derive(Debug)]
pub struct NodeRequest<'a> {
    pub method: Method,
    /// Request path including query; the node prepends its own `base_url`.
    pub target: &'a str,
    pub headers: &'a HeaderMap,
    pub body: Option<Bytes>,
    /// `None` means "use the node's own default"; `Some(None)` means "no timeout".
    pub request_timeout: Option<Option<Duration>>,
}

/// The contract every HTTP backend must satisfy.
#[async_trait]
pub trait Node: Send + Sync + fmt::Debug {
    fn config(&self) -> &NodeConfig;

    fn base_url(&self) -> &str;

    fn http_compress(&self) -> bool {
        self.config().http_compress
    }

    /// Perform one HTTP request. Must translate low-level failures into
    /// [`TransportError::ConnectionTimeout`], [`TransportError::TlsError`], or
    /// [`TransportError::ConnectionError`] — never propagate a raw backend error type.
    async fn perform_request(
        &self,
        req: NodeRequest<'_>,
    ) -> Result<(ApiResponseMeta, Bytes), TransportError>;

    /// Release any pooled connections. Further `perform_request` calls after `close` are
    /// undefined from the backend's point of view (the `Transport` itself rejects them first).
    async fn close(&self);
}

/// Builds a `Node` from a `NodeConfig`. Boxed so callers can supply a closure or a named backend
/// interchangeably. Fallible, since building a backend can fail (e.g. no usable TLS root store).
pub type NodeFactory = Arc<dyn Fn(NodeConfig) -> Result<Arc<dyn Node>, TransportError> + Send + Sync>;
