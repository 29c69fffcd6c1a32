//! HTTP transport fronting a cluster of equivalent service nodes.
//!
//! A [`Transport`] owns a [`pool::NodePool`] (liveness tracking, dead-node backoff, pluggable
//! node selection) and a [`sniff::SniffController`] (single-flight node-list refresh), and runs
//! the retry loop described below against them. [`hyper_node::HyperNode`] is the
//! shipped `hyper`/`rustls` backend; any type implementing [`node::Node`] is interchangeable.
//!
//! ```no_run
//! use cluster_transport::{NodeConfig, Scheme, Transport};
//!
//! # async fn run() -> Result<(), cluster_transport::TransportError> {
//! let transport = Transport::builder(vec![NodeConfig::new(Scheme::Http, "localhost", 9200)])
//!     .build()
//!     .await?;
//! let (meta, _body) = transport
//!     .perform_request(http::Method::GET, "/", None, None, None, Vec::new())
//!     .await?;
//! assert!(meta.is_success());
//! # Ok(())
//! # }
//! ```

mod config;
mod dead_queue;
mod error;
mod hyper_node;
mod humantime_serde;
mod node;
mod pool;
mod response;
mod secret;
mod selector;
mod serializer;
mod sniff;
mod tls;
mod transport;

pub use config::{
    not_dead_node_statuses, IntoStatusSet, NodeConfig, NodeHeaders, PoolConfig, Scheme, SniffConfig,
    TlsConfig, TlsVersion, TransportConfig,
};
pub use error::{ApiError, ErrorKind, StatusTag, TransportError};
pub use hyper_node::HyperNode;
pub use node::{Node, NodeFactory, NodeRequest};
pub use pool::NodePool;
pub use response::{parse_mimetype, parse_retry_after, ApiResponseMeta};
pub use secret::SecretString;
pub use selector::{NodeSelector, Random, RoundRobin};
pub use serializer::{JsonSerializer, NdjsonSerializer, Serializer, SerializerRegistry, TextSerializer};
pub use sniff::{SniffCallback, SniffController, SniffOptions, SniffOutcome};
pub use transport::{RequestBody, ResponseBody, Transport, TransportBuilder};
