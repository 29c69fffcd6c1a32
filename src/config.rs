//! Node, transport, pool and sniff configuration: immutable descriptors plus
//! `Default`-and-presets tunables, following the same shape as a production HTTP client's
//! `HttpClientConfig`.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

/// Request scheme for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// TLS protocol version a node is willing to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// TLS-specific settings for a [`NodeConfig`].
///
/// Kept as its own struct (rather than flattened into `NodeConfig`) because it is the part of
/// node identity callers most often vary independently of the endpoint: two configs naming the
/// same `host`/`port` with different TLS options are distinct nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TlsConfig {
    /// Verify the peer certificate chain. Disabling this is a security warning, logged (not
    /// raised) at Transport construction.
    pub verify_certs: bool,
    /// Path to a CA bundle used instead of the native root store.
    pub ca_certs: Option<String>,
    /// Path to a client certificate for mutual TLS.
    pub client_cert: Option<String>,
    /// Secret client key matching `client_cert`. Never appears in `Debug` output.
    pub client_key: Option<SecretString>,
    /// Opaque identifier for a caller-provided TLS context. The core never interprets this; it
    /// exists purely so two nodes pointing at different externally-constructed TLS setups are
    /// distinguished by identity. See `DESIGN.md` for the rationale.
    pub ssl_context: Option<String>,
    /// Pin the peer certificate to a specific fingerprint (hex-encoded).
    pub ssl_assert_fingerprint: Option<String>,
    /// Override the hostname used for TLS certificate verification (SNI + hostname check).
    pub ssl_assert_hostname: Option<String>,
    /// Emit a warning when TLS verification is relaxed.
    pub ssl_show_warn: bool,
    /// Restrict the TLS protocol version negotiated with this node.
    pub ssl_version: Option<TlsVersion>,
}

/// Case-insensitive, hashable header bag.
///
/// Wraps [`http::HeaderMap`], whose `HeaderName` key type already canonicalizes to lowercase on
/// insertion — that gives case-insensitive lookups and merges for free instead of hand-rolling a
/// map. The wrapper only adds `Hash` (order-independent, since `HeaderMap`'s own `PartialEq` is
/// already order-independent) so it can participate in [`NodeConfig`]'s identity hash.
#[derive(Debug, Clone, Default)]
pub struct NodeHeaders(pub HeaderMap);

impl PartialEq for NodeHeaders {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for NodeHeaders {}

impl Hash for NodeHeaders {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut pairs: Vec<(&str, &[u8])> = self
            .0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes()))
            .collect();
        pairs.sort_unstable();
        pairs.hash(state);
    }
}

impl NodeHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_inner(self) -> HeaderMap {
        self.0
    }
}

impl From<HeaderMap> for NodeHeaders {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

/// Immutable endpoint descriptor. Identity is a stable hash over *every* field — two configs
/// naming the same endpoint with different TLS options are distinct nodes (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Prepended to every request target when non-empty.
    pub path_prefix: String,
    pub headers: NodeHeaders,
    pub connections_per_node: usize,
    pub request_timeout: Option<Duration>,
    pub tls: TlsConfig,
    pub http_compress: bool,
    /// Emitted as `X-Opaque-Id` when set.
    pub opaque_id: Option<String>,
    /// Test-only escape hatch for arbitrary extra identity-bearing data.
    pub extras: Vec<(String, String)>,
}

impl NodeConfig {
    /// Construct a config with the given endpoint and otherwise-default options.
    #[must_use]
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            path_prefix: String::new(),
            headers: NodeHeaders::default(),
            connections_per_node: 10,
            request_timeout: None,
            tls: TlsConfig::default(),
            http_compress: false,
            opaque_id: None,
            extras: Vec::new(),
        }
    }

    /// The base URL this config derives: `scheme://host:port<path_prefix>`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path_prefix
        )
    }
}

/// Exponential backoff for exhausted (dead) nodes: `min(max, 60 * factor * 2^(failures - 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub dead_backoff_factor: f64,
    #[serde(with = "crate::humantime_serde")]
    pub max_dead_backoff: Duration,
    /// Shuffle the initial seed order at construction time.
    pub randomize_nodes: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dead_backoff_factor: 1.0,
            max_dead_backoff: Duration::from_secs(30),
            randomize_nodes: true,
        }
    }
}

impl PoolConfig {
    /// Backoff grows faster and caps higher — useful when dead nodes are expected to take a
    /// while to recover and retry storms against them are costly.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            dead_backoff_factor: 2.0,
            max_dead_backoff: Duration::from_secs(120),
            randomize_nodes: true,
        }
    }

    /// No shuffling, minimal backoff — deterministic ordering for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            dead_backoff_factor: 0.01,
            max_dead_backoff: Duration::from_millis(50),
            randomize_nodes: false,
        }
    }
}

/// HTTP statuses that indicate the node is healthy and only the request was bad; `mark_dead` is
/// skipped for these.
#[must_use]
pub fn not_dead_node_statuses() -> HashSet<u16> {
    [400, 401, 403, 404].into_iter().collect()
}

/// Ergonomic conversion into a status-code set: a bare `u16` coerces to a one-element set just as
/// readily as a `Vec`, array, slice, or an existing `HashSet` (`std` has no blanket
/// `From<Vec<T>>`/`From<T>` for `HashSet<T>`, so `perform_request`'s `ignore_status` parameter
/// uses this instead of `Into<HashSet<u16>>`).
pub trait IntoStatusSet {
    fn into_status_set(self) -> HashSet<u16>;
}

impl IntoStatusSet for u16 {
    fn into_status_set(self) -> HashSet<u16> {
        std::iter::once(self).collect()
    }
}

impl IntoStatusSet for HashSet<u16> {
    fn into_status_set(self) -> HashSet<u16> {
        self
    }
}

impl IntoStatusSet for Vec<u16> {
    fn into_status_set(self) -> HashSet<u16> {
        self.into_iter().collect()
    }
}

impl IntoStatusSet for &[u16] {
    fn into_status_set(self) -> HashSet<u16> {
        self.iter().copied().collect()
    }
}

impl<const N: usize> IntoStatusSet for [u16; N] {
    fn into_status_set(self) -> HashSet<u16> {
        self.into_iter().collect()
    }
}

/// Transport-level retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub max_retries: usize,
    pub retry_on_status: HashSet<u16>,
    pub retry_on_timeout: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_on_status: [429, 502, 503, 504].into_iter().collect(),
            retry_on_timeout: false,
        }
    }
}

impl TransportConfig {
    /// Retries harder: more attempts, and 5xx responses join `retry_on_status`.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            retry_on_status: [429, 500, 501, 502, 503, 504].into_iter().collect(),
            retry_on_timeout: true,
        }
    }

    /// A single attempt, no retries. Useful for callers that implement their own retry policy
    /// above the transport.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            retry_on_status: HashSet::new(),
            retry_on_timeout: false,
        }
    }
}

/// Sniffing cadence and trigger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniffConfig {
    pub sniff_on_start: bool,
    pub sniff_before_requests: bool,
    pub sniff_on_node_failure: bool,
    #[serde(with = "crate::humantime_serde")]
    pub min_delay_between_sniffing: Duration,
    #[serde(with = "crate::humantime_serde")]
    pub sniff_timeout: Duration,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            sniff_on_start: false,
            sniff_before_requests: false,
            sniff_on_node_failure: false,
            min_delay_between_sniffing: Duration::from_secs(10),
            sniff_timeout: Duration::from_secs(1),
        }
    }
}

impl SniffConfig {
    /// All triggers enabled, short cadence — the shape used by the threaded-stress scenario.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            sniff_on_start: true,
            sniff_before_requests: true,
            sniff_on_node_failure: true,
            min_delay_between_sniffing: Duration::from_millis(100),
            sniff_timeout: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn any_trigger_enabled(&self) -> bool {
        self.sniff_on_start || self.sniff_before_requests || self.sniff_on_node_failure
    }
}

/// Extra per-NodeConfig bookkeeping the pool needs but that doesn't belong on the immutable
/// config itself, e.g. for sniff heterogeneous-seed warnings.
pub(crate) fn seeds_are_homogeneous(seeds: &[NodeConfig]) -> bool {
    let Some(first) = seeds.first() else {
        return true;
    };
    seeds.iter().all(|n| {
        n.path_prefix == first.path_prefix
            && n.headers == first.headers
            && n.connections_per_node == first.connections_per_node
            && n.request_timeout == first.request_timeout
            && n.tls == first.tls
            && n.http_compress == first.http_compress
    })
}
