//! `Transport`: the outer orchestrator (§4.1). Composes a `NodePool`, a serializer registry, and
//! a `SniffController`, and runs the retry loop against them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::{debug, warn};

use crate::config::{
    not_dead_node_statuses, IntoStatusSet, NodeConfig, PoolConfig, SniffConfig, TransportConfig,
};
use crate::error::{ApiError, StatusTag, TransportError};
use crate::hyper_node::HyperNode;
use crate::node::{Node, NodeFactory, NodeRequest};
use crate::pool::NodePool;
use crate::response::ApiResponseMeta;
use crate::selector::{NodeSelector, RoundRobin};
use crate::serializer::SerializerRegistry;
use crate::sniff::{SniffCallback, SniffController, SniffOutcome};

const TRANSPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A request body, either raw bytes or a value to be serialized per the target's `Content-Type`.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Bytes(Bytes),
    Structured(serde_json::Value),
}

/// A decoded (or opaque) response body. `Raw` is used when the response's MIME type has no
/// registered serializer — still returned to the caller rather than silently dropped.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Decoded(serde_json::Value),
    Raw(Bytes),
}

fn finalize(last: TransportError, errors: Vec<TransportError>) -> TransportError {
    if errors.is_empty() {
        last
    } else {
        TransportError::RetriesExhausted {
            last: Box::new(last),
            errors,
        }
    }
}

fn decode_body(
    serializers: &SerializerRegistry,
    is_head: bool,
    meta: &ApiResponseMeta,
    raw_body: Bytes,
) -> Result<Option<ResponseBody>, TransportError> {
    if is_head || raw_body.is_empty() {
        return Ok(None);
    }
    if let Some(mime) = &meta.mimetype {
        if let Some(serializer) = serializers.get(mime) {
            return serializer.deserialize(&raw_body).map(|v| Some(ResponseBody::Decoded(v)));
        }
    }
    Ok(Some(ResponseBody::Raw(raw_body)))
}

/// Builds a [`Transport`]. Construction is async because `sniff_on_start` performs one
/// synchronous sniff before the transport is usable.
pub struct TransportBuilder {
    node_configs: Vec<NodeConfig>,
    node_factory: Option<NodeFactory>,
    selector_factory: Box<dyn Fn() -> Box<dyn NodeSelector> + Send + Sync>,
    pool_config: PoolConfig,
    transport_config: TransportConfig,
    sniff_config: SniffConfig,
    sniff_callback: Option<SniffCallback>,
    serializers: SerializerRegistry,
    client_meta: Option<(String, String)>,
}

impl TransportBuilder {
    #[must_use]
    pub fn new(node_configs: Vec<NodeConfig>) -> Self {
        Self {
            node_configs,
            node_factory: None,
            selector_factory: Box::new(|| Box::new(RoundRobin::new())),
            pool_config: PoolConfig::default(),
            transport_config: TransportConfig::default(),
            sniff_config: SniffConfig::default(),
            sniff_callback: None,
            serializers: SerializerRegistry::default(),
            client_meta: None,
        }
    }

    /// Override the node backend. Defaults to `HyperNode`.
    #[must_use]
    pub fn node_factory(mut self, factory: NodeFactory) -> Self {
        self.node_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn selector_factory(
        mut self,
        factory: impl Fn() -> Box<dyn NodeSelector> + Send + Sync + 'static,
    ) -> Self {
        self.selector_factory = Box::new(factory);
        self
    }

    #[must_use]
    pub fn random_selector(self) -> Self {
        self.selector_factory(|| Box::new(crate::selector::Random::new()))
    }

    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: usize) -> Self {
        self.transport_config.max_retries = n;
        self
    }

    #[must_use]
    pub fn retry_on_status(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.transport_config.retry_on_status = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn retry_on_timeout(mut self, enabled: bool) -> Self {
        self.transport_config.retry_on_timeout = enabled;
        self
    }

    #[must_use]
    pub fn sniff_on_start(mut self, enabled: bool) -> Self {
        self.sniff_config.sniff_on_start = enabled;
        self
    }

    #[must_use]
    pub fn sniff_before_requests(mut self, enabled: bool) -> Self {
        self.sniff_config.sniff_before_requests = enabled;
        self
    }

    #[must_use]
    pub fn sniff_on_node_failure(mut self, enabled: bool) -> Self {
        self.sniff_config.sniff_on_node_failure = enabled;
        self
    }

    #[must_use]
    pub fn sniff_callback(mut self, callback: SniffCallback) -> Self {
        self.sniff_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn min_delay_between_sniffing(mut self, delay: Duration) -> Self {
        self.sniff_config.min_delay_between_sniffing = delay;
        self
    }

    #[must_use]
    pub fn sniff_timeout(mut self, timeout: Duration) -> Self {
        self.sniff_config.sniff_timeout = timeout;
        self
    }

    #[must_use]
    pub fn serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = serializers;
        self
    }

    /// Enable the `x-elastic-client-meta` header, tagging this transport's node backend.
    #[must_use]
    pub fn client_meta(mut self, node_tag: impl Into<String>, node_version: impl Into<String>) -> Self {
        self.client_meta = Some((node_tag.into(), node_version.into()));
        self
    }

    /// # Errors
    /// Returns a [`TransportError::Validation`] if the sniff configuration is inconsistent, or
    /// propagates the first node-construction failure.
    pub async fn build(self) -> Result<Transport, TransportError> {
        SniffController::validate(&self.sniff_config, self.sniff_callback.is_some())?;

        if self.sniff_config.any_trigger_enabled() && !crate::config::seeds_are_homogeneous(&self.node_configs) {
            warn!("seed NodeConfigs disagree on fields other than host/port; sniffed nodes will inherit the first seed's options");
        }

        let factory = self.node_factory.unwrap_or_else(default_hyper_node_factory);
        let pool = NodePool::new(
            self.node_configs,
            factory,
            (self.selector_factory)(),
            self.pool_config,
        )?;

        let sniff = SniffController::new(self.sniff_config.clone(), self.sniff_callback);

        let client_meta_header = self.client_meta.map(|(tag, version)| {
            let raw = format!("rs={TRANSPORT_VERSION},t={TRANSPORT_VERSION},{tag}={version}");
            HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static("rs=0,t=0"))
        });

        let transport = Transport {
            pool,
            transport_config: self.transport_config,
            sniff,
            serializers: self.serializers,
            client_meta_header,
            closed: AtomicBool::new(false),
        };

        if transport.sniff.config().sniff_on_start {
            match transport.sniff.sniff(true).await {
                SniffOutcome::Ran(nodes) => {
                    transport.pool.merge_sniffed(nodes);
                }
                SniffOutcome::Failed(err) => {
                    warn!(error = %err, "sniff-on-start failed; continuing with seed nodes only");
                }
                SniffOutcome::Skipped => {}
            }
        }

        Ok(transport)
    }
}

fn default_hyper_node_factory() -> NodeFactory {
    Arc::new(|config| HyperNode::new(config).map(|node| Arc::new(node) as Arc<dyn Node>))
}

/// The outer orchestrator composing a node pool, retry policy, and sniffing controller.
pub struct Transport {
    pool: NodePool,
    transport_config: TransportConfig,
    sniff: SniffController,
    serializers: SerializerRegistry,
    client_meta_header: Option<HeaderValue>,
    closed: AtomicBool,
}

impl Transport {
    #[must_use]
    pub fn builder(node_configs: Vec<NodeConfig>) -> TransportBuilder {
        TransportBuilder::new(node_configs)
    }

    /// Mark a node dead out of band, e.g. from a caller that learned of a bad node through some
    /// other channel.
    pub fn mark_dead(&self, config: &NodeConfig) {
        self.pool.mark_dead(config);
    }

    /// Trigger a manual sniff, merging any newly discovered nodes. Unlike the automatic
    /// triggers, a manual sniff's failure is propagated to the caller rather than swallowed.
    ///
    /// # Errors
    /// Returns the sniff callback's error if it fails.
    pub async fn sniff(&self) -> Result<(), TransportError> {
        match self.sniff.sniff(false).await {
            SniffOutcome::Ran(nodes) => {
                self.pool.merge_sniffed(nodes);
                Ok(())
            }
            SniffOutcome::Failed(err) => Err(err),
            SniffOutcome::Skipped => Ok(()),
        }
    }

    #[must_use]
    pub fn all_nodes(&self) -> Vec<NodeConfig> {
        self.pool.all().into_iter().map(|(c, _)| c).collect()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.pool.alive_count()
    }

    #[must_use]
    pub fn dead_count(&self) -> usize {
        self.pool.dead_count()
    }

    async fn trigger_sniff_on_failure(&self) {
        if !self.sniff.config().sniff_on_node_failure {
            return;
        }
        match self.sniff.sniff(false).await {
            SniffOutcome::Ran(nodes) => {
                self.pool.merge_sniffed(nodes);
            }
            SniffOutcome::Failed(err) => {
                warn!(error = %err, "sniff-on-node-failure failed");
            }
            SniffOutcome::Skipped => {}
        }
    }

    fn resolve_body(
        &self,
        body: Option<RequestBody>,
        headers: &HeaderMap,
    ) -> Result<Option<Bytes>, TransportError> {
        let bytes = match body {
            None => None,
            Some(RequestBody::Bytes(b)) => Some(b),
            Some(RequestBody::Structured(value)) => {
                let content_type = headers.get(http::header::CONTENT_TYPE).ok_or_else(|| {
                    TransportError::Validation(
                        "a structured body requires a Content-Type header".to_owned(),
                    )
                })?;
                let mime: mime::Mime = content_type
                    .to_str()
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| TransportError::Validation("invalid Content-Type header".to_owned()))?;
                let serializer = self.serializers.get(&mime).ok_or_else(|| {
                    TransportError::Validation(format!("no serializer registered for {mime}"))
                })?;
                Some(serializer.serialize(&value)?)
            }
        };
        // An empty body (zero-length bytes) is normalized to "no body" before dispatch.
        Ok(bytes.filter(|b| !b.is_empty()))
    }

    /// The primary entry point (§4.1, §6.1).
    ///
    /// `request_timeout`: outer `None` means "use the node's own default"; `Some(None)` means
    /// "no timeout"; `Some(Some(d))` overrides with `d`.
    ///
    /// # Errors
    /// Returns the final classified [`TransportError`] once retries (if any) are exhausted.
    pub async fn perform_request(
        &self,
        method: Method,
        target: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
        request_timeout: Option<Option<Duration>>,
        ignore_status: impl IntoStatusSet,
    ) -> Result<(ApiResponseMeta, Option<ResponseBody>), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let ignore_status = ignore_status.into_status_set();
        let mut effective_headers = headers.unwrap_or_default();
        if let Some(client_meta) = &self.client_meta_header {
            let header_name = HeaderName::from_static("x-elastic-client-meta");
            effective_headers
                .entry(header_name)
                .or_insert_with(|| client_meta.clone());
        }

        let body_bytes = self.resolve_body(body, &effective_headers)?;
        let is_head = method == Method::HEAD;

        if self.sniff.config().sniff_before_requests {
            match self.sniff.sniff_before_request_if_due().await {
                SniffOutcome::Ran(nodes) => {
                    self.pool.merge_sniffed(nodes);
                }
                SniffOutcome::Failed(err) => {
                    warn!(error = %err, "sniff-before-request failed");
                }
                SniffOutcome::Skipped => {}
            }
        }

        let not_dead = not_dead_node_statuses();
        let mut errors: Vec<TransportError> = Vec::new();

        for attempt in 0..=self.transport_config.max_retries {
            let is_last_attempt = attempt == self.transport_config.max_retries;

            let Some((node_config, node)) = self.pool.get() else {
                return Err(TransportError::Validation("node pool has no nodes".to_owned()));
            };

            let node_req = NodeRequest {
                method: method.clone(),
                target,
                headers: &effective_headers,
                body: body_bytes.clone(),
                request_timeout,
            };

            match node.perform_request(node_req).await {
                Ok((meta, raw_body)) => {
                    let status = meta.status;
                    let is_retryable_status = self.transport_config.retry_on_status.contains(&status);
                    let is_ignored = ignore_status.contains(&status);
                    // A status in both sets retries through every attempt but the last: retry
                    // takes precedence, and only the final attempt's response is returned.
                    let treat_as_success = (200..300).contains(&status)
                        || (is_ignored && (!is_retryable_status || is_last_attempt));

                    if treat_as_success {
                        self.pool.mark_live(&node_config);
                        let decoded = decode_body(&self.serializers, is_head, &meta, raw_body)?;
                        return Ok((meta, decoded));
                    }

                    let api_err = TransportError::Api(ApiError {
                        status,
                        tag: StatusTag::from_status(status),
                        body: raw_body,
                        headers: meta.headers.clone(),
                    });

                    if !is_retryable_status {
                        return Err(finalize(api_err, errors));
                    }

                    if !not_dead.contains(&status) {
                        self.pool.mark_dead(&node_config);
                        self.trigger_sniff_on_failure().await;
                    }

                    debug!(
                        attempt,
                        max_retries = self.transport_config.max_retries,
                        status,
                        host = %node_config.host,
                        "retrying after status"
                    );

                    if is_last_attempt {
                        return Err(finalize(api_err, errors));
                    }
                    errors.push(api_err);
                }
                Err(TransportError::ConnectionTimeout(d)) => {
                    let err = TransportError::ConnectionTimeout(d);
                    if !self.transport_config.retry_on_timeout {
                        return Err(finalize(err, errors));
                    }
                    self.pool.mark_dead(&node_config);
                    self.trigger_sniff_on_failure().await;

                    debug!(
                        attempt,
                        max_retries = self.transport_config.max_retries,
                        host = %node_config.host,
                        "retrying after connection timeout"
                    );

                    if is_last_attempt {
                        return Err(finalize(err, errors));
                    }
                    errors.push(err);
                }
                Err(err) if err.is_connection_error() => {
                    self.pool.mark_dead(&node_config);
                    self.trigger_sniff_on_failure().await;

                    debug!(
                        attempt,
                        max_retries = self.transport_config.max_retries,
                        host = %node_config.host,
                        "retrying after connection error"
                    );

                    if is_last_attempt {
                        return Err(finalize(err, errors));
                    }
                    errors.push(err);
                }
                Err(other) => {
                    return Err(finalize(other, errors));
                }
            }
        }

        unreachable!("the loop above always returns on its final iteration")
    }

    /// Close the transport: further `perform_request` calls return [`TransportError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for (_, node) in self.pool.all() {
            node.close().await;
        }
    }
}
