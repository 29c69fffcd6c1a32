//! `HyperNode`: the shipped reference [`Node`] implementation, built on `hyper` + `hyper-util` +
//! `hyper-rustls`, grounded on a production HTTP client's connection-pooling, TLS, and
//! compression plumbing (§6.2 is the contract; this module is one way to satisfy it).

use std::io::Write;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::node::{Node, NodeRequest};
use crate::response::{parse_mimetype, ApiResponseMeta};
use crate::tls;

type LegacyClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

#[derive(Debug)]
pub struct HyperNode {
    config: NodeConfig,
    base_url: String,
    client: LegacyClient,
}

impl HyperNode {
    /// # Errors
    /// Returns [`TransportError::TlsError`] if no usable TLS root store could be built.
    pub fn new(config: NodeConfig) -> Result<Self, TransportError> {
        let tls_config = tls::native_roots_client_config()
            .map_err(|e| TransportError::TlsError(e.into()))?;

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.connections_per_node)
            .build(connector);

        let base_url = config.base_url();
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    fn effective_timeout(&self, requested: Option<Option<Duration>>) -> Option<Duration> {
        match requested {
            Some(inner) => inner,
            None => self.config.request_timeout,
        }
    }

    fn build_uri(&self, target: &str) -> Result<Uri, TransportError> {
        format!("{}{target}", self.base_url)
            .parse::<Uri>()
            .map_err(|e| TransportError::Validation(format!("invalid request target: {e}")))
    }

    fn merged_headers(&self, caller_headers: &HeaderMap) -> HeaderMap {
        let mut merged = self.config.headers.0.clone();
        for (name, value) in caller_headers {
            merged.insert(name.clone(), value.clone());
        }
        if let Some(opaque_id) = &self.config.opaque_id {
            if let Ok(value) = HeaderValue::from_str(opaque_id) {
                merged.insert(HeaderName::from_static("x-opaque-id"), value);
            }
        }
        merged
    }

    fn maybe_compress(&self, body: Option<Bytes>) -> Result<(Option<Bytes>, bool), TransportError> {
        let Some(body) = body else {
            return Ok((None, false));
        };
        if body.is_empty() || !self.config.http_compress {
            return Ok((Some(body), false));
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&body)
            .and_then(|()| encoder.finish())
            .map(|compressed| (Some(Bytes::from(compressed)), true))
            .map_err(|e| TransportError::Serialization(Box::new(e)))
    }
}

/// Classify a `hyper_util` legacy-client connector error into the transport's taxonomy by
/// walking its source chain for a TLS-specific cause.
fn classify_connector_error(err: &(dyn std::error::Error + 'static)) -> TransportError {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = cause {
        if current.downcast_ref::<rustls::Error>().is_some() {
            return TransportError::TlsError(Box::new(StringError(current.to_string())));
        }
        cause = current.source();
    }
    TransportError::ConnectionError(Box::new(StringError(err.to_string())))
}

#[derive(Debug)]
struct StringError(String);

impl std::fmt::Display for StringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for StringError {}

#[async_trait]
impl Node for HyperNode {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn perform_request(
        &self,
        req: NodeRequest<'_>,
    ) -> Result<(ApiResponseMeta, Bytes), TransportError> {
        let is_head = req.method == http::Method::HEAD;
        let uri = self.build_uri(req.target)?;
        let mut headers = self.merged_headers(req.headers);

        let (body, compressed) = self.maybe_compress(req.body)?;
        if compressed {
            headers.insert(http::header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        let body_bytes = body.unwrap_or_default();

        let mut builder = Request::builder().method(req.method.clone()).uri(uri);
        if let Some(builder_headers) = builder.headers_mut() {
            *builder_headers = headers;
        }
        let request = builder
            .body(Full::new(body_bytes))
            .map_err(|e| TransportError::Validation(format!("failed to build request: {e}")))?;

        let timeout = self.effective_timeout(req.request_timeout);
        let start = Instant::now();

        let response_result = match timeout {
            Some(duration) => match tokio::time::timeout(duration, self.client.request(request)).await {
                Ok(result) => result,
                Err(_) => return Err(TransportError::ConnectionTimeout(duration)),
            },
            None => self.client.request(request).await,
        };

        let response = response_result.map_err(|e| classify_connector_error(&e))?;

        let status = response.status().as_u16();
        let http_version = format!("{:?}", response.version());
        let headers = response.headers().clone();
        let mimetype = parse_mimetype(&headers);

        let raw_body = if is_head {
            // Drain without retaining: HEAD has no body on the wire, but draining the (empty)
            // stream keeps the connection poolable.
            let _ = response.into_body().collect().await;
            Bytes::new()
        } else {
            response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::ConnectionError(Box::new(e)))?
                .to_bytes()
        };

        let meta = ApiResponseMeta {
            node: self.config.clone(),
            duration: start.elapsed(),
            http_version,
            status,
            headers,
            mimetype,
        };

        Ok((meta, raw_body))
    }

    async fn close(&self) {
        // The legacy hyper client has no explicit shutdown; idle connections are reclaimed by
        // pool_idle_timeout on their own. Nothing to do here beyond documenting the contract.
    }
}
