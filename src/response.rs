//! `ApiResponseMeta`: the value type returned alongside a decoded body, plus small header
//! parsing helpers shared by the transport and the node backend.

use std::time::Duration;

use http::HeaderMap;
use mime::Mime;

use crate::config::NodeConfig;

/// Metadata describing one completed HTTP exchange, independent of the (optionally decoded)
/// response body.
#[derive(Debug, Clone)]
pub struct ApiResponseMeta {
    pub node: NodeConfig,
    pub duration: Duration,
    pub http_version: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub mimetype: Option<Mime>,
}

impl ApiResponseMeta {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse the `Content-Type` header into a [`Mime`], if present and well-formed.
#[must_use]
pub fn parse_mimetype(headers: &HeaderMap) -> Option<Mime> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Mime>().ok())
}

/// Parse a `Retry-After` header as either a delay in seconds or an RFC 1123 HTTP-date.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = httpdate::parse_http_date(raw).ok()?;
    when.duration_since(std::time::SystemTime::now()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn parses_json_mimetype() {
        let headers = headers_with(&[("content-type", "application/json; charset=utf-8")]);
        let mime = parse_mimetype(&headers).unwrap();
        assert_eq!(mime.type_(), mime::APPLICATION);
        assert_eq!(mime.subtype(), mime::JSON);
    }

    #[test]
    fn missing_content_type_is_none() {
        let headers = HeaderMap::new();
        assert!(parse_mimetype(&headers).is_none());
    }

    #[test]
    fn retry_after_seconds() {
        let headers = headers_with(&[("retry-after", "5")]);
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_after_missing_is_none() {
        assert!(parse_retry_after(&HeaderMap::new()).is_none());
    }

    #[test]
    fn is_success_checks_2xx_range() {
        let node = NodeConfig::new(crate::config::Scheme::Http, "h", 1);
        let mut meta = ApiResponseMeta {
            node,
            duration: Duration::ZERO,
            http_version: "HTTP/1.1".to_owned(),
            status: 200,
            headers: HeaderMap::new(),
            mimetype: None,
        };
        assert!(meta.is_success());
        meta.status = 404;
        assert!(!meta.is_success());
    }
}
