//! TLS utilities for the `HyperNode` backend: cached native root certificates and crypto
//! provider selection, grounded on the same reqwest-style pattern a production hyper client uses
//! to avoid repeated OS certificate-store lookups and unwanted global state mutation.

use std::sync::{Arc, OnceLock};

use rustls_pki_types::CertificateDer;

static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    let certs = result.certs;
    if certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = certs.len(), "loaded native root certificates");
    }
    certs
}

/// Cached native root certificates, loaded lazily on first call.
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// The crypto provider to use for TLS connections: respect an already-installed process default,
/// otherwise construct (without installing) an `aws-lc-rs` provider.
#[must_use]
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` from the cached native root certificates.
///
/// # Errors
/// Fails fast if no usable root certificates are available, so misconfiguration is caught at
/// node construction time rather than during the first TLS handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
            certs.len()
        ));
    }

    let provider = get_crypto_provider();
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_roots_are_cached_and_stable() {
        let first = native_root_certs();
        let second = native_root_certs();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn client_config_builds_or_fails_cleanly() {
        // CI containers without an OS cert store legitimately return Err; the important
        // property is that this never panics.
        let _ = native_roots_client_config();
    }
}
