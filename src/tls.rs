//! TLS configuration for every outbound connection.
//!
//! Builds a [`rustls::ClientConfig`] trusting the Mozilla root set from
//! `webpki-roots`, optionally extended with a PEM bundle (`CA_CERT_PATH`)
//! for bridges behind a private CA. The same config backs the reqwest
//! clients and the SDK WebSocket connector.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tracing::debug;

use crate::Result;
use crate::config::TlsConfig;

/// Builds a [`ClientConfig`] with the webpki roots plus any extra CA
/// certificates from `tls.ca_cert_path`.
///
/// # Errors
///
/// Returns [`LiveDataError::Config`](crate::LiveDataError::Config) if the
/// CA bundle cannot be read or contains no parsable certificate.
pub fn build_tls_config(tls: &TlsConfig) -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &tls.ca_cert_path {
        let pem = std::fs::read(path).map_err(|e| {
            crate::LiveDataError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::LiveDataError::Config(format!("failed to parse CA PEM: {e}")))?;

        let (added, _ignored) = root_store.add_parsable_certificates(certs);
        if added == 0 {
            return Err(crate::LiveDataError::Config(format!(
                "no usable certificate in {}",
                path.display()
            )));
        }
        debug!(added, path = %path.display(), "Added extra CA certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| crate::LiveDataError::Config(format!("unsupported TLS setup: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

/// Builds the shared HTTP client with the pinned TLS config and a
/// per-request timeout.
///
/// # Errors
///
/// Returns [`LiveDataError::Config`](crate::LiveDataError::Config) if the
/// TLS config or the client cannot be built.
pub fn build_http_client(tls: &TlsConfig, timeout: Duration) -> Result<reqwest::Client> {
    let tls_config = build_tls_config(tls)?;
    reqwest::Client::builder()
        .use_preconfigured_tls(tls_config)
        .timeout(timeout)
        .build()
        .map_err(|e| crate::LiveDataError::Config(format!("failed to build HTTP client: {e}")))
}
