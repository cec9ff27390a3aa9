//! Client TLS configuration for `https` targets.

use std::sync::Arc;

use tokio_rustls::TlsConnector;

/// Configuration for TLS connections.
#[derive(Clone)]
pub struct TlsConfig {
    /// Pre-built `rustls` client configuration.
    pub client_config: Arc<rustls::ClientConfig>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("alpn", &self.client_config.alpn_protocols.len())
            .finish()
    }
}

impl TlsConfig {
    /// Create a TLS config trusting the Mozilla root certificate store.
    ///
    /// Only HTTP/1.1 is offered through ALPN.
    pub fn with_webpki_roots() -> Result<Self, rustls::Error> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    pub(crate) fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config.clone())
    }
}

/// Build a `TlsConfig` from a pre-configured `rustls::ClientConfig`.
impl From<Arc<rustls::ClientConfig>> for TlsConfig {
    fn from(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self { client_config }
    }
}
