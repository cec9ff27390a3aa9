//! Fetch error types.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors that end a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request did not complete within {0:?}")]
    Timeout(Duration),

    #[error("DNS lookup failed for '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses found for '{0}'")]
    NoAddresses(String),

    #[error("unable to connect to host '{host}' at {addr}: {source}")]
    Connect {
        host: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with '{host}' failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS server name '{0}'")]
    ServerName(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(u32),

    #[error("invalid redirect location '{location}': {reason}")]
    InvalidRedirect { location: String, reason: String },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("URL '{0}' has no host")]
    MissingHost(String),
}

impl FetchError {
    /// Whether the error should stop the heartbeat altogether.
    ///
    /// Only a refused or unreachable TCP connect is fatal: the target is
    /// assumed unreachable for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Connect { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_failures_are_fatal() {
        let connect = FetchError::Connect {
            host: "localhost".to_string(),
            addr: "127.0.0.1:80".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(connect.is_fatal());
        assert!(!connect.is_timeout());

        let timeout = FetchError::Timeout(Duration::from_secs(10));
        assert!(!timeout.is_fatal());
        assert!(timeout.is_timeout());

        assert!(!FetchError::TooManyRedirects(10).is_fatal());
        assert!(!FetchError::NoAddresses("x.test".to_string()).is_fatal());
        assert!(
            !FetchError::Resolve {
                host: "x.test".to_string(),
                source: io::Error::other("no such host"),
            }
            .is_fatal()
        );
    }

    #[test]
    fn connect_error_names_host_and_address() {
        let err = FetchError::Connect {
            host: "localhost".to_string(),
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let msg = err.to_string();
        assert!(msg.contains("'localhost'"));
        assert!(msg.contains("127.0.0.1:8080"));
    }
}
