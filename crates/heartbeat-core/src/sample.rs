//! Measurements taken by one fetch cycle.

use std::time::Duration;

use url::Url;

/// Result of one successful fetch, redirects included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// URL of the final response after following redirects.
    pub url: Url,
    /// Status code of the final response.
    pub status: u16,
    /// Protocol of the final response, e.g. `HTTP/1.1`.
    pub version: String,
    /// Wall-clock time from request issuance until the final body was read.
    pub elapsed: Duration,
    /// Duration of the first DNS lookup, zero if none happened.
    pub first_dns: Duration,
    /// Sum of every DNS lookup, redirect-triggered lookups included.
    pub total_dns: Duration,
    /// Sum of every TCP connection establishment.
    pub total_connect: Duration,
    /// Sum of every TLS handshake.
    pub total_tls: Duration,
    /// Connections dialed for this fetch.
    pub new_connections: u32,
    /// Idle connections reused for this fetch.
    pub reused_connections: u32,
    /// Redirects followed before the final response.
    pub redirects: u32,
    /// Bytes in the final response body.
    pub body_bytes: u64,
}

impl Sample {
    /// Whether the final response is a 3xx.
    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status)
    }

    /// Total elapsed time, in milliseconds.
    pub fn round_trip_ms(&self) -> u64 {
        millis(self.elapsed)
    }

    /// Elapsed time minus the first DNS lookup, in milliseconds.
    ///
    /// The first lookup is usually far slower than later cached ones, so it
    /// is excluded from variance checks. Lookups caused by redirects stay in.
    pub fn response_time_ms(&self) -> u64 {
        millis(self.elapsed.saturating_sub(self.first_dns))
    }

    /// Body size to compare against the byte baseline, `None` for redirects.
    pub fn body_bytes_for_variance(&self) -> Option<u64> {
        (!self.is_redirect()).then_some(self.body_bytes)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
