//! Request lifecycle hooks and the per-phase timing collector.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

/// How a request obtained its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnInfo {
    /// Peer address of the connection.
    pub addr: SocketAddr,
    /// The connection was taken from the idle pool.
    pub reused: bool,
    /// The connection had been idle before this request.
    pub was_idle: bool,
    /// How long the connection sat idle, zero for fresh connections.
    pub idle_time: Duration,
}

/// Callbacks invoked by the transport as a fetch progresses.
///
/// Every hook has a no-op default; implementors override what they need.
/// A redirect chain may open several connections, so DNS and connect hooks
/// can fire more than once per fetch.
pub trait TraceObserver: Send {
    fn dns_start(&mut self, _host: &str) {}

    fn dns_done(&mut self, _host: &str, _result: Result<&[SocketAddr], &io::Error>) {}

    fn connect_start(&mut self, _addr: SocketAddr) {}

    fn connect_done(&mut self, _addr: SocketAddr, _result: Result<(), &io::Error>) {}

    fn tls_handshake_start(&mut self, _server_name: &str) {}

    fn tls_handshake_done(&mut self, _result: Result<(), &io::Error>) {}

    fn got_conn(&mut self, _info: &ConnInfo) {}

    fn redirect(&mut self, _status: u16, _location: &Url) {}
}

/// Collects phase timings for one fetch and logs each event at debug level.
#[derive(Debug, Default)]
pub struct PhaseTrace {
    dns_started: Option<Instant>,
    connect_started: Option<Instant>,
    tls_started: Option<Instant>,
    first_dns: Option<Duration>,
    total_dns: Duration,
    total_connect: Duration,
    total_tls: Duration,
    connections: Vec<ConnInfo>,
    redirects: u32,
}

impl PhaseTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration of the first DNS lookup, zero if none happened.
    pub fn first_dns(&self) -> Duration {
        self.first_dns.unwrap_or_default()
    }

    pub fn total_dns(&self) -> Duration {
        self.total_dns
    }

    pub fn total_connect(&self) -> Duration {
        self.total_connect
    }

    pub fn total_tls(&self) -> Duration {
        self.total_tls
    }

    /// Connections handed to requests, in order.
    pub fn connections(&self) -> &[ConnInfo] {
        &self.connections
    }

    pub fn new_connections(&self) -> u32 {
        self.connections.iter().filter(|c| !c.reused).count() as u32
    }

    pub fn reused_connections(&self) -> u32 {
        self.connections.iter().filter(|c| c.reused).count() as u32
    }

    pub fn redirects(&self) -> u32 {
        self.redirects
    }
}

impl TraceObserver for PhaseTrace {
    fn dns_start(&mut self, host: &str) {
        self.dns_started = Some(Instant::now());
        debug!(%host, "DNS lookup started");
    }

    fn dns_done(&mut self, host: &str, result: Result<&[SocketAddr], &io::Error>) {
        let elapsed = self
            .dns_started
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.total_dns += elapsed;
        if self.first_dns.is_none() {
            self.first_dns = Some(elapsed);
        }

        match result {
            Ok(addrs) => debug!(
                %host,
                addresses = addrs.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "DNS lookup done"
            ),
            Err(e) => debug!(%host, error = %e, "DNS lookup failed"),
        }
    }

    fn connect_start(&mut self, _addr: SocketAddr) {
        self.connect_started = Some(Instant::now());
    }

    fn connect_done(&mut self, addr: SocketAddr, result: Result<(), &io::Error>) {
        let elapsed = self
            .connect_started
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();

        match result {
            Ok(()) => {
                self.total_connect += elapsed;
                debug!(%addr, elapsed_ms = elapsed.as_millis() as u64, "connection established");
            }
            Err(e) => debug!(%addr, error = %e, "connection attempt failed"),
        }
    }

    fn tls_handshake_start(&mut self, server_name: &str) {
        self.tls_started = Some(Instant::now());
        debug!(%server_name, "TLS handshake started");
    }

    fn tls_handshake_done(&mut self, result: Result<(), &io::Error>) {
        let elapsed = self
            .tls_started
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.total_tls += elapsed;

        match result {
            Ok(()) => debug!(elapsed_ms = elapsed.as_millis() as u64, "TLS handshake done"),
            Err(e) => debug!(error = %e, "TLS handshake failed"),
        }
    }

    fn got_conn(&mut self, info: &ConnInfo) {
        debug!(
            addr = %info.addr,
            reused = info.reused,
            was_idle = info.was_idle,
            idle_ms = info.idle_time.as_millis() as u64,
            "connection acquired"
        );
        self.connections.push(*info);
    }

    fn redirect(&mut self, status: u16, location: &Url) {
        self.redirects += 1;
        debug!(status, %location, "following redirect");
    }
}
