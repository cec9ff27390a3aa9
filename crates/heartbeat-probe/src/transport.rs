//! Connection establishment and idle connection reuse.
//!
//! At most one idle HTTP/1.1 connection is kept per (scheme, host, port).
//! A connection goes back to the pool once its response body has been read
//! to the end, and is handed out again while it is open and younger than the
//! idle timeout. Expired entries for every origin are swept whenever a
//! connection is requested or released.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Empty;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tracing::debug;
use url::{Host, Url};

use crate::error::FetchError;
use crate::tls::TlsConfig;
use crate::trace::{ConnInfo, TraceObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scheme {
    Http,
    Https,
}

/// Identity of a reusable connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PoolKey {
    scheme: Scheme,
    /// Domain name or IP literal, without IPv6 brackets.
    host: String,
    port: u16,
}

impl PoolKey {
    pub(crate) fn for_url(url: &Url) -> Result<Self, FetchError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(FetchError::MissingHost(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::UnsupportedScheme(url.scheme().to_string()))?;

        Ok(Self { scheme, host, port })
    }
}

/// A connection checked out for one request.
pub(crate) struct Connection {
    key: PoolKey,
    addr: SocketAddr,
    pub(crate) sender: SendRequest<Empty<Bytes>>,
}

struct IdleConn {
    sender: SendRequest<Empty<Bytes>>,
    addr: SocketAddr,
    idle_since: Instant,
}

/// A TCP connect that has started but not yet finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingDial {
    pub(crate) host: String,
    pub(crate) addr: SocketAddr,
}

pub(crate) struct Transport {
    tls: TlsConfig,
    idle: HashMap<PoolKey, IdleConn>,
    idle_timeout: Duration,
    dialing: Option<PendingDial>,
}

impl Transport {
    pub(crate) fn new(tls: TlsConfig, idle_timeout: Duration) -> Self {
        Self {
            tls,
            idle: HashMap::new(),
            idle_timeout,
            dialing: None,
        }
    }

    pub(crate) fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Get a connection for `url`, reusing an idle one when possible.
    pub(crate) async fn connect(
        &mut self,
        url: &Url,
        observer: &mut dyn TraceObserver,
    ) -> Result<Connection, FetchError> {
        let key = PoolKey::for_url(url)?;
        self.evict_expired();

        if let Some(conn) = self.take_idle(&key, observer).await {
            return Ok(conn);
        }

        let addrs = resolve(&key, observer).await?;
        let (stream, addr) = self.dial(&key, &addrs, observer).await?;

        let sender = match key.scheme {
            Scheme::Http => handshake(TokioIo::new(stream)).await?,
            Scheme::Https => {
                let server_name = ServerName::try_from(key.host.as_str())
                    .map_err(|_| FetchError::ServerName(key.host.clone()))?
                    .to_owned();

                observer.tls_handshake_start(&key.host);
                let result = self.tls.connector().connect(server_name, stream).await;
                observer.tls_handshake_done(result.as_ref().map(|_| ()));

                let stream = result.map_err(|source| FetchError::Tls {
                    host: key.host.clone(),
                    source,
                })?;
                handshake(TokioIo::new(stream)).await?
            }
        };

        observer.got_conn(&ConnInfo {
            addr,
            reused: false,
            was_idle: false,
            idle_time: Duration::ZERO,
        });

        Ok(Connection { key, addr, sender })
    }

    /// Return a connection whose response has been fully read.
    pub(crate) fn release(&mut self, conn: Connection) {
        if conn.sender.is_closed() {
            debug!(host = %conn.key.host, "connection closed by peer, not pooled");
            return;
        }
        self.evict_expired();
        self.idle.insert(
            conn.key,
            IdleConn {
                sender: conn.sender,
                addr: conn.addr,
                idle_since: Instant::now(),
            },
        );
    }

    /// The connect that was in flight when the caller gave up on it, if any.
    pub(crate) fn take_pending_dial(&mut self) -> Option<PendingDial> {
        self.dialing.take()
    }

    /// Drop idle connections that expired or were closed by the peer.
    fn evict_expired(&mut self) {
        let idle_timeout = self.idle_timeout;
        self.idle.retain(|key, conn| {
            let idle_time = conn.idle_since.elapsed();
            let keep = idle_time < idle_timeout && !conn.sender.is_closed();
            if !keep {
                debug!(host = %key.host, idle_ms = idle_time.as_millis() as u64, "dropped stale idle connection");
            }
            keep
        });
    }

    async fn take_idle(
        &mut self,
        key: &PoolKey,
        observer: &mut dyn TraceObserver,
    ) -> Option<Connection> {
        let mut idle = self.idle.remove(key)?;
        let idle_time = idle.idle_since.elapsed();

        if let Err(e) = idle.sender.ready().await {
            debug!(host = %key.host, error = %e, "idle connection unusable");
            return None;
        }

        observer.got_conn(&ConnInfo {
            addr: idle.addr,
            reused: true,
            was_idle: true,
            idle_time,
        });

        Some(Connection {
            key: key.clone(),
            addr: idle.addr,
            sender: idle.sender,
        })
    }

    /// Try each resolved address in order until one accepts.
    ///
    /// The address being dialed is remembered until its connect resolves,
    /// so a fetch cut off by its deadline mid-connect can still be reported
    /// as a connect failure.
    async fn dial(
        &mut self,
        key: &PoolKey,
        addrs: &[SocketAddr],
        observer: &mut dyn TraceObserver,
    ) -> Result<(TcpStream, SocketAddr), FetchError> {
        let mut last_err = None;

        for &addr in addrs {
            observer.connect_start(addr);
            self.dialing = Some(PendingDial {
                host: key.host.clone(),
                addr,
            });
            let result = TcpStream::connect(addr).await;
            self.dialing = None;

            match result {
                Ok(stream) => {
                    observer.connect_done(addr, Ok(()));
                    let _ = stream.set_nodelay(true);
                    return Ok((stream, addr));
                }
                Err(e) => {
                    observer.connect_done(addr, Err(&e));
                    last_err = Some((addr, e));
                }
            }
        }

        match last_err {
            Some((addr, source)) => Err(FetchError::Connect {
                host: key.host.clone(),
                addr,
                source,
            }),
            None => Err(FetchError::NoAddresses(key.host.clone())),
        }
    }
}

async fn resolve(
    key: &PoolKey,
    observer: &mut dyn TraceObserver,
) -> Result<Vec<SocketAddr>, FetchError> {
    // IP literals skip the lookup and its hooks.
    if let Ok(ip) = key.host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, key.port)]);
    }

    observer.dns_start(&key.host);
    let result = tokio::net::lookup_host((key.host.as_str(), key.port))
        .await
        .map(|addrs| addrs.collect::<Vec<_>>());
    observer.dns_done(&key.host, result.as_deref());

    let addrs = result.map_err(|source| FetchError::Resolve {
        host: key.host.clone(),
        source,
    })?;
    if addrs.is_empty() {
        return Err(FetchError::NoAddresses(key.host.clone()));
    }
    Ok(addrs)
}

async fn handshake<T>(io: T) -> Result<SendRequest<Empty<Bytes>>, FetchError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    Ok(sender)
}
