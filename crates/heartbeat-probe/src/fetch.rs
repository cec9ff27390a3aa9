//! The fetcher: one logical GET per call, redirects followed.

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use heartbeat_core::Sample;
use http::header::{HOST, LOCATION, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode, Version};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use tracing::debug;
use url::{Position, Url};

use crate::error::FetchError;
use crate::tls::TlsConfig;
use crate::trace::{PhaseTrace, TraceObserver};
use crate::transport::Transport;

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: u32 = 10;

/// Idle connections older than this are not reused.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Final response of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub url: Url,
    pub status: StatusCode,
    pub version: Version,
    pub elapsed: Duration,
    pub redirects: u32,
    pub body_bytes: u64,
}

/// One response in a redirect chain.
struct Hop {
    status: StatusCode,
    version: Version,
    location: Option<HeaderValue>,
    body_bytes: u64,
}

/// Performs traced GET requests against a target, keeping idle connections
/// between calls.
pub struct Fetcher {
    transport: Transport,
    timeout: Duration,
    user_agent: HeaderValue,
}

impl Fetcher {
    /// Create a fetcher trusting the Mozilla root store.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::with_tls(timeout, TlsConfig::with_webpki_roots()?))
    }

    /// Create a fetcher with a custom TLS configuration.
    pub fn with_tls(timeout: Duration, tls: TlsConfig) -> Self {
        Self {
            transport: Transport::new(tls, IDLE_TIMEOUT),
            timeout,
            user_agent: HeaderValue::from_static(concat!("heartbeat/", env!("CARGO_PKG_VERSION"))),
        }
    }

    /// Override how long an idle connection stays reusable.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.transport.set_idle_timeout(idle_timeout);
        self
    }

    /// Fetch `url` and measure it.
    pub async fn fetch(&mut self, url: &Url) -> Result<Sample, FetchError> {
        let mut trace = PhaseTrace::new();
        let response = self.fetch_traced(url, &mut trace).await?;

        Ok(Sample {
            url: response.url,
            status: response.status.as_u16(),
            version: format!("{:?}", response.version),
            elapsed: response.elapsed,
            first_dns: trace.first_dns(),
            total_dns: trace.total_dns(),
            total_connect: trace.total_connect(),
            total_tls: trace.total_tls(),
            new_connections: trace.new_connections(),
            reused_connections: trace.reused_connections(),
            redirects: response.redirects,
            body_bytes: response.body_bytes,
        })
    }

    /// Fetch `url`, reporting lifecycle events to `observer`.
    ///
    /// The timeout covers the whole fetch: lookups, connects, every
    /// redirect hop and the final body. A deadline that expires while a TCP
    /// connect is still pending is a connect failure, not a timeout.
    pub async fn fetch_traced(
        &mut self,
        url: &Url,
        observer: &mut dyn TraceObserver,
    ) -> Result<FetchedResponse, FetchError> {
        let timeout = self.timeout;
        let start = Instant::now();
        debug!(%url, "starting HTTP GET");
        // Left over only if an earlier fetch was dropped mid-connect.
        self.transport.take_pending_dial();

        match tokio::time::timeout(timeout, self.follow(url, observer, start)).await {
            Ok(result) => result,
            Err(_) => match self.transport.take_pending_dial() {
                Some(dial) => {
                    let source = io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect did not complete within {timeout:?}"),
                    );
                    observer.connect_done(dial.addr, Err(&source));
                    Err(FetchError::Connect {
                        host: dial.host,
                        addr: dial.addr,
                        source,
                    })
                }
                None => Err(FetchError::Timeout(timeout)),
            },
        }
    }

    async fn follow(
        &mut self,
        url: &Url,
        observer: &mut dyn TraceObserver,
        start: Instant,
    ) -> Result<FetchedResponse, FetchError> {
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            let hop = self.round_trip(&current, observer).await?;

            let Some(next) = redirect_target(&current, hop.status, hop.location.as_ref())? else {
                return Ok(FetchedResponse {
                    url: current,
                    status: hop.status,
                    version: hop.version,
                    elapsed: start.elapsed(),
                    redirects,
                    body_bytes: hop.body_bytes,
                });
            };

            if redirects == MAX_REDIRECTS {
                return Err(FetchError::TooManyRedirects(MAX_REDIRECTS));
            }
            redirects += 1;
            observer.redirect(hop.status.as_u16(), &next);
            current = next;
        }
    }

    async fn round_trip(
        &mut self,
        url: &Url,
        observer: &mut dyn TraceObserver,
    ) -> Result<Hop, FetchError> {
        let mut conn = self.transport.connect(url, observer).await?;

        let req = Request::builder()
            .method(Method::GET)
            .uri(&url[Position::BeforePath..Position::AfterQuery])
            .header(HOST, &url[Position::BeforeHost..Position::AfterPort])
            .header(USER_AGENT, self.user_agent.clone())
            .body(Empty::<Bytes>::new())?;

        let resp = conn.sender.send_request(req).await?;
        let (parts, body) = resp.into_parts();
        let body_bytes = count_body(body).await?;

        self.transport.release(conn);

        Ok(Hop {
            status: parts.status,
            version: parts.version,
            location: parts.headers.get(LOCATION).cloned(),
            body_bytes,
        })
    }
}

/// Read a body to the end, keeping only its length.
async fn count_body(mut body: Incoming) -> Result<u64, FetchError> {
    let mut bytes = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(FetchError::Body)?;
        if let Some(data) = frame.data_ref() {
            bytes += data.len() as u64;
        }
    }
    Ok(bytes)
}

/// Where to go next, or `None` when `status` ends the chain.
///
/// Only 301, 302, 303, 307 and 308 with a `Location` header are followed.
/// Other 3xx responses are final.
fn redirect_target(
    current: &Url,
    status: StatusCode,
    location: Option<&HeaderValue>,
) -> Result<Option<Url>, FetchError> {
    let follows = matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308);
    let Some(location) = location.filter(|_| follows) else {
        return Ok(None);
    };

    let raw = location.to_str().map_err(|e| FetchError::InvalidRedirect {
        location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
        reason: e.to_string(),
    })?;
    let next = current.join(raw).map_err(|e| FetchError::InvalidRedirect {
        location: raw.to_string(),
        reason: e.to_string(),
    })?;

    match next.scheme() {
        "http" | "https" => Ok(Some(next)),
        other => Err(FetchError::InvalidRedirect {
            location: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn location(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn follows_redirect_statuses_with_location() {
        let current = url("http://localhost/a/b");
        for code in [301, 302, 303, 307, 308] {
            let status = StatusCode::from_u16(code).unwrap();
            let next = redirect_target(&current, status, Some(&location("/c"))).unwrap();
            assert_eq!(next, Some(url("http://localhost/c")), "status {code}");
        }
    }

    #[test]
    fn other_3xx_are_final() {
        let current = url("http://localhost/");
        for code in [300, 304, 305] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(redirect_target(&current, status, Some(&location("/x"))).unwrap(), None);
        }
    }

    #[test]
    fn redirect_without_location_is_final() {
        let current = url("http://localhost/");
        assert_eq!(redirect_target(&current, StatusCode::FOUND, None).unwrap(), None);
    }

    #[test]
    fn non_redirect_statuses_are_final() {
        let current = url("http://localhost/");
        assert_eq!(
            redirect_target(&current, StatusCode::OK, Some(&location("/x"))).unwrap(),
            None
        );
    }

    #[test]
    fn relative_locations_resolve_against_current_url() {
        let current = url("https://x.test/dir/page?q=1");
        let next = redirect_target(&current, StatusCode::FOUND, Some(&location("other")))
            .unwrap()
            .unwrap();
        assert_eq!(next.as_str(), "https://x.test/dir/other");

        let next = redirect_target(&current, StatusCode::FOUND, Some(&location("//y.test/z")))
            .unwrap()
            .unwrap();
        assert_eq!(next.as_str(), "https://y.test/z");
    }

    #[test]
    fn absolute_locations_switch_origin() {
        let current = url("http://x.test/");
        let next = redirect_target(
            &current,
            StatusCode::MOVED_PERMANENTLY,
            Some(&location("https://x.test/secure")),
        )
        .unwrap()
        .unwrap();
        assert_eq!(next.as_str(), "https://x.test/secure");
    }

    #[test]
    fn non_http_redirects_are_rejected() {
        let current = url("http://x.test/");
        let err = redirect_target(&current, StatusCode::FOUND, Some(&location("ftp://x.test/f")))
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRedirect { .. }));
    }

    #[test]
    fn request_target_is_origin_form() {
        let u = url("http://x.test:8080/path/to?a=b#frag");
        assert_eq!(&u[Position::BeforePath..Position::AfterQuery], "/path/to?a=b");
        assert_eq!(&u[Position::BeforeHost..Position::AfterPort], "x.test:8080");

        let u = url("https://x.test");
        assert_eq!(&u[Position::BeforePath..Position::AfterQuery], "/");
        assert_eq!(&u[Position::BeforeHost..Position::AfterPort], "x.test");
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_connecting() {
        let mut fetcher = Fetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch(&url("ftp://localhost/")).await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
        assert!(!err.is_fatal());
    }
}
