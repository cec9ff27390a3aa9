//! heartbeat-probe: one traced HTTP GET per fetch cycle.
//!
//! # Architecture
//!
//! ```text
//! Fetcher::fetch(url) → Sample
//!   ├── PhaseTrace (TraceObserver) ← DNS / connect / TLS / conn events
//!   ├── redirect loop (301, 302, 303, 307, 308; at most 10 hops)
//!   │   └── Transport
//!   │       ├── idle pool hit → GotConn(reused)
//!   │       └── lookup_host → TcpStream::connect → [rustls] → hyper http1
//!   └── body drained frame by frame, only the byte count is kept
//! ```
//!
//! The whole fetch runs under a single `tokio::time::timeout`. Trace hooks
//! are called inline by the fetching task, so every event has been observed
//! by the time the `Sample` is assembled.
//!
//! A failed TCP connect is the only fatal error ([`FetchError::is_fatal`]).

pub mod error;
pub mod fetch;
pub mod tls;
pub mod trace;
mod transport;

pub use error::FetchError;
pub use fetch::{FetchedResponse, Fetcher, IDLE_TIMEOUT, MAX_REDIRECTS};
pub use tls::TlsConfig;
pub use trace::{ConnInfo, PhaseTrace, TraceObserver};
