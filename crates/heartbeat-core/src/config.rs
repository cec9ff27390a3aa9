//! Poll configuration.
//!
//! All parameters are supplied once at startup and stay fixed for the
//! lifetime of the process.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Target polled when no URL is given.
pub const DEFAULT_URL: &str = "http://localhost";
/// Default polling period, in minutes.
pub const DEFAULT_POLL_MINUTES: u64 = 5;
/// Default request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default tolerated variance, in percent.
pub const DEFAULT_VARIANCE_PERCENT: u8 = 5;
/// Largest accepted variance, in percent.
pub const MAX_VARIANCE_PERCENT: u8 = 100;

/// Errors raised while building a [`PollConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("variance must be between 0 and {MAX_VARIANCE_PERCENT} percent, got {0}")]
    VarianceOutOfRange(u8),
}

/// Parameters of a heartbeat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Website to heartbeat.
    pub url: Url,
    /// Delay between the end of one fetch cycle and the start of the next.
    pub poll_interval: Duration,
    /// Upper bound for a whole fetch, redirects and body included.
    pub timeout: Duration,
    /// Tolerated deviation from the baseline, in percent.
    pub variance_percent: u8,
    /// Emit per-phase diagnostics.
    pub verbose: bool,
}

impl PollConfig {
    /// Build a validated configuration.
    pub fn new(
        url: Url,
        poll_interval: Duration,
        timeout: Duration,
        variance_percent: u8,
        verbose: bool,
    ) -> Result<Self, ConfigError> {
        check_scheme(&url)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Zero("polling period"));
        }
        if timeout.is_zero() {
            return Err(ConfigError::Zero("timeout period"));
        }
        if variance_percent > MAX_VARIANCE_PERCENT {
            return Err(ConfigError::VarianceOutOfRange(variance_percent));
        }

        Ok(Self {
            url,
            poll_interval,
            timeout,
            variance_percent,
            verbose,
        })
    }

    /// Polling period in whole minutes, as given on the command line.
    pub fn poll_minutes(&self) -> u64 {
        self.poll_interval.as_secs() / 60
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_URL).expect("default URL is valid"),
            poll_interval: Duration::from_secs(DEFAULT_POLL_MINUTES * 60),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            variance_percent: DEFAULT_VARIANCE_PERCENT,
            verbose: false,
        }
    }
}

/// Parse and validate a target URL. Only `http` and `https` are polled.
pub fn parse_target(input: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(input).map_err(|e| ConfigError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    check_scheme(&url)?;
    if url.host().is_none() {
        return Err(ConfigError::InvalidUrl {
            input: input.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
