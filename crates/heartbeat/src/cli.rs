//! Positional command-line arguments.
//!
//! Every position is optional and has its own default. Giving argument *k*
//! means giving every argument before it.

use std::time::Duration;

use clap::Parser;
use heartbeat_core::config::{
    DEFAULT_POLL_MINUTES, DEFAULT_TIMEOUT_SECS, DEFAULT_URL, DEFAULT_VARIANCE_PERCENT,
};
use heartbeat_core::{ConfigError, PollConfig, parse_target};
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "heartbeat",
    about = "Poll a website and warn when its response time or size drifts",
    version,
    override_usage = "heartbeat [URL] [POLL] [TIMEOUT] [VARIANCE] [verbose]"
)]
pub struct Cli {
    /// Website to heartbeat [default: http://localhost]
    #[arg(value_parser = parse_target)]
    pub url: Option<Url>,

    /// Polling time in minutes [default: 5]
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub poll: Option<u64>,

    /// Timeout period in seconds [default: 10]
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Time or response size variance in percent, 0 to 100 [default: 5]
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub variance: Option<u8>,

    /// The literal word `verbose` turns on per-phase diagnostics
    #[arg(value_parser = ["verbose"])]
    pub verbose: Option<String>,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose.is_some()
    }

    /// Fill missing positions with their defaults, reporting each one used.
    pub fn into_config(self) -> Result<PollConfig, ConfigError> {
        let verbose = self.verbose();

        let url = match self.url {
            Some(url) => url,
            None => {
                info!("defaulting URL to {DEFAULT_URL}");
                PollConfig::default().url
            }
        };
        let poll = self.poll.unwrap_or_else(|| {
            info!("defaulting polling period to {DEFAULT_POLL_MINUTES} minutes");
            DEFAULT_POLL_MINUTES
        });
        let timeout = self.timeout.unwrap_or_else(|| {
            info!("defaulting timeout period to {DEFAULT_TIMEOUT_SECS} seconds");
            DEFAULT_TIMEOUT_SECS
        });
        let variance = self.variance.unwrap_or_else(|| {
            info!("defaulting variance to {DEFAULT_VARIANCE_PERCENT} percent");
            DEFAULT_VARIANCE_PERCENT
        });

        PollConfig::new(
            url,
            Duration::from_secs(poll.saturating_mul(60)),
            Duration::from_secs(timeout),
            variance,
            verbose,
        )
    }
}
