//! Poll driver: one fetch and one variance check per tick.
//!
//! The loop has no stop condition of its own: it runs until the process is
//! terminated or a fatal fetch error (failed TCP connect) ends it.

use std::time::Duration;

use heartbeat_core::{PollConfig, Sample};
use heartbeat_probe::{FetchError, Fetcher};
use heartbeat_variance::{Deviation, VarianceMonitor};
use tracing::{debug, error, info, warn};

/// How one fetch cycle ended, short of a fatal error.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The fetch completed and was checked against the baselines.
    Completed {
        sample: Sample,
        deviations: Vec<Deviation>,
    },
    /// The fetch did not complete within the timeout. Baselines untouched.
    TimedOut(Duration),
    /// The fetch failed in a recoverable way. Baselines untouched.
    Failed(FetchError),
}

impl CycleOutcome {
    /// Emit the console lines for this outcome. Verbose runs also get the
    /// per-phase totals of every completed fetch.
    pub fn report(&self, verbose: bool) {
        match self {
            CycleOutcome::Completed { sample, deviations } => {
                debug!(
                    url = %sample.url,
                    redirects = sample.redirects,
                    reused = sample.reused_connections,
                    "{} {}",
                    sample.version,
                    sample.status
                );
                if verbose {
                    info!(
                        url = %sample.url,
                        round_trip_ms = sample.round_trip_ms(),
                        "{}",
                        phase_totals(sample)
                    );
                }
                for deviation in deviations {
                    warn!(
                        metric = %deviation.metric,
                        band = %deviation.band,
                        "WARNING WARNING {deviation}"
                    );
                }
            }
            CycleOutcome::TimedOut(timeout) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "WARNING WARNING probable timeout on request (use verbose option for more details)"
                );
            }
            CycleOutcome::Failed(e) => {
                warn!(error = %e, "WARNING WARNING request failed");
            }
        }
    }
}

/// One line summing up where the time of a fetch went.
fn phase_totals(sample: &Sample) -> String {
    format!(
        "dns {} ms (first lookup {} ms), connect {} ms, tls {} ms, {} new / {} reused connections",
        sample.total_dns.as_millis(),
        sample.first_dns.as_millis(),
        sample.total_connect.as_millis(),
        sample.total_tls.as_millis(),
        sample.new_connections,
        sample.reused_connections
    )
}

/// Owns the fetcher and the baselines for the lifetime of the process.
pub struct PollDriver {
    config: PollConfig,
    fetcher: Fetcher,
    monitor: VarianceMonitor,
}

impl PollDriver {
    pub fn new(config: PollConfig) -> anyhow::Result<Self> {
        let fetcher = Fetcher::new(config.timeout)?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: PollConfig, fetcher: Fetcher) -> Self {
        let monitor = VarianceMonitor::new(config.variance_percent);
        Self {
            config,
            fetcher,
            monitor,
        }
    }

    pub fn monitor(&self) -> &VarianceMonitor {
        &self.monitor
    }

    /// Poll forever. Returns only with a fatal error.
    ///
    /// Every non-fatal cycle, whatever its outcome, is followed by exactly
    /// one sleep of the poll interval.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let outcome = match self.run_cycle().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(url = %self.config.url, error = %e, "target unreachable, stopping heartbeat");
                    return Err(e.into());
                }
            };
            outcome.report(self.config.verbose);

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Fetch once and check the result against the baselines.
    ///
    /// `Err` is returned only for fatal errors.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, FetchError> {
        match self.fetcher.fetch(&self.config.url).await {
            Ok(sample) => {
                let deviations = self.monitor.observe(&sample);
                Ok(CycleOutcome::Completed { sample, deviations })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(FetchError::Timeout(timeout)) => {
                debug!(url = %self.config.url, ?timeout, "error on request: timed out");
                Ok(CycleOutcome::TimedOut(timeout))
            }
            Err(e) => Ok(CycleOutcome::Failed(e)),
        }
    }
}
