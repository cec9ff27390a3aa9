//! heartbeat: poll one website and warn when it drifts.
//!
//! # Usage
//!
//! ```text
//! heartbeat http://localhost/test2.php 1 1 1 verbose
//! ```

mod cli;
mod driver;

use clap::Parser;
use tracing::info;

use crate::cli::Cli;
use crate::driver::PollDriver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose());

    info!(
        "== heartbeat {} == Ctrl-C to quit!",
        env!("CARGO_PKG_VERSION")
    );

    let config = cli.into_config()?;
    info!(
        "polling '{}' every {} minutes with a {} second timeout +/- {} percent variance",
        config.url,
        config.poll_minutes(),
        config.timeout.as_secs(),
        config.variance_percent
    );

    let mut driver = PollDriver::new(config)?;

    tokio::select! {
        result = driver.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,heartbeat=debug,heartbeat_probe=debug,heartbeat_variance=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}
