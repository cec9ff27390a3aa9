//! heartbeat-core: types shared by the heartbeat poller crates.
//!
//! - [`PollConfig`] holds the parameters fixed at startup (target URL,
//!   poll interval, timeout, variance tolerance, verbosity).
//! - [`Sample`] is the measurement produced by one successful fetch and
//!   consumed by the variance monitor.

pub mod config;
pub mod sample;

pub use config::{ConfigError, PollConfig, parse_target};
pub use sample::Sample;
