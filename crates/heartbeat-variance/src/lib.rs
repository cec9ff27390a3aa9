//! heartbeat-variance: deviation detection against a rolling baseline.
//!
//! # Architecture
//!
//! ```text
//! VarianceMonitor
//!   ├── MetricBaseline (response time, ms)
//!   │   └── ToleranceBand [value × (1 − v%), value × (1 + v%)]
//!   └── MetricBaseline (body size, bytes), skipped for 3xx responses
//! ```
//!
//! Each metric starts unset. The first sample becomes its baseline. A later
//! sample outside the band yields a [`Deviation`] and becomes the new
//! baseline, so the following sample is judged against the fresh band.

pub mod band;
pub mod monitor;

pub use band::ToleranceBand;
pub use monitor::{Baseline, BaselineSnapshot, Deviation, Metric, MetricBaseline, VarianceMonitor};
