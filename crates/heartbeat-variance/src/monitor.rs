//! Variance monitor: per-metric baselines and deviation detection.

use std::fmt;

use heartbeat_core::Sample;
use tracing::debug;

use crate::band::ToleranceBand;

/// A monitored quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Response time in milliseconds, first DNS lookup excluded.
    ResponseTime,
    /// Size of the final response body in bytes.
    BodyBytes,
}

impl Metric {
    /// Unit suffix used when printing values of this metric.
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::ResponseTime => "ms",
            Metric::BodyBytes => "bytes",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::ResponseTime => f.write_str("response time"),
            Metric::BodyBytes => f.write_str("body size"),
        }
    }
}

/// Accepted normal value of a metric and the band derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub value: u64,
    pub band: ToleranceBand,
}

/// A sample that fell outside its metric's tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deviation {
    pub metric: Metric,
    /// Baseline value the sample was compared against.
    pub previous: u64,
    /// The offending sample, now the new baseline.
    pub current: u64,
    /// Band the sample fell outside of.
    pub band: ToleranceBand,
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.metric.unit();
        write!(
            f,
            "previously {} {unit}, now {} {unit}",
            self.previous, self.current
        )
    }
}

/// Baseline state of a single metric.
///
/// Unset until the first observation. Afterwards each observation outside
/// the band replaces the baseline and reports a [`Deviation`].
#[derive(Debug, Clone)]
pub struct MetricBaseline {
    metric: Metric,
    variance_percent: u8,
    current: Option<Baseline>,
}

impl MetricBaseline {
    pub fn new(metric: Metric, variance_percent: u8) -> Self {
        Self {
            metric,
            variance_percent,
            current: None,
        }
    }

    /// Record an observation and return the deviation it caused, if any.
    pub fn observe(&mut self, value: u64) -> Option<Deviation> {
        let band = ToleranceBand::around(value, self.variance_percent);

        match self.current {
            None => {
                debug!(metric = %self.metric, value, %band, "baseline established");
                self.current = Some(Baseline { value, band });
                None
            }
            Some(baseline) if baseline.band.contains(value) => None,
            Some(baseline) => {
                self.current = Some(Baseline { value, band });
                Some(Deviation {
                    metric: self.metric,
                    previous: baseline.value,
                    current: value,
                    band: baseline.band,
                })
            }
        }
    }

    /// Current baseline, `None` before the first observation.
    pub fn baseline(&self) -> Option<Baseline> {
        self.current
    }
}

/// Point-in-time view of both baselines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineSnapshot {
    pub response_time: Option<Baseline>,
    pub body_bytes: Option<Baseline>,
}

/// Tracks response time and body size against independent baselines.
#[derive(Debug, Clone)]
pub struct VarianceMonitor {
    variance_percent: u8,
    response_time: MetricBaseline,
    body_bytes: MetricBaseline,
}

impl VarianceMonitor {
    pub fn new(variance_percent: u8) -> Self {
        Self {
            variance_percent,
            response_time: MetricBaseline::new(Metric::ResponseTime, variance_percent),
            body_bytes: MetricBaseline::new(Metric::BodyBytes, variance_percent),
        }
    }

    /// Check a fetch sample against both baselines.
    ///
    /// Body size is not checked when the final response was a redirect.
    pub fn observe(&mut self, sample: &Sample) -> Vec<Deviation> {
        let response_time = sample.response_time_ms();
        debug!(
            round_trip_ms = sample.round_trip_ms(),
            response_time_ms = response_time,
            variance = self.variance_percent,
            band = %ToleranceBand::around(response_time, self.variance_percent),
            "round trip measured (first DNS lookup ignored)"
        );

        let body_bytes = sample.body_bytes_for_variance();
        if body_bytes.is_none() {
            debug!(status = sample.status, "request was redirected, body size not checked");
        }

        self.observe_values(response_time, body_bytes)
    }

    /// Check raw metric values. `None` for `body_bytes` leaves the byte
    /// baseline untouched.
    pub fn observe_values(&mut self, response_time_ms: u64, body_bytes: Option<u64>) -> Vec<Deviation> {
        let mut deviations = Vec::new();
        deviations.extend(self.response_time.observe(response_time_ms));

        if let Some(bytes) = body_bytes {
            debug!(
                bytes,
                variance = self.variance_percent,
                band = %ToleranceBand::around(bytes, self.variance_percent),
                "response body measured"
            );
            deviations.extend(self.body_bytes.observe(bytes));
        }

        deviations
    }

    pub fn snapshot(&self) -> BaselineSnapshot {
        BaselineSnapshot {
            response_time: self.response_time.baseline(),
            body_bytes: self.body_bytes.baseline(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;

    fn sample(status: u16, response_ms: u64, bytes: u64) -> Sample {
        Sample {
            url: Url::parse("http://localhost/").unwrap(),
            status,
            version: "HTTP/1.1".to_string(),
            elapsed: Duration::from_millis(response_ms + 30),
            first_dns: Duration::from_millis(30),
            total_dns: Duration::from_millis(30),
            total_connect: Duration::from_millis(1),
            total_tls: Duration::ZERO,
            new_connections: 1,
            reused_connections: 0,
            redirects: 0,
            body_bytes: bytes,
        }
    }

    #[test]
    fn first_observation_sets_baseline_without_deviation() {
        let mut baseline = MetricBaseline::new(Metric::BodyBytes, 5);
        assert!(baseline.baseline().is_none());

        assert_eq!(baseline.observe(1000), None);
        assert_eq!(
            baseline.baseline(),
            Some(Baseline { value: 1000, band: ToleranceBand { low: 950, high: 1050 } })
        );
    }

    #[test]
    fn first_observation_of_zero_is_still_a_baseline() {
        let mut baseline = MetricBaseline::new(Metric::BodyBytes, 5);
        assert_eq!(baseline.observe(0), None);
        assert_eq!(baseline.baseline().map(|b| b.value), Some(0));

        let deviation = baseline.observe(10).unwrap();
        assert_eq!(deviation.previous, 0);
        assert_eq!(deviation.current, 10);
    }

    #[test]
    fn in_band_observation_keeps_baseline() {
        let mut baseline = MetricBaseline::new(Metric::ResponseTime, 10);
        baseline.observe(100);
        assert_eq!(baseline.observe(109), None);
        assert_eq!(baseline.observe(90), None);
        assert_eq!(baseline.baseline().map(|b| b.value), Some(100));
    }

    #[test]
    fn deviation_replaces_baseline_and_band() {
        let mut baseline = MetricBaseline::new(Metric::ResponseTime, 1);
        baseline.observe(500);

        let deviation = baseline.observe(400).unwrap();
        assert_eq!(
            deviation,
            Deviation {
                metric: Metric::ResponseTime,
                previous: 500,
                current: 400,
                band: ToleranceBand { low: 495, high: 505 },
            }
        );
        assert_eq!(
            baseline.baseline(),
            Some(Baseline { value: 400, band: ToleranceBand { low: 396, high: 404 } })
        );
    }

    #[test]
    fn warning_resets_on_next_in_band_sample() {
        let mut baseline = MetricBaseline::new(Metric::ResponseTime, 1);
        baseline.observe(5000);
        assert!(baseline.observe(4000).is_some());
        assert!(baseline.observe(4010).is_none());
        assert!(baseline.observe(4000).is_none());
    }

    #[test]
    fn variance_scenario_sequence() {
        let mut monitor = VarianceMonitor::new(1);

        // A: first fetch sets both baselines.
        assert!(monitor.observe(&sample(200, 500, 1000)).is_empty());
        let snap = monitor.snapshot();
        assert_eq!(
            snap.body_bytes,
            Some(Baseline { value: 1000, band: ToleranceBand { low: 990, high: 1010 } })
        );
        assert_eq!(
            snap.response_time,
            Some(Baseline { value: 500, band: ToleranceBand { low: 495, high: 505 } })
        );

        // B: body grows past the band.
        let deviations = monitor.observe(&sample(200, 500, 1200));
        assert_eq!(deviations.len(), 1);
        assert_eq!(deviations[0].metric, Metric::BodyBytes);
        assert_eq!(deviations[0].to_string(), "previously 1000 bytes, now 1200 bytes");
        assert_eq!(
            monitor.snapshot().body_bytes,
            Some(Baseline { value: 1200, band: ToleranceBand { low: 1188, high: 1212 } })
        );

        // C: same size again is inside the new band.
        assert!(monitor.observe(&sample(200, 500, 1200)).is_empty());
    }

    #[test]
    fn redirect_leaves_byte_baseline_untouched() {
        let mut monitor = VarianceMonitor::new(1);
        monitor.observe(&sample(200, 500, 1000));
        let before = monitor.snapshot().body_bytes;

        let deviations = monitor.observe(&sample(302, 500, 17));
        assert!(deviations.is_empty());
        assert_eq!(monitor.snapshot().body_bytes, before);
    }

    #[test]
    fn redirect_as_first_fetch_leaves_bytes_unset() {
        let mut monitor = VarianceMonitor::new(5);
        monitor.observe(&sample(301, 200, 0));
        assert!(monitor.snapshot().body_bytes.is_none());
        assert!(monitor.snapshot().response_time.is_some());
    }

    #[test]
    fn identical_samples_are_idempotent() {
        let mut monitor = VarianceMonitor::new(5);
        monitor.observe_values(250, Some(4096));
        let snap = monitor.snapshot();

        assert!(monitor.observe_values(250, Some(4096)).is_empty());
        assert!(monitor.observe_values(250, Some(4096)).is_empty());
        assert_eq!(monitor.snapshot(), snap);
    }

    #[test]
    fn metrics_deviate_independently() {
        let mut monitor = VarianceMonitor::new(5);
        monitor.observe_values(100, Some(1000));

        let deviations = monitor.observe_values(200, Some(2000));
        let metrics: Vec<Metric> = deviations.iter().map(|d| d.metric).collect();
        assert_eq!(metrics, vec![Metric::ResponseTime, Metric::BodyBytes]);
        assert_eq!(deviations[0].to_string(), "previously 100 ms, now 200 ms");
    }

    #[test]
    fn response_time_uses_dns_adjusted_value() {
        let mut monitor = VarianceMonitor::new(1);
        monitor.observe(&sample(200, 500, 1000));
        assert_eq!(monitor.snapshot().response_time.map(|b| b.value), Some(500));
    }
}
