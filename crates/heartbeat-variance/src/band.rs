//! Tolerance bands around a baseline value.

use std::fmt;

/// Inclusive range of values considered normal around a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceBand {
    pub low: u64,
    pub high: u64,
}

impl ToleranceBand {
    /// Band of `value × (1 ∓ variance_percent / 100)`, truncated toward zero.
    ///
    /// Percentages above 100 are clamped to 100.
    pub fn around(value: u64, variance_percent: u8) -> Self {
        let pct = u128::from(variance_percent.min(100));
        let value = u128::from(value);

        // low never exceeds value, so the narrowing is lossless.
        let low = (value * (100 - pct) / 100) as u64;
        let high = u64::try_from(value * (100 + pct) / 100).unwrap_or(u64::MAX);

        Self { low, high }
    }

    /// Whether `value` lies inside the band. Both bounds are inside.
    pub fn contains(&self, value: u64) -> bool {
        self.low <= value && value <= self.high
    }
}

impl fmt::Display for ToleranceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.low, self.high)
    }
}
