use std::ops::RangeInclusive;

use rand::Rng;

/// Supplies the single numeric feature fed to every model on `/process`.
pub trait FeatureSource: Send + Sync {
    fn next_feature(&self) -> f64;
}

/// Stand-in for a heart rate derived from real sensor data: a uniform draw
/// from a fixed range on every call.
#[derive(Debug, Clone)]
pub struct SimulatedHeartRate {
    range: RangeInclusive<f64>,
}

impl SimulatedHeartRate {
    pub const DEFAULT_RANGE: RangeInclusive<f64> = 60.0..=100.0;

    pub fn new(range: RangeInclusive<f64>) -> Self {
        Self { range }
    }
}

impl Default for SimulatedHeartRate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RANGE)
    }
}

impl FeatureSource for SimulatedHeartRate {
    fn next_feature(&self) -> f64 {
        rand::thread_rng().gen_range(self.range.clone())
    }
}

/// Always yields the same value.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedFeature(pub f64);

#[cfg(test)]
impl FeatureSource for FixedFeature {
    fn next_feature(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_heart_rate_stays_in_range() {
        let source = SimulatedHeartRate::default();
        for _ in 0..1_000 {
            let value = source.next_feature();
            assert!((60.0..=100.0).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn fixed_feature_repeats() {
        let source = FixedFeature(72.5);
        assert_eq!(source.next_feature(), 72.5);
        assert_eq!(source.next_feature(), 72.5);
    }
}
