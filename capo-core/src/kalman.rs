//! One-dimensional Kalman smoothing for the controller's measurement feed.

/// Scalar Kalman filter with fixed process and measurement noise.
#[derive(Debug, Clone)]
pub struct Kalman1D {
    estimate: f32, // x: smoothed frequency
    variance: f32, // p: estimate variance
    process_noise: f32,
    measurement_noise: f32,
}

impl Kalman1D {
    /// Creates the filter in its initial state: estimate 0, variance 1.
    pub fn new() -> Self {
        Self {
            estimate: 0.0,
            variance: 1.0,
            process_noise: 1e-3,
            measurement_noise: 1e-2,
        }
    }

    /// Folds one measurement into the estimate and returns the new estimate.
    ///
    /// Inputs are assumed sane; the measurement codec upstream rejects
    /// anything non-numeric before it reaches the filter.
    pub fn update(&mut self, measurement: f32) -> f32 {
        self.variance += self.process_noise;
        let gain = self.variance / (self.variance + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.variance *= 1.0 - gain;
        self.estimate
    }

    /// Current smoothed estimate in Hz.
    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    /// Current estimate variance.
    pub fn variance(&self) -> f32 {
        self.variance
    }
}

impl Default for Kalman1D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_is_pulled_almost_to_the_measurement() {
        // From the wide initial variance the gain is close to one.
        let mut filter = Kalman1D::new();
        let estimate = filter.update(100.0);
        assert!(estimate > 99.0 && estimate < 100.0);
    }

    #[test]
    fn golden_sequence_reproduces_the_reference_estimate() {
        let mut filter = Kalman1D::new();
        filter.update(440.0);
        filter.update(441.0);
        let final_estimate = filter.update(439.5);
        assert!(
            (final_estimate - 438.8459).abs() < 0.01,
            "estimate {final_estimate}"
        );
    }

    #[test]
    fn constant_input_converges_to_the_input() {
        let mut filter = Kalman1D::new();
        for _ in 0..50 {
            filter.update(220.0);
        }
        assert!((filter.estimate() - 220.0).abs() < 0.01);
        // Steady-state variance of the recurrence, (-q + sqrt(q^2 + 4qr)) / 2.
        assert!((filter.variance() - 2.70156e-3).abs() < 1e-5);
        assert!(filter.variance() > 0.0);
    }
}
