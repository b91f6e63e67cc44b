//! Summary Statistics and In-place Normalisation

/// Summary statistics for a covariate vector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSummary {
    /// Sum of all samples
    pub sum: f64,
    /// Mean value
    pub mean: f64,
    /// Sample variance (n - 1 denominator)
    pub variance: f64,
    /// Standard deviation
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Number of non-zero samples
    pub nonzero: usize,
}

impl VectorSummary {
    /// Compute summary statistics from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let mean = sum / n;

        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let m2: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        let variance = if values.len() > 1 { m2 / (n - 1.0) } else { 0.0 };

        Self {
            sum,
            mean,
            variance,
            std_dev: variance.sqrt(),
            min,
            max,
            nonzero: count_nonzero(values),
        }
    }

    /// True when the vector carries no variation (constant columns such as an intercept)
    pub fn is_constant(&self) -> bool {
        self.variance <= 1e-15
    }
}

/// Subtract the mean from every sample
pub fn mean_center(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in values.iter_mut() {
        *v -= mean;
    }
}

/// Subtract the mean of the non-zero samples from the non-zero samples only
pub fn mean_center_nonzero(values: &mut [f64]) {
    let nonzero = count_nonzero(values);
    if nonzero == 0 {
        return;
    }
    let mean = values.iter().sum::<f64>() / nonzero as f64;
    for v in values.iter_mut().filter(|v| **v != 0.0) {
        *v -= mean;
    }
}

/// Scale to unit sample variance; constant vectors are left untouched
pub fn unit_variance(values: &mut [f64]) {
    let variance = VectorSummary::compute(values).variance;
    if variance > 0.0 {
        let scale = variance.sqrt();
        for v in values.iter_mut() {
            *v /= scale;
        }
    }
}

/// Shift the minimum to 0, then scale the maximum to 1
pub fn unit_excursion(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let min = values.iter().cloned().fold(f64::MAX, f64::min);
    for v in values.iter_mut() {
        *v -= min;
    }
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    if max != 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Sum of squared samples (signal power)
pub fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// Number of samples different from zero
pub fn count_nonzero(values: &[f64]) -> usize {
    values.iter().filter(|v| **v != 0.0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_summary_basic() {
        let summary = VectorSummary::compute(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.sum, 10.0);
        assert!((summary.mean - 2.5).abs() < 1e-12);
        assert!((summary.variance - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.nonzero, 4);
    }

    #[test]
    fn test_constant_is_detected() {
        assert!(VectorSummary::compute(&[1.0; 16]).is_constant());
        assert!(!VectorSummary::compute(&[1.0, 0.0, 1.0]).is_constant());
    }

    #[test]
    fn test_mean_center_nonzero_leaves_zeros() {
        let mut v = vec![0.0, 2.0, 0.0, 4.0];
        mean_center_nonzero(&mut v);
        assert_eq!(v, vec![0.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unit_excursion_range() {
        let mut v = vec![-2.0, 0.0, 2.0];
        unit_excursion(&mut v);
        assert_eq!(v, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_unit_variance_constant_untouched() {
        let mut v = vec![3.0; 5];
        unit_variance(&mut v);
        assert_eq!(v, vec![3.0; 5]);
    }

    #[test]
    fn test_unit_variance_scales() {
        let mut v = vec![1.0, -1.0, 1.0, -1.0];
        unit_variance(&mut v);
        let variance = VectorSummary::compute(&v).variance;
        assert!((variance - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn mean_center_is_idempotent(values in prop::collection::vec(-1.0e3f64..1.0e3, 1..200)) {
            let mut once = values.clone();
            mean_center(&mut once);
            let mut twice = once.clone();
            mean_center(&mut twice);
            for (a, b) in once.iter().zip(twice.iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
