//! Onset (delta) Conversion

use crate::statistics::{mean_center, unit_variance, VectorSummary};

/// Replace a block design by its onsets.
///
/// A sample becomes 1 when it rises above its (circular) predecessor by more
/// than `1e-5 * |max|`, otherwise 0. If the input was roughly mean-centered
/// or roughly unit-variance, the result is brought back to the same state.
pub fn convert_to_delta(values: &mut [f64]) {
    let n = values.len();
    if n == 0 {
        return;
    }

    let before = VectorSummary::compute(values);
    let threshold = before.max.abs() * 1e-5;

    let onsets: Vec<f64> = (0..n)
        .map(|i| {
            let prev = if i == 0 { values[n - 1] } else { values[i - 1] };
            if values[i] - prev > threshold {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    values.copy_from_slice(&onsets);

    if before.sum > -0.9 && before.sum < 0.9 {
        mean_center(values);
    }
    if before.std_dev > 0.9 && before.std_dev < 1.1 {
        unit_variance(values);
    }
}
