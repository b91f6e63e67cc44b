//! Integer-ratio Resampling

use crate::VectorError;

/// Repeat every sample `ratio` times
pub fn upsample(values: &[f64], ratio: usize) -> Result<Vec<f64>, VectorError> {
    if ratio == 0 {
        return Err(VectorError::InvalidFactor(ratio));
    }
    let mut out = Vec::with_capacity(values.len() * ratio);
    for &v in values {
        out.extend(std::iter::repeat(v).take(ratio));
    }
    Ok(out)
}

/// Keep every `ratio`-th sample, starting at the first one
pub fn downsample(values: &[f64], ratio: usize) -> Result<Vec<f64>, VectorError> {
    if ratio == 0 {
        return Err(VectorError::InvalidFactor(ratio));
    }
    Ok(values.iter().step_by(ratio).cloned().collect())
}

/// `numerator / denominator` when it divides exactly and is positive
pub fn exact_ratio(numerator: usize, denominator: usize) -> Option<usize> {
    if denominator == 0 || numerator == 0 || numerator % denominator != 0 {
        None
    } else {
        Some(numerator / denominator)
    }
}
