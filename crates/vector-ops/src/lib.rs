//! Covariate Vector Operations
//!
//! Numeric building blocks for design-matrix construction: summary statistics,
//! integer-ratio resampling, onset (delta) conversion, FFT based convolution,
//! sinc interpolation, phase shifting, spectral derivatives and least-squares fits.

mod delta;
mod fft;
mod fit;
mod resample;
mod statistics;

pub use delta::convert_to_delta;
pub use fft::SpectralOps;
pub use fit::least_squares_fit;
pub use resample::{downsample, exact_ratio, upsample};
pub use statistics::{
    count_nonzero, mean_center, mean_center_nonzero, sum_of_squares, unit_excursion,
    unit_variance, VectorSummary,
};

use thiserror::Error;

/// Errors raised by vector operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    /// Two operands must have the same length
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// The operation needs at least `min` samples
    #[error("vector too short: {len} samples, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// Spectral derivative is only defined for even lengths
    #[error("derivative requires an even number of samples, got {0}")]
    OddLength(usize),

    /// A convolution kernel longer than the signal
    #[error("kernel has {kernel} samples but the signal only {signal}")]
    KernelTooLong { kernel: usize, signal: usize },

    /// Regressors of a least-squares fit are linearly dependent
    #[error("covariates are linearly dependent")]
    Singular,

    /// Resampling factor must be a positive integer
    #[error("invalid resampling factor {0}")]
    InvalidFactor(usize),
}
