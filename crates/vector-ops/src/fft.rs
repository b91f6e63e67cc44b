//! FFT-based Spectral Operations
//!
//! Forward transforms are normalised by `1/n`, inverse transforms are not, so
//! a forward/inverse pair reproduces the input. Every operation returns the
//! real part of the inverse transform.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;
use tracing::debug;

use crate::VectorError;

/// Spectral operations sharing one FFT planner
pub struct SpectralOps {
    /// FFT planner for efficient computation
    planner: FftPlanner<f64>,
}

impl Default for SpectralOps {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralOps {
    /// Create a new set of spectral operations
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Normalised forward transform of a real signal
    pub fn spectrum(&mut self, signal: &[f64]) -> Vec<Complex<f64>> {
        let n = signal.len();
        let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
        if n == 0 {
            return buffer;
        }

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let scale = 1.0 / n as f64;
        for c in buffer.iter_mut() {
            *c *= scale;
        }
        buffer
    }

    /// Unnormalised inverse transform, keeping the real part
    fn inverse_real(&mut self, mut buffer: Vec<Complex<f64>>) -> Vec<f64> {
        let n = buffer.len();
        if n == 0 {
            return Vec::new();
        }
        let ifft = self.planner.plan_fft_inverse(n);
        ifft.process(&mut buffer);
        buffer.iter().map(|c| c.re).collect()
    }

    /// Circular convolution through the frequency domain.
    ///
    /// With `unit_dc` the kernel's zero-frequency term is forced to 1 so the
    /// signal mean passes through unchanged.
    pub fn fft_conv(
        &mut self,
        signal: &[f64],
        kernel: &[f64],
        unit_dc: bool,
    ) -> Result<Vec<f64>, VectorError> {
        if signal.len() != kernel.len() {
            return Err(VectorError::LengthMismatch {
                left: signal.len(),
                right: kernel.len(),
            });
        }
        if signal.is_empty() {
            return Ok(Vec::new());
        }

        let mut k = self.spectrum(kernel);
        if unit_dc {
            k[0] = Complex::new(1.0, 0.0);
        }
        let x = self.spectrum(signal);

        let product: Vec<Complex<f64>> = k.iter().zip(x.iter()).map(|(a, b)| a * b).collect();
        Ok(self.inverse_real(product))
    }

    /// Delay a signal by `shift` samples (fractional shifts allowed)
    pub fn phase_shift(&mut self, signal: &[f64], shift: f64) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let x = self.spectrum(signal);
        let phi = phase_ramp(n, -shift);
        let rotated: Vec<Complex<f64>> = x
            .iter()
            .zip(phi.iter())
            .map(|(c, &p)| c * Complex::from_polar(1.0, p))
            .collect();
        self.inverse_real(rotated)
    }

    /// Band-limited interpolation producing `factor` samples per input sample
    pub fn sinc_interpolate(&mut self, signal: &[f64], factor: usize) -> Result<Vec<f64>, VectorError> {
        let n = signal.len();
        if n < 2 {
            return Err(VectorError::TooShort { len: n, min: 2 });
        }
        if factor == 0 {
            return Err(VectorError::InvalidFactor(factor));
        }

        let x = self.spectrum(signal);
        let mut out = vec![0.0; n * factor];

        for i in 0..factor {
            let phi = phase_ramp(n, i as f64 / factor as f64);
            let rotated: Vec<Complex<f64>> = x
                .iter()
                .zip(phi.iter())
                .map(|(c, &p)| c * Complex::from_polar(1.0, p))
                .collect();
            let shifted = self.inverse_real(rotated);
            for (j, v) in shifted.into_iter().enumerate() {
                out[j * factor + i] = v;
            }
        }

        debug!(input = n, factor, "sinc interpolation");
        Ok(out)
    }

    /// Spectral first derivative; the Nyquist and DC terms are dropped
    pub fn derivative(&mut self, signal: &[f64]) -> Result<Vec<f64>, VectorError> {
        let n = signal.len();
        if n % 2 != 0 {
            return Err(VectorError::OddLength(n));
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let x = self.spectrum(signal);
        let mut d = vec![Complex::new(0.0, 0.0); n];
        let fundamental = 2.0 * PI / n as f64;

        for h in 1..n / 2 {
            let w = fundamental * h as f64;
            d[h] = Complex::new(0.0, w) * x[h];
            d[n - h] = Complex::new(0.0, -w) * x[n - h];
        }

        Ok(self.inverse_real(d))
    }

    /// Rescale so the largest spectral magnitude (unnormalised) equals `n`.
    ///
    /// Samples below `1e-8` in magnitude are zeroed first. A vector with an
    /// all-zero spectrum is returned as zeros.
    pub fn norm_mag(&mut self, signal: &[f64]) -> Vec<f64> {
        let cleaned: Vec<f64> = signal
            .iter()
            .map(|&v| if v.abs() < 1e-8 { 0.0 } else { v })
            .collect();
        let x = self.spectrum(&cleaned);
        let peak = x.iter().map(|c| c.norm()).fold(0.0, f64::max);
        if peak == 0.0 {
            return vec![0.0; cleaned.len()];
        }
        let scaled: Vec<Complex<f64>> = x.iter().map(|c| c / peak).collect();
        self.inverse_real(scaled)
    }
}

/// Linear phase advancing a length-`n` signal by `shift` samples.
///
/// For even lengths the Nyquist bin is not mirrored.
fn phase_ramp(n: usize, shift: f64) -> Vec<f64> {
    let mut phi = vec![0.0; n];
    let half = n / 2;
    for j in 1..=half {
        phi[j] = shift * 2.0 * PI * j as f64 / n as f64;
        if n % 2 == 1 || j != half {
            phi[n - j] = -phi[j];
        }
    }
    phi
}
