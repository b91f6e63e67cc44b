//! Compound (multi-output) modifiers
//!
//! Each expansion turns one working covariate into a list of outputs with
//! default names. The caller runs the remaining pipeline on every output,
//! applies positional names and splices the result into the covariate list.

use matrix_store::read_ref;
use std::f64::consts::PI;
use tracing::debug;
use vector_ops::{convert_to_delta, exact_ratio, mean_center, unit_variance, SpectralOps};

use crate::config::EngineConfig;
use crate::error::GdsError;
use crate::modifier::{Modifier, Working};
use crate::params::Timing;
use crate::section::FourierParams;

/// Number of canonical eigenvector kernels
const EIGEN_KERNELS: usize = 3;

/// Expand `source` by `compound`
pub fn expand(
    compound: &Modifier,
    source: &Working,
    fourier: &FourierParams,
    timing: Timing,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<Vec<Working>, GdsError> {
    let outputs = match compound {
        Modifier::Derivative { count } => derivatives(source, *count, ops)?,
        Modifier::Exponential { power } => vec![exponential(source, *power)],
        Modifier::EigenSet => eigen_set(source, timing, config, ops)?,
        Modifier::Fir { order } => fir_set(source, *order, timing, ops),
        Modifier::FourierSet => fourier_set(source, fourier, timing, ops)?,
        other => {
            return Err(GdsError::Context(format!(
                "{} does not expand a covariate",
                other.keyword()
            )))
        }
    };
    debug!(compound = compound.keyword(), source = %source.name, outputs = outputs.len(), "covariate expanded");
    Ok(outputs)
}

/// `count` chained spectral derivatives
fn derivatives(source: &Working, count: usize, ops: &mut SpectralOps) -> Result<Vec<Working>, GdsError> {
    let mut outputs = Vec::with_capacity(count);
    let mut current = source.values.clone();
    for k in 0..count {
        current = ops.derivative(&current)?;
        outputs.push(Working {
            name: format!("{} [deriv #{}]", source.name, k),
            values: current.clone(),
        });
    }
    Ok(outputs)
}

fn exponential(source: &Working, power: f64) -> Working {
    Working {
        name: format!("{} [^{:.1}]", source.name, power),
        values: source.values.iter().map(|v| v.powf(power)).collect(),
    }
}

fn eigen_set(
    source: &Working,
    timing: Timing,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<Vec<Working>, GdsError> {
    let factor = exact_ratio(config.eigen_reference_ms as usize, timing.sampling_ms as usize).ok_or_else(|| {
        GdsError::Semantic(format!(
            "eigen-vector requires that {} be divided by the sampling rate ({})",
            config.eigen_reference_ms, timing.sampling_ms
        ))
    })?;

    let mut onsets = source.values.clone();
    convert_to_delta(&mut onsets);
    let len = onsets.len();

    let mut outputs = Vec::with_capacity(EIGEN_KERNELS);
    for i in 1..=EIGEN_KERNELS {
        let kernel = read_ref(&config.eigen_kernel(i))?;
        let fine = ops.sinc_interpolate(&kernel, factor)?;
        let mut padded = vec![0.0; len];
        let n = fine.len().min(len);
        padded[..n].copy_from_slice(&fine[..n]);
        outputs.push(Working {
            name: format!("{} [Eigen{}]", source.name, i),
            values: ops.fft_conv(&onsets, &padded, false)?,
        });
    }
    Ok(outputs)
}

/// `order + 1` copies of the onsets, each shifted by one more TR
fn fir_set(source: &Working, order: usize, timing: Timing, ops: &mut SpectralOps) -> Vec<Working> {
    let mut onsets = source.values.clone();
    convert_to_delta(&mut onsets);
    let ticks = timing.ratio() as f64;
    (0..=order)
        .map(|j| Working {
            name: format!("{} [FIR{}]", source.name, j),
            values: if j == 0 {
                onsets.clone()
            } else {
                ops.phase_shift(&onsets, j as f64 * ticks)
            },
        })
        .collect()
}

fn fourier_set(
    source: &Working,
    params: &FourierParams,
    timing: Timing,
    ops: &mut SpectralOps,
) -> Result<Vec<Working>, GdsError> {
    let period = params
        .period_s
        .ok_or_else(|| GdsError::Syntax("fs-period not defined".to_string()))?;
    let harmonics = params
        .harmonics
        .ok_or_else(|| GdsError::Syntax("fs-harmonics not defined".to_string()))?;
    let len = timing.fine_len();
    let width = (period * 1000.0 / timing.sampling_ms as f64) as usize;
    if width == 0 || width > len {
        return Err(GdsError::Semantic(format!(
            "fs-period {} does not fit in the session",
            period
        )));
    }

    let mut base = source.values.clone();
    if params.delta {
        convert_to_delta(&mut base);
    }

    let mut windowed = |label: String, wave: &dyn Fn(usize) -> f64| -> Result<Working, GdsError> {
        let mut window = vec![0.0; len];
        for (k, slot) in window.iter_mut().take(width).enumerate() {
            *slot = wave(k);
        }
        let mut values = ops.fft_conv(&base, &window, false)?;
        mean_center(&mut values);
        unit_variance(&mut values);
        Ok(Working {
            name: format!("{} {}", source.name, label),
            values,
        })
    };

    let mut outputs = Vec::with_capacity(2 * harmonics + 1);
    if params.zero_freq {
        outputs.push(windowed("[DC]".to_string(), &|_| 1.0)?);
    }
    for m in 1..=harmonics {
        let w = 2.0 * PI * m as f64 / width as f64;
        outputs.push(windowed(format!("[sin #{}]", m), &|k| (w * k as f64).sin())?);
        outputs.push(windowed(format!("[cos #{}]", m), &|k| (w * k as f64).cos())?);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vector_ops::VectorSummary;

    fn timing() -> Timing {
        Timing {
            tr_ms: 2000,
            sampling_ms: 100,
            total_points: 10,
        }
    }

    fn blocks() -> Working {
        Working {
            name: "task".to_string(),
            values: (0..200).map(|i| if (i / 25) % 2 == 0 { 0.0 } else { 1.0 }).collect(),
        }
    }

    #[test]
    fn test_derivative_chain() {
        let mut ops = SpectralOps::new();
        let src = blocks();
        let out = expand(
            &Modifier::Derivative { count: 3 },
            &src,
            &FourierParams::default(),
            timing(),
            &EngineConfig::default(),
            &mut ops,
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].name, "task [deriv #2]");
        let second = ops.derivative(&out[0].values).unwrap();
        for (a, b) in second.iter().zip(out[1].values.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_exponential_name() {
        let src = Working {
            name: "x".to_string(),
            values: vec![1.0, 2.0, 3.0],
        };
        let out = exponential(&src, 2.0);
        assert_eq!(out.name, "x [^2.0]");
        assert_eq!(out.values, vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_fir_shifts_by_tr() {
        let mut ops = SpectralOps::new();
        let out = fir_set(&blocks(), 2, timing(), &mut ops);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name, "task [FIR0]");
        assert_eq!(out[0].values[25], 1.0);
        assert!((out[1].values[45] - 1.0).abs() < 1e-9);
        assert!((out[2].values[65] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fourier_outputs() {
        let mut ops = SpectralOps::new();
        let params = FourierParams {
            period_s: Some(4.0),
            harmonics: Some(2),
            zero_freq: true,
            delta: true,
        };
        let out = fourier_set(&blocks(), &params, timing(), &mut ops).unwrap();
        let names: Vec<_> = out.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["task [DC]", "task [sin #1]", "task [cos #1]", "task [sin #2]", "task [cos #2]"]
        );
        for w in &out {
            let s = VectorSummary::compute(&w.values);
            assert!(s.mean.abs() < 1e-9);
            assert!((s.variance - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fourier_requires_parameters() {
        let mut ops = SpectralOps::new();
        let err = fourier_set(&blocks(), &FourierParams::default(), timing(), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Syntax(_)));
    }

    #[test]
    fn test_eigen_reads_kernels() {
        let dir = tempfile::tempdir().unwrap();
        let filters = dir.path().join("filters");
        std::fs::create_dir_all(&filters).unwrap();
        for i in 1..=3 {
            std::fs::write(filters.join(format!("Eigen{}.ref", i)), "0\n1\n0.5\n0.1\n").unwrap();
        }
        let config = EngineConfig {
            elements_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let mut ops = SpectralOps::new();
        let out = eigen_set(&blocks(), timing(), &config, &mut ops).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].name, "task [Eigen2]");
        assert_eq!(out[0].values.len(), 200);

        let missing = EngineConfig {
            elements_dir: dir.path().join("nowhere"),
            ..EngineConfig::default()
        };
        assert!(matches!(
            eigen_set(&blocks(), timing(), &missing, &mut ops),
            Err(GdsError::Storage(_))
        ));
    }
}
