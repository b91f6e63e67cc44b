//! Single-covariate modifier pipeline

use matrix_store::read_ref;
use std::path::PathBuf;
use tracing::debug;
use vector_ops::{
    convert_to_delta, exact_ratio, least_squares_fit, mean_center, mean_center_nonzero, unit_excursion,
    unit_variance, SpectralOps, VectorError,
};

use crate::covariate::{find_unique, CovType, Covariate};
use crate::error::GdsError;
use crate::params::Timing;

/// A named operation on a covariate
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    MeanCenter,
    MeanCenterNonZero,
    UnitVariance,
    UnitExcursion,
    ConvertDelta,
    Convolve {
        kernel: PathBuf,
        kernel_tr_ms: u32,
        tag: Option<String>,
    },
    TimeShift {
        ms: i64,
    },
    Multiply {
        full_name: String,
    },
    Orthogonalize,
    Derivative {
        count: usize,
    },
    Exponential {
        power: f64,
    },
    EigenSet,
    Fir {
        order: usize,
    },
    FourierSet,
}

impl Modifier {
    pub fn keyword(&self) -> &'static str {
        match self {
            Modifier::MeanCenter => "mean-center",
            Modifier::MeanCenterNonZero => "mean-center-non-zero",
            Modifier::UnitVariance => "unit-variance",
            Modifier::UnitExcursion => "unit-excursion",
            Modifier::ConvertDelta => "convert-delta",
            Modifier::Convolve { .. } => "convolve",
            Modifier::TimeShift { .. } => "time-shift",
            Modifier::Multiply { .. } => "multiply",
            Modifier::Orthogonalize => "orthog",
            Modifier::Derivative { .. } => "derivative",
            Modifier::Exponential { .. } => "exponential",
            Modifier::EigenSet => "eigen-vector",
            Modifier::Fir { .. } => "fir",
            Modifier::FourierSet => "fourier-set",
        }
    }

    /// Operations that replace one covariate by several
    pub fn is_compound(&self) -> bool {
        self.is_copy_only() || self.is_expand_only()
    }

    /// Legal only inside `newcov cp`
    pub fn is_copy_only(&self) -> bool {
        matches!(self, Modifier::Derivative { .. } | Modifier::Exponential { .. })
    }

    /// Legal only inside `modcov+`
    pub fn is_expand_only(&self) -> bool {
        matches!(self, Modifier::EigenSet | Modifier::Fir { .. } | Modifier::FourierSet)
    }
}

/// Covariates used as regressors by `orthog`
#[derive(Debug, Clone, PartialEq)]
pub enum OrthSet {
    /// Every other covariate
    All,
    /// Every other covariate of one type
    OfType(CovType),
    /// Explicit full names
    Names(Vec<String>),
}

/// Covariate under construction
#[derive(Debug, Clone, PartialEq)]
pub struct Working {
    pub name: String,
    pub values: Vec<f64>,
}

/// What a modifier may look at besides its own covariate
pub struct ModifierContext<'a> {
    /// Current covariate list
    pub covariates: &'a [Covariate],
    /// Index of the covariate being modified, excluded from orthogonalization
    pub exclude: Option<usize>,
    pub orth: Option<&'a OrthSet>,
    pub timing: Timing,
}

impl<'a> ModifierContext<'a> {
    fn orth_regressors(&self) -> Result<Vec<&'a [f64]>, GdsError> {
        let set = self
            .orth
            .ok_or_else(|| GdsError::Syntax("orthog needs an orth-type or orth-name line".to_string()))?;
        let covariates = self.covariates;
        let indices: Vec<usize> = match set {
            OrthSet::All => (0..covariates.len()).filter(|&i| Some(i) != self.exclude).collect(),
            OrthSet::OfType(t) => (0..covariates.len())
                .filter(|&i| Some(i) != self.exclude && covariates[i].cov_type == *t)
                .collect(),
            OrthSet::Names(names) => {
                let mut found = Vec::with_capacity(names.len());
                for name in names {
                    let idx = find_unique(covariates, name)?;
                    if Some(idx) == self.exclude {
                        return Err(GdsError::Semantic(format!(
                            "cannot orthogonalize {} against itself",
                            name
                        )));
                    }
                    found.push(idx);
                }
                found
            }
        };
        if indices.is_empty() {
            return Err(GdsError::Semantic(
                "no covariates found to orthogonalize against".to_string(),
            ));
        }
        Ok(indices.into_iter().map(|i| covariates[i].values.as_slice()).collect())
    }
}

/// Apply one non-compound modifier in place
pub fn apply(
    modifier: &Modifier,
    target: &mut Working,
    ctx: &ModifierContext<'_>,
    ops: &mut SpectralOps,
) -> Result<(), GdsError> {
    match modifier {
        Modifier::MeanCenter => mean_center(&mut target.values),
        Modifier::MeanCenterNonZero => mean_center_nonzero(&mut target.values),
        Modifier::UnitVariance => unit_variance(&mut target.values),
        Modifier::UnitExcursion => unit_excursion(&mut target.values),
        Modifier::ConvertDelta => convert_to_delta(&mut target.values),
        Modifier::Convolve {
            kernel,
            kernel_tr_ms,
            tag,
        } => {
            let kernel = read_ref(kernel)?;
            target.values = convolve(&target.values, &kernel, *kernel_tr_ms, ctx.timing, ops)?;
            if let Some(tag) = tag {
                target.name = format!("{}({})", target.name, tag);
            }
        }
        Modifier::TimeShift { ms } => {
            let shift = *ms as f64 / ctx.timing.sampling_ms as f64;
            target.values = ops.phase_shift(&target.values, shift);
            target.name = format!("{} [shift {}]", target.name, ms);
        }
        Modifier::Multiply { full_name } => {
            let idx = find_unique(ctx.covariates, full_name)?;
            for (v, m) in target.values.iter_mut().zip(ctx.covariates[idx].values.iter()) {
                *v *= m;
            }
        }
        Modifier::Orthogonalize => {
            let regressors = ctx.orth_regressors()?;
            let fit = least_squares_fit(&regressors, &target.values).map_err(|e| match e {
                VectorError::Singular => {
                    GdsError::Numeric("invalid orthogonalization: covariates are linearly dependent".to_string())
                }
                other => GdsError::Vector(other),
            })?;
            for (v, f) in target.values.iter_mut().zip(fit) {
                *v -= f;
            }
        }
        compound => {
            return Err(GdsError::Context(format!(
                "{} cannot be applied as a single-covariate option",
                compound.keyword()
            )))
        }
    }
    debug!(modifier = modifier.keyword(), name = %target.name, "modifier applied");
    Ok(())
}

/// Apply a run of non-compound modifiers in order
pub fn apply_all(
    steps: &[Modifier],
    target: &mut Working,
    ctx: &ModifierContext<'_>,
    ops: &mut SpectralOps,
) -> Result<(), GdsError> {
    for step in steps {
        apply(step, target, ctx, ops)?;
    }
    Ok(())
}

/// Convolve with a kernel sampled every `kernel_tr_ms` milliseconds
pub fn convolve(
    values: &[f64],
    kernel: &[f64],
    kernel_tr_ms: u32,
    timing: Timing,
    ops: &mut SpectralOps,
) -> Result<Vec<f64>, GdsError> {
    let factor = exact_ratio(kernel_tr_ms as usize, timing.sampling_ms as usize).ok_or_else(|| {
        GdsError::Semantic(format!(
            "kernel TR ({}) is not a multiple of the sampling rate ({})",
            kernel_tr_ms, timing.sampling_ms
        ))
    })?;
    let fine = ops.sinc_interpolate(kernel, factor)?;
    if fine.len() > values.len() {
        return Err(VectorError::KernelTooLong {
            kernel: fine.len(),
            signal: values.len(),
        }
        .into());
    }

    let mut padded = vec![0.0; values.len()];
    padded[..fine.len()].copy_from_slice(&fine);
    mean_center(&mut padded);
    let normalized = ops.norm_mag(&padded);
    Ok(ops.fft_conv(values, &normalized, true)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> Timing {
        Timing {
            tr_ms: 2000,
            sampling_ms: 100,
            total_points: 4,
        }
    }

    fn ctx<'a>(covariates: &'a [Covariate], orth: Option<&'a OrthSet>, exclude: Option<usize>) -> ModifierContext<'a> {
        ModifierContext {
            covariates,
            exclude,
            orth,
            timing: timing(),
        }
    }

    fn working(values: Vec<f64>) -> Working {
        Working {
            name: "x".to_string(),
            values,
        }
    }

    #[test]
    fn test_time_shift_renames() {
        let mut ops = SpectralOps::new();
        let mut w = working((0..80).map(|i| if i < 10 { 1.0 } else { 0.0 }).collect());
        apply(&Modifier::TimeShift { ms: 500 }, &mut w, &ctx(&[], None, None), &mut ops).unwrap();
        assert_eq!(w.name, "x [shift 500]");
        assert!((w.values[5] - 1.0).abs() < 1e-6);
        assert!(w.values[0].abs() < 1e-6);
    }

    #[test]
    fn test_multiply_by_named_covariate() {
        let mut ops = SpectralOps::new();
        let covs = vec![Covariate::new("m", CovType::Interest, vec![2.0, 0.0, 1.0])];
        let mut w = working(vec![1.0, 5.0, 3.0]);
        let m = Modifier::Multiply {
            full_name: "m".to_string(),
        };
        apply(&m, &mut w, &ctx(&covs, None, None), &mut ops).unwrap();
        assert_eq!(w.values, vec![2.0, 0.0, 3.0]);

        let missing = Modifier::Multiply {
            full_name: "nope".to_string(),
        };
        assert!(apply(&missing, &mut w, &ctx(&covs, None, None), &mut ops).is_err());
    }

    #[test]
    fn test_orthogonalize_removes_projection() {
        let mut ops = SpectralOps::new();
        let covs = vec![Covariate::new("a", CovType::NoInterest, vec![1.0, -1.0, 1.0, -1.0])];
        let set = OrthSet::All;
        let mut w = working(vec![3.0, -1.0, 2.0, 0.0]);
        apply(&Modifier::Orthogonalize, &mut w, &ctx(&covs, Some(&set), None), &mut ops).unwrap();
        let dot: f64 = w.values.iter().zip(covs[0].values.iter()).map(|(a, b)| a * b).sum();
        assert!(dot.abs() < 1e-9);
    }

    #[test]
    fn test_orthogonalize_collinear_is_numeric_error() {
        let mut ops = SpectralOps::new();
        let covs = vec![
            Covariate::new("a", CovType::Interest, vec![1.0, 2.0, 3.0, 4.0]),
            Covariate::new("b", CovType::Interest, vec![2.0, 4.0, 6.0, 8.0]),
        ];
        let set = OrthSet::Names(vec!["a".to_string(), "b".to_string()]);
        let original = vec![0.5, 1.0, 1.5, 2.0];
        let mut w = working(original.clone());
        let err = apply(&Modifier::Orthogonalize, &mut w, &ctx(&covs, Some(&set), None), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Numeric(_)));
        assert_eq!(w.values, original);
    }

    #[test]
    fn test_orth_type_excludes_target() {
        let mut ops = SpectralOps::new();
        let covs = vec![Covariate::new("a", CovType::Interest, vec![1.0, 0.0, 0.0, 0.0])];
        let set = OrthSet::OfType(CovType::Interest);
        let mut w = working(vec![1.0, 1.0, 1.0, 1.0]);
        let err = apply(&Modifier::Orthogonalize, &mut w, &ctx(&covs, Some(&set), Some(0)), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Semantic(_)));
    }

    #[test]
    fn test_compound_rejected_as_single() {
        let mut ops = SpectralOps::new();
        let mut w = working(vec![1.0, 2.0]);
        let err = apply(&Modifier::Fir { order: 2 }, &mut w, &ctx(&[], None, None), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Context(_)));
    }

    #[test]
    fn test_convolve_kernel_ratio() {
        let mut ops = SpectralOps::new();
        let values = vec![0.0; 80];
        let err = convolve(&values, &[0.0, 1.0, 0.5], 250, timing(), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Semantic(_)));
        let err = convolve(&values, &[0.0; 10], 2000, timing(), &mut ops).unwrap_err();
        assert!(matches!(err, GdsError::Vector(VectorError::KernelTooLong { .. })));
    }

    #[test]
    fn test_convolve_preserves_mean() {
        let mut ops = SpectralOps::new();
        let values: Vec<f64> = (0..80).map(|i| if (i / 20) % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let out = convolve(&values, &[0.0, 1.0, 0.4, 0.0], 1000, timing(), &mut ops).unwrap();
        let mean_in: f64 = values.iter().sum::<f64>() / 80.0;
        let mean_out: f64 = out.iter().sum::<f64>() / 80.0;
        assert_eq!(out.len(), 80);
        assert!((mean_in - mean_out).abs() < 1e-9);
    }
}
