//! Efficiency Evaluation
//!
//! Estimates how much of each covariate's power survives a hemodynamic
//! filter, relative to a base covariate, and selects the covariates that
//! fall below a cutoff.

use matrix_store::read_ref;
use std::path::PathBuf;
use tracing::{debug, info};
use vector_ops::{downsample, mean_center, sum_of_squares, SpectralOps, VectorSummary};

use crate::config::EngineConfig;
use crate::covariate::{CovType, Covariate};
use crate::error::GdsError;
use crate::params::Timing;

/// Ratios at or below this floor count as zero
const EFFICIENCY_FLOOR: f64 = 0.01;

/// When the covariate is brought to scan resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downsample {
    /// Convolve at the fine resolution
    None,
    /// Downsample, then convolve
    Before,
    /// Convolve, then downsample
    After,
}

impl Downsample {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "no" | "n" | "No" | "N" => Some(Self::None),
            "before" | "Before" => Some(Self::Before),
            "after" | "After" => Some(Self::After),
            _ => None,
        }
    }
}

/// Which covariates take part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffType {
    All,
    Interest,
    /// NoInterest and KeepNoInterest
    NoInterest,
}

impl EffType {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "A" | "a" => Some(Self::All),
            "I" | "i" => Some(Self::Interest),
            "N" | "n" => Some(Self::NoInterest),
            _ => None,
        }
    }

    pub fn matches(&self, cov_type: CovType) -> bool {
        match self {
            EffType::All => true,
            EffType::Interest => cov_type == CovType::Interest,
            EffType::NoInterest => matches!(cov_type, CovType::NoInterest | CovType::KeepNoInterest),
        }
    }
}

/// Parameters collected by a chkeff section
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyQuery {
    /// Index of the base covariate
    pub base: usize,
    pub downsample: Option<Downsample>,
    pub filter: Option<PathBuf>,
    pub eff_type: Option<EffType>,
    pub cutoff: Option<f64>,
}

impl EfficiencyQuery {
    pub fn new(base: usize) -> Self {
        Self {
            base,
            downsample: None,
            filter: None,
            eff_type: None,
            cutoff: None,
        }
    }
}

/// Result of one efficiency check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EfficiencyOutcome {
    /// Indices to delete, ascending
    pub deleted: Vec<usize>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

struct Evaluator<'a> {
    mode: Downsample,
    timing: Timing,
    filter: Vec<f64>,
    ops: &'a mut SpectralOps,
}

impl Evaluator<'_> {
    /// Filtered power over raw power; `None` for an all-zero covariate
    fn raw_efficiency(&mut self, values: &[f64]) -> Result<Option<f64>, GdsError> {
        let neural = sum_of_squares(values);
        if neural == 0.0 {
            return Ok(None);
        }
        Ok(Some(self.bold_power(values)? / neural))
    }

    fn bold_power(&mut self, values: &[f64]) -> Result<f64, GdsError> {
        let ratio = self.timing.ratio();
        let power = match self.mode {
            Downsample::None => sum_of_squares(&self.ops.fft_conv(values, &self.filter, true)?),
            Downsample::Before => {
                let coarse = downsample(values, ratio)?;
                sum_of_squares(&self.ops.fft_conv(&coarse, &self.filter, true)?) * ratio as f64
            }
            Downsample::After => {
                let filtered = self.ops.fft_conv(values, &self.filter, true)?;
                sum_of_squares(&downsample(&filtered, ratio)?) * ratio as f64
            }
        };
        Ok(power)
    }
}

/// Build the mean-centered, magnitude-normalised filter for `mode`
fn filter_vector(
    filter: Option<&[f64]>,
    mode: Downsample,
    timing: Timing,
    reference_ms: u32,
    ops: &mut SpectralOps,
) -> Result<Vec<f64>, GdsError> {
    let (len, step_ms) = match mode {
        Downsample::Before => (timing.total_points, timing.tr_ms),
        _ => (timing.fine_len(), timing.sampling_ms),
    };
    let mut out = vec![0.0; len];
    match filter {
        Some(kernel) => {
            let fine = ops.sinc_interpolate(kernel, (reference_ms / step_ms) as usize)?;
            let n = fine.len().min(len);
            out[..n].copy_from_slice(&fine[..n]);
        }
        None => out[0] = 1.0,
    }
    mean_center(&mut out);
    Ok(ops.norm_mag(&out))
}

/// Run an efficiency check and choose the covariates to delete
pub fn evaluate(
    query: &EfficiencyQuery,
    covariates: &[Covariate],
    timing: Timing,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<EfficiencyOutcome, GdsError> {
    let mode = query
        .downsample
        .ok_or_else(|| GdsError::Syntax("downsample option not defined".to_string()))?;
    let eff_type = query
        .eff_type
        .ok_or_else(|| GdsError::Syntax("eff-type not defined".to_string()))?;
    let cutoff = query
        .cutoff
        .ok_or_else(|| GdsError::Syntax("eff-cutoff not defined".to_string()))?;

    let reference = config.efficiency_reference_ms;
    if reference % timing.sampling_ms != 0 {
        return Err(GdsError::Semantic(format!(
            "chkeff requires that {} be divided by the current sampling rate ({})",
            reference, timing.sampling_ms
        )));
    }

    let base = covariates
        .get(query.base)
        .ok_or_else(|| GdsError::Semantic("base covariate no longer exists".to_string()))?;
    if !eff_type.matches(base.cov_type) {
        return Err(GdsError::Semantic(format!(
            "base covariate {} does not match the eff-type",
            base.full_name()
        )));
    }

    let mut outcome = EfficiencyOutcome::default();
    let kernel = match &query.filter {
        Some(path) => {
            let kernel = read_ref(path)?;
            if mode == Downsample::Before && reference % timing.tr_ms != 0 {
                return Err(GdsError::Semantic(format!(
                    "\"downsample before convolution\" requires that {} be divided by TR ({})",
                    reference, timing.tr_ms
                )));
            }
            if kernel.len() as u64 * reference as u64 > timing.total_ms() {
                return Err(GdsError::Semantic(format!(
                    "filter file includes too many elements: {}",
                    path.display()
                )));
            }
            Some(kernel)
        }
        None => {
            outcome.warnings.push("filter not defined".to_string());
            None
        }
    };

    let filter = filter_vector(kernel.as_deref(), mode, timing, reference, ops)?;
    let mut evaluator = Evaluator {
        mode,
        timing,
        filter,
        ops,
    };

    if VectorSummary::compute(&base.values).is_constant() {
        return Err(GdsError::Numeric(format!(
            "zero-variance base covariate for efficiency check: {}",
            base.full_name()
        )));
    }
    let base_eff = match evaluator.raw_efficiency(&base.values)? {
        None => {
            return Err(GdsError::Numeric(format!(
                "all elements are zero, invalid base covariate for efficiency check: {}",
                base.full_name()
            )))
        }
        Some(e) if e == 0.0 => {
            return Err(GdsError::Numeric(format!(
                "raw efficiency is zero, invalid base covariate for efficiency check: {}",
                base.full_name()
            )))
        }
        Some(e) => e,
    };
    debug!(base = %base.full_name(), base_eff, "efficiency base");

    for (i, cov) in covariates.iter().enumerate() {
        if i == query.base || !eff_type.matches(cov.cov_type) {
            continue;
        }
        let Some(raw) = evaluator.raw_efficiency(&cov.values)? else {
            outcome.warnings.push(format!(
                "covariate has invalid efficiency value: {}; efficiency check on this covariate skipped",
                cov.full_name()
            ));
            continue;
        };
        let mut relative = raw / base_eff;
        if relative <= EFFICIENCY_FLOOR {
            relative = 0.0;
        }
        if relative < cutoff {
            info!(covariate = %cov.full_name(), efficiency = relative, cutoff, "covariate below efficiency cutoff");
            outcome.deleted.push(i);
        }
    }
    Ok(outcome)
}
