//! Simple generators
//!
//! Every generator works at the coarsest resolution its input offers and is
//! brought to the session resolution by an exact integer upsampling ratio.

use matrix_store::{read_columns, read_ref};
use std::path::{Path, PathBuf};
use tracing::debug;
use vector_ops::{exact_ratio, mean_center, upsample};

use crate::condition::ConditionFunction;
use crate::covariate::CovType;
use crate::error::GdsError;
use crate::modifier::Working;
use crate::params::{ScanRecord, Timing};
use crate::section::{GeneratorKind, SectionBody, SpikeSpec};

const MOVE_AXES: [&str; 6] = ["X", "Y", "Z", "pitch", "roll", "yaw"];

/// Values per time point in a movement-parameter file
const MOVE_COLUMNS: usize = 7;

/// Session state a generator may read
pub struct GeneratorInput<'a> {
    pub timing: Timing,
    pub scans: &'a [ScanRecord],
    pub condition: Option<&'a ConditionFunction>,
}

/// Type given to outputs when the section sets none
pub fn default_type(kind: &GeneratorKind) -> CovType {
    match kind {
        GeneratorKind::Intercept(_) => CovType::KeepNoInterest,
        GeneratorKind::Single(_)
        | GeneratorKind::TrialEffect { .. }
        | GeneratorKind::VarTrial(_)
        | GeneratorKind::Diagonal
        | GeneratorKind::Contrast => CovType::Interest,
        GeneratorKind::ScanEffect
        | GeneratorKind::GlobalSignal
        | GeneratorKind::MoveParams
        | GeneratorKind::Spike
        | GeneratorKind::TxtFile(_) => CovType::NoInterest,
        GeneratorKind::Copy { .. } => CovType::Undefined,
    }
}

/// Produce the raw outputs of a generator section
pub fn generate(kind: &GeneratorKind, body: &SectionBody, input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let outputs = match kind {
        GeneratorKind::Single(path) => vec![single(path, input.timing)?],
        GeneratorKind::Intercept(name) => vec![Working {
            name: name.clone().unwrap_or_else(|| "Intercept".to_string()),
            values: vec![1.0; input.timing.fine_len()],
        }],
        GeneratorKind::TrialEffect { seconds } => trial_effect(*seconds, input.timing)?,
        GeneratorKind::VarTrial(path) => var_trial(path, input.timing)?,
        GeneratorKind::Diagonal => diagonal(body, input)?,
        GeneratorKind::Contrast => contrast(body, input)?,
        GeneratorKind::ScanEffect => scan_effect(body, input)?,
        GeneratorKind::GlobalSignal => global_signal(input)?,
        GeneratorKind::MoveParams => move_params(input)?,
        GeneratorKind::Spike => spikes(body, input)?,
        GeneratorKind::TxtFile(path) => txt_columns(path, input.timing)?,
        GeneratorKind::Copy { .. } => {
            return Err(GdsError::Context("cp is not a simple generator".to_string()))
        }
    };
    debug!(generator = kind.keyword(), outputs = outputs.len(), "generator finished");
    Ok(outputs)
}

/// Bring a scan-resolution vector to the session resolution
fn to_fine(values: &[f64], timing: Timing) -> Result<Vec<f64>, GdsError> {
    Ok(upsample(values, timing.ratio())?)
}

/// Block of ones in an otherwise zero vector, mean-centered
fn centered_block(len: usize, start: usize, width: usize) -> Vec<f64> {
    let mut values = vec![0.0; len];
    for v in values.iter_mut().skip(start).take(width) {
        *v = 1.0;
    }
    mean_center(&mut values);
    values
}

/// Milliseconds to whole fine ticks
fn ms_to_ticks(ms: f64, timing: Timing, what: &str) -> Result<usize, GdsError> {
    let ticks = ms / timing.sampling_ms as f64;
    if ticks < 0.0 || (ticks - ticks.round()).abs() > 1e-9 {
        return Err(GdsError::Semantic(format!(
            "{} ({} ms) is not a multiple of the sampling rate ({})",
            what, ms, timing.sampling_ms
        )));
    }
    Ok(ticks.round() as usize)
}

fn single(path: &Path, timing: Timing) -> Result<Working, GdsError> {
    let values = read_ref(path)?;
    let total = timing.total_points;
    if values.len() % total != 0 {
        return Err(GdsError::Semantic(format!(
            "number of elements ({}) in {} is not a multiple of the total length ({})",
            values.len(),
            path.display(),
            total
        )));
    }
    let per_tr = values.len() / total;
    let up = exact_ratio(timing.ratio(), per_tr).ok_or_else(|| {
        GdsError::Semantic(format!(
            "{} with a length of {} cannot be upsampled at the current sampling rate ({})",
            path.display(),
            values.len(),
            timing.sampling_ms
        ))
    })?;
    Ok(Working {
        name: "undefined".to_string(),
        values: upsample(&values, up)?,
    })
}

fn trial_effect(seconds: f64, timing: Timing) -> Result<Vec<Working>, GdsError> {
    let width = ms_to_ticks(seconds * 1000.0, timing, "trial length")?;
    if width == 0 {
        return Err(GdsError::Semantic("trial length must be positive".to_string()));
    }
    let len = timing.fine_len();
    let trials = len / width;
    if trials < 2 {
        return Err(GdsError::Semantic(format!(
            "trial length {} s leaves no trial effects in the session",
            seconds
        )));
    }
    Ok((0..trials - 1)
        .map(|i| Working {
            name: format!("trialfx-{}", i + 1),
            values: centered_block(len, i * width, width),
        })
        .collect())
}

fn var_trial(path: &Path, timing: Timing) -> Result<Vec<Working>, GdsError> {
    let widths = read_ref(path)?;
    let total_s: f64 = widths.iter().sum();
    if (total_s * 1000.0 - timing.total_ms() as f64).abs() > 1e-6 {
        return Err(GdsError::Semantic(format!(
            "sum of elements ({}) in {} does not match the actual length ({} s)",
            total_s,
            path.display(),
            timing.total_ms() as f64 / 1000.0
        )));
    }

    let len = timing.fine_len();
    let mut offset = 0;
    let mut outputs = Vec::with_capacity(widths.len().saturating_sub(1));
    for (i, w) in widths.iter().take(widths.len().saturating_sub(1)).enumerate() {
        let width = ms_to_ticks(w * 1000.0, timing, "trial length")?;
        outputs.push(Working {
            name: format!("var-trialfx-{}", i + 1),
            values: centered_block(len, offset, width),
        });
        offset += width;
    }
    Ok(outputs)
}

fn require_condition<'a>(input: &GeneratorInput<'a>) -> Result<&'a ConditionFunction, GdsError> {
    input
        .condition
        .ok_or_else(|| GdsError::Semantic("condition function not defined".to_string()))
}

/// Weighted condition indicator, optionally occupancy-scaled and centered
fn weighted_indicator(codes: &[usize], weights: &[f64], scale: bool, center: bool) -> Vec<f64> {
    let mut counts = vec![0usize; weights.len()];
    for &c in codes {
        counts[c] += 1;
    }
    let mut values: Vec<f64> = codes
        .iter()
        .map(|&c| {
            let w = weights[c];
            if scale && counts[c] > 0 {
                w / counts[c] as f64
            } else {
                w
            }
        })
        .collect();
    if center {
        mean_center(&mut values);
    }
    values
}

fn diagonal(body: &SectionBody, input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let condition = require_condition(input)?;
    let keys = condition.key_count();
    if keys < 2 {
        return Err(GdsError::Semantic(
            "diagonal set needs a condition function with at least two keys".to_string(),
        ));
    }
    let codes = condition.fine_codes(&input.timing)?;
    let scale = body.scale.unwrap_or(false);
    let center = body.center.unwrap_or(true);
    Ok((1..keys)
        .map(|k| {
            let mut weights = vec![0.0; keys];
            weights[k] = 1.0;
            Working {
                name: condition.labels[k].clone(),
                values: weighted_indicator(&codes, &weights, scale, center),
            }
        })
        .collect())
}

fn contrast(body: &SectionBody, input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let condition = require_condition(input)?;
    if body.matrix_rows.is_empty() {
        return Err(GdsError::Syntax("contrast section has no matrix-row lines".to_string()));
    }
    let keys = condition.key_count();
    let codes = condition.fine_codes(&input.timing)?;
    let scale = body.scale.unwrap_or(true);
    let center = body.center.unwrap_or(true);

    body.matrix_rows
        .iter()
        .map(|row| {
            if row.len() != keys {
                return Err(GdsError::Semantic(format!(
                    "matrix-row has {} values for {} condition keys",
                    row.len(),
                    keys
                )));
            }
            let terms: Vec<String> = row
                .iter()
                .zip(condition.labels.iter())
                .filter(|(w, _)| **w != 0.0)
                .map(|(w, label)| format!("{:.2}*{}", w, label))
                .collect();
            Ok(Working {
                name: format!("contrast/{}", terms.join("+")),
                values: weighted_indicator(&codes, row, scale, center),
            })
        })
        .collect()
}

fn scan_effect(body: &SectionBody, input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let lengths: Vec<usize> = match &body.scan_lengths {
        Some(lengths) => {
            let sum: usize = lengths.iter().sum();
            if sum != input.timing.total_points {
                return Err(GdsError::Semantic(format!(
                    "sum of scan-length values ({}) does not match the total length ({})",
                    sum, input.timing.total_points
                )));
            }
            lengths.clone()
        }
        None => input.scans.iter().map(|s| s.length).collect(),
    };
    if lengths.len() < 2 {
        return Err(GdsError::Semantic(
            "scan-effect needs at least two scan segments".to_string(),
        ));
    }

    let ratio = input.timing.ratio();
    let len = input.timing.fine_len();
    let mut offset = 0;
    let mut outputs = Vec::with_capacity(lengths.len() - 1);
    for (i, l) in lengths.iter().take(lengths.len() - 1).enumerate() {
        outputs.push(Working {
            name: format!("scanfx-{}", i + 1),
            values: centered_block(len, offset, l * ratio),
        });
        offset += l * ratio;
    }
    Ok(outputs)
}

/// Companion file next to a scan: extension replaced by `suffix`
fn companion(scan: &ScanRecord, suffix: &str) -> Result<PathBuf, GdsError> {
    let path = scan.path.as_ref().ok_or_else(|| {
        GdsError::Semantic(format!("scan {} has no file to locate companion data", scan.name))
    })?;
    let text = path.to_string_lossy();
    let stem = text
        .char_indices()
        .rev()
        .nth(3)
        .map(|(i, _)| &text[..i])
        .unwrap_or("");
    Ok(PathBuf::from(format!("{}{}", stem, suffix)))
}

fn require_scans<'a>(input: &GeneratorInput<'a>, what: &str) -> Result<&'a [ScanRecord], GdsError> {
    if input.scans.is_empty() {
        return Err(GdsError::Semantic(format!("{} requires scan files", what)));
    }
    if let Some(fake) = input.scans.iter().find(|s| s.is_fake()) {
        return Err(GdsError::Semantic(format!(
            "{} cannot be used with fake scan {}",
            what, fake.name
        )));
    }
    Ok(input.scans)
}

fn place_segment(series: &[f64], offset: usize, timing: Timing) -> Result<Vec<f64>, GdsError> {
    let mut coarse = vec![0.0; timing.total_points];
    let mut centered = series.to_vec();
    mean_center(&mut centered);
    coarse[offset..offset + centered.len()].copy_from_slice(&centered);
    to_fine(&coarse, timing)
}

fn check_segment(len: usize, scan: &ScanRecord, path: &Path) -> Result<(), GdsError> {
    if len != scan.length {
        return Err(GdsError::Semantic(format!(
            "{} holds {} time points but scan {} has {}",
            path.display(),
            len,
            scan.name,
            scan.length
        )));
    }
    Ok(())
}

fn global_signal(input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let scans = require_scans(input, "global-signal")?;
    let mut offset = 0;
    let mut outputs = Vec::with_capacity(scans.len());
    for (i, scan) in scans.iter().enumerate() {
        let path = companion(scan, "_GS.ref")?;
        let series = read_ref(&path)?;
        check_segment(series.len(), scan, &path)?;
        outputs.push(Working {
            name: format!("global-signal-{}", i + 1),
            values: place_segment(&series, offset, input.timing)?,
        });
        offset += scan.length;
    }
    Ok(outputs)
}

fn move_params(input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let scans = require_scans(input, "move-params")?;
    let mut offset = 0;
    let mut outputs = Vec::with_capacity(scans.len() * MOVE_AXES.len());
    for (i, scan) in scans.iter().enumerate() {
        let path = companion(scan, "_MoveParams.ref")?;
        let flat = read_ref(&path)?;
        if flat.len() % MOVE_COLUMNS != 0 {
            return Err(GdsError::Semantic(format!(
                "number of elements ({}) in movement parameter file {} is not a multiple of {}",
                flat.len(),
                path.display(),
                MOVE_COLUMNS
            )));
        }
        let points = flat.len() / MOVE_COLUMNS;
        check_segment(points, scan, &path)?;
        for (axis, label) in MOVE_AXES.iter().enumerate() {
            let series: Vec<f64> = flat.iter().skip(axis).step_by(MOVE_COLUMNS).copied().collect();
            outputs.push(Working {
                name: format!("move-params-{}-{}", i + 1, label),
                values: place_segment(&series, offset, input.timing)?,
            });
        }
        offset += scan.length;
    }
    Ok(outputs)
}

/// Scan index for a `relative` line: a declared scan name, else an index
fn resolve_scan(scans: &[ScanRecord], token: &str) -> Result<usize, GdsError> {
    if let Some(i) = scans.iter().position(|s| s.name == token) {
        return Ok(i);
    }
    token
        .parse::<usize>()
        .ok()
        .filter(|&i| i < scans.len())
        .ok_or_else(|| GdsError::Semantic(format!("scan not found: {}", token)))
}

/// Absolute spike positions, validated against their ranges
pub fn spike_positions(specs: &[SpikeSpec], scans: &[ScanRecord], total: usize) -> Result<Vec<usize>, GdsError> {
    let mut positions = Vec::new();
    for spec in specs {
        match spec {
            SpikeSpec::Absolute(list) => {
                for &p in list {
                    if p >= total {
                        return Err(GdsError::Semantic(format!("spike index out of range: {}", p)));
                    }
                    positions.push(p);
                }
            }
            SpikeSpec::Relative { scan, positions: list } => {
                let index = resolve_scan(scans, scan)?;
                let start: usize = scans[..index].iter().map(|s| s.length).sum();
                for &p in list {
                    if p >= scans[index].length {
                        return Err(GdsError::Semantic(format!("spike index out of range: {}", p)));
                    }
                    positions.push(start + p);
                }
            }
        }
    }
    Ok(positions)
}

fn spikes(body: &SectionBody, input: &GeneratorInput<'_>) -> Result<Vec<Working>, GdsError> {
    let positions = spike_positions(&body.spikes, input.scans, input.timing.total_points)?;
    if positions.is_empty() {
        return Err(GdsError::Syntax("no spike positions defined".to_string()));
    }
    positions
        .into_iter()
        .map(|p| {
            let mut coarse = vec![0.0; input.timing.total_points];
            coarse[p] = 1.0;
            mean_center(&mut coarse);
            Ok(Working {
                name: format!("spike-{}", p),
                values: to_fine(&coarse, input.timing)?,
            })
        })
        .collect()
}

/// One covariate per column of a text table with one row per time point
fn txt_columns(path: &Path, timing: Timing) -> Result<Vec<Working>, GdsError> {
    let rows = read_columns(path)?;
    if rows.len() != timing.total_points {
        return Err(GdsError::Semantic(format!(
            "the number of rows in {} ({}) does not match the total number of time points ({})",
            path.display(),
            rows.len(),
            timing.total_points
        )));
    }
    let width = rows.first().map(Vec::len).unwrap_or(0);
    (0..width)
        .map(|c| {
            let column: Vec<f64> = rows.iter().map(|r| r[c]).collect();
            Ok(Working {
                name: format!("txtVar-{}", c + 1),
                values: to_fine(&column, timing)?,
            })
        })
        .collect()
}
