//! Matrix writer and reader

use chrono::Local;
use matrix_store::{write_labels, write_ref, GHeader, MatrixFile, ParameterInfo};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vector_ops::{downsample, mean_center, upsample, VectorSummary};

use crate::condition::ConditionFunction;
use crate::covariate::{split_full_name, CovType, Covariate};
use crate::error::GdsError;
use crate::params::Timing;

/// Header shared by the `.G` and `.preG` files
pub fn build_header(covariates: &[Covariate], timing: Timing, condition: Option<&ConditionFunction>) -> GHeader {
    GHeader {
        created: Some(GHeader::timestamp(Local::now())),
        tr_ms: Some(timing.tr_ms),
        sampling_ms: Some(timing.sampling_ms),
        condition_file: condition.map(|c| c.path.display().to_string()),
        condition_keys: condition.map(|c| c.labels.clone()).unwrap_or_default(),
        parameters: covariates
            .iter()
            .enumerate()
            .map(|(index, c)| ParameterInfo {
                index,
                kind: c.cov_type.label().to_string(),
                full_name: c.full_name(),
            })
            .collect(),
    }
}

fn center_if_varying(values: &mut [f64], enabled: bool) {
    if enabled && !VectorSummary::compute(values).is_constant() {
        mean_center(values);
    }
}

/// Write `<stem>.G` and `<stem>.preG`, creating the parent directory
pub fn write_matrices(
    g_path: &Path,
    preg_path: &Path,
    covariates: &[Covariate],
    timing: Timing,
    condition: Option<&ConditionFunction>,
    mean_center_all: bool,
) -> Result<(), GdsError> {
    if let Some(parent) = g_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| GdsError::File(format!("cannot create {}: {}", parent.display(), e)))?;
    }

    let header = build_header(covariates, timing, condition).to_lines();
    let mut fine = Vec::with_capacity(covariates.len());
    let mut coarse = Vec::with_capacity(covariates.len());
    for cov in covariates {
        let mut f = cov.values.clone();
        center_if_varying(&mut f, mean_center_all);
        let mut c = downsample(&cov.values, timing.ratio())?;
        center_if_varying(&mut c, mean_center_all);
        fine.push(f);
        coarse.push(c);
    }

    let g = MatrixFile::new(header.clone(), coarse, timing.total_points).map_err(GdsError::Semantic)?;
    let pre = MatrixFile::new(header, fine, timing.fine_len()).map_err(GdsError::Semantic)?;
    g.write(g_path)?;
    pre.write(preg_path)?;
    info!(g = %g_path.display(), columns = covariates.len(), "design matrices written");
    Ok(())
}

/// Covariates and parameters recovered from a G file
#[derive(Debug, Clone)]
pub struct LoadedMatrix {
    pub tr_ms: u32,
    pub sampling_ms: u32,
    pub total_points: usize,
    pub condition_file: Option<PathBuf>,
    pub condition_keys: Vec<String>,
    pub covariates: Vec<Covariate>,
    /// Columns came from the `.preG` companion
    pub from_preg: bool,
    /// Why a `.preG` companion was not used
    pub preg_note: Option<String>,
}

fn preg_companion(g_path: &Path) -> PathBuf {
    g_path.with_extension("preG")
}

/// Reason the preG header cannot stand in for the G file, if any
fn preg_mismatch(g: &GHeader, g_rows: usize, pre: &GHeader, pre_rows: usize, ratio: usize) -> Option<String> {
    if g.tr_ms != pre.tr_ms {
        return Some("different TR in G and preG file".to_string());
    }
    if g.sampling_ms != pre.sampling_ms {
        return Some("different sampling rate in G and preG file".to_string());
    }
    if g.parameters.len() != pre.parameters.len() {
        return Some("different number of columns in G and preG file".to_string());
    }
    if g_rows * ratio != pre_rows {
        return Some("number of rows in preG is not the upsampled number based on G file".to_string());
    }
    if g.condition_file != pre.condition_file || g.condition_keys != pre.condition_keys {
        return Some("different condition information in G and preG file".to_string());
    }
    let same_columns = g
        .parameters
        .iter()
        .zip(pre.parameters.iter())
        .all(|(a, b)| a.full_name == b.full_name && a.kind == b.kind);
    if !same_columns {
        return Some("different covariate names or types in G and preG file".to_string());
    }
    None
}

/// Read a G file, preferring a compatible `.preG` companion
pub fn open_g(path: &Path) -> Result<LoadedMatrix, GdsError> {
    let g = MatrixFile::read(path)?;
    if g.rows() == 0 || g.cols() == 0 {
        return Err(GdsError::Semantic(format!("G matrix file has no data: {}", path.display())));
    }
    let header = GHeader::parse(&g.header);
    if header.parameters.len() != g.cols() {
        return Err(GdsError::Semantic(format!(
            "{}: number of covariates does not match number of columns",
            path.display()
        )));
    }
    let tr_ms = header
        .tr_ms
        .ok_or_else(|| GdsError::Semantic(format!("{}: TR missing from header", path.display())))?;
    let sampling_ms = header.sampling_ms.unwrap_or(tr_ms);
    if sampling_ms == 0 || tr_ms % sampling_ms != 0 {
        return Err(GdsError::Semantic(format!(
            "{}: TR in the header is not a multiple of sampling rate",
            path.display()
        )));
    }
    let ratio = (tr_ms / sampling_ms) as usize;

    let preg_path = preg_companion(path);
    let mut preg_note = None;
    let mut columns = None;
    if preg_path.exists() {
        match MatrixFile::read(&preg_path) {
            Ok(pre) => {
                let pre_header = GHeader::parse(&pre.header);
                match preg_mismatch(&header, g.rows(), &pre_header, pre.rows(), ratio) {
                    None => columns = Some(pre.columns),
                    Some(reason) => preg_note = Some(reason),
                }
            }
            Err(e) => preg_note = Some(e.to_string()),
        }
    }
    let from_preg = columns.is_some();
    let columns = match columns {
        Some(c) => c,
        None => g
            .columns
            .iter()
            .map(|c| upsample(c, ratio))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let covariates = header
        .parameters
        .iter()
        .zip(columns)
        .map(|(p, values)| {
            let (group, name) = split_full_name(&p.full_name);
            let mut cov = Covariate::new(name, CovType::from_label(&p.kind), values);
            cov.group = group;
            cov.intercept = cov.looks_like_intercept();
            cov
        })
        .collect();

    debug!(path = %path.display(), from_preg, "G matrix loaded");
    Ok(LoadedMatrix {
        tr_ms,
        sampling_ms,
        total_points: g.rows(),
        condition_file: header.condition_file.map(PathBuf::from),
        condition_keys: header.condition_keys,
        covariates,
        from_preg,
        preg_note,
    })
}

/// Save one covariate at scan resolution as a REF file
pub fn save_covariate(path: &Path, covariate: &Covariate, timing: Timing) -> Result<(), GdsError> {
    let values = downsample(&covariate.values, timing.ratio())?;
    let comments = vec![
        String::new(),
        "; Single covariate from G matrix".to_string(),
        format!("; Name: {}", covariate.full_name()),
        String::new(),
    ];
    write_ref(path, &values, &comments)?;
    info!(covariate = %covariate.full_name(), path = %path.display(), "covariate saved");
    Ok(())
}

/// Save condition labels
pub fn save_labels(path: &Path, condition: &ConditionFunction) -> Result<(), GdsError> {
    write_labels(path, &condition.labels)?;
    info!(path = %path.display(), labels = condition.labels.len(), "condition labels saved");
    Ok(())
}
