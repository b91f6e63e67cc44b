//! Design-matrix session

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::condition::ConditionFunction;
use crate::covariate::{find_unique, Covariate};
use crate::error::GdsError;
use crate::params::{SessionParams, Timing};
use crate::section::Section;

/// Where condition labels come from
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSource {
    File(PathBuf),
    Names(Vec<String>),
}

/// One design-matrix unit, opened by `gsession`
#[derive(Debug, Clone)]
pub struct Session {
    /// Path given on the `gsession` line
    pub path: PathBuf,
    /// Output path without the `.G` / `.preG` extension
    pub stem: PathBuf,
    /// Script and line that opened the session
    pub script: PathBuf,
    pub line: usize,
    pub params: SessionParams,
    pub condition: Option<ConditionFunction>,
    pub label_source: Option<LabelSource>,
    /// `mod-condition-label` renames, applied after the label source
    pub label_renames: Vec<(String, String)>,
    pub mean_center_all: bool,
    /// Ordered covariate list; order is the output column order
    pub covariates: Vec<Covariate>,
    pub pending: Option<Section>,
    pub valid: bool,
}

/// Output stem for a `gsession` argument.
///
/// `foo.G` names the stem `foo`; a directory `dir` gives `dir/basename(dir)`.
pub fn output_stem(path: &Path) -> PathBuf {
    if path.extension().map(|e| e == "G").unwrap_or(false) {
        return path.with_extension("");
    }
    match path.file_name() {
        Some(base) => path.join(base),
        None => path.join("session"),
    }
}

impl Session {
    pub fn new(path: &Path, script: &Path, line: usize, default_sampling_ms: u32) -> Self {
        info!(session = %path.display(), "session opened");
        Self {
            path: path.to_path_buf(),
            stem: output_stem(path),
            script: script.to_path_buf(),
            line,
            params: SessionParams::new(default_sampling_ms),
            condition: None,
            label_source: None,
            label_renames: Vec::new(),
            mean_center_all: false,
            covariates: Vec::new(),
            pending: None,
            valid: true,
        }
    }

    /// `.G` output path
    pub fn g_path(&self) -> PathBuf {
        with_suffix(&self.stem, ".G")
    }

    /// `.preG` output path
    pub fn preg_path(&self) -> PathBuf {
        with_suffix(&self.stem, ".preG")
    }

    /// Resolve session timing on first need
    pub fn timing(&mut self) -> Result<Timing, GdsError> {
        self.params.resolve()
    }

    /// Index of the covariate with this full name
    pub fn find(&self, full_name: &str) -> Result<usize, GdsError> {
        find_unique(&self.covariates, full_name)
    }

    /// Condition function with labels applied
    pub fn labelled_condition(&self) -> Result<Option<ConditionFunction>, GdsError> {
        let Some(base) = &self.condition else {
            return Ok(None);
        };
        let mut condition = base.clone();
        match &self.label_source {
            Some(LabelSource::File(path)) => condition.set_labels(matrix_store::read_labels(path)?)?,
            Some(LabelSource::Names(names)) => condition.set_labels(names.clone())?,
            None => {}
        }
        for (old, new) in &self.label_renames {
            condition.rename_label(old, new)?;
        }
        Ok(Some(condition))
    }

    /// Drop all covariates
    pub fn clear_covariates(&mut self) {
        if !self.covariates.is_empty() {
            debug!(count = self.covariates.len(), "covariates cleared");
        }
        self.covariates.clear();
    }

    /// Remove covariates by index; indices may come in any order
    pub fn remove_indices(&mut self, indices: &[usize]) -> Vec<Covariate> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut removed = Vec::with_capacity(sorted.len());
        for &i in sorted.iter().rev() {
            if i < self.covariates.len() {
                removed.push(self.covariates.remove(i));
            }
        }
        removed.reverse();
        removed
    }

    /// Replace `count` covariates starting at `at` with `replacement`
    pub fn splice(&mut self, at: usize, count: usize, replacement: Vec<Covariate>) {
        let end = (at + count).min(self.covariates.len());
        let at = at.min(self.covariates.len());
        self.covariates.splice(at..end, replacement);
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariate::CovType;

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(Path::new("out/run.G")), PathBuf::from("out/run"));
        assert_eq!(output_stem(Path::new("/data/subj01")), PathBuf::from("/data/subj01/subj01"));
        let s = Session::new(Path::new("res/a.G"), Path::new("x.gds"), 1, 100);
        assert_eq!(s.g_path(), PathBuf::from("res/a.G"));
        assert_eq!(s.preg_path(), PathBuf::from("res/a.preG"));
    }

    #[test]
    fn test_splice_and_remove() {
        let mut s = Session::new(Path::new("a.G"), Path::new("x.gds"), 1, 100);
        for name in ["a", "b", "c"] {
            s.covariates.push(Covariate::new(name, CovType::Interest, vec![]));
        }
        s.splice(1, 1, vec![
            Covariate::new("b1", CovType::Interest, vec![]),
            Covariate::new("b2", CovType::Interest, vec![]),
        ]);
        let names: Vec<_> = s.covariates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b1", "b2", "c"]);

        let removed = s.remove_indices(&[3, 0]);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].name, "a");
        let names: Vec<_> = s.covariates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b1", "b2"]);
        assert!(s.find("b1").is_ok());
        assert!(s.find("a").is_err());
    }
}
