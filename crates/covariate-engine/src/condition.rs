//! Condition function loader

use matrix_store::{read_text, TextFile};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::GdsError;
use crate::params::Timing;

/// Categorical timing vector with ordered key labels
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionFunction {
    /// File the function was read from
    pub path: PathBuf,
    /// Keys in index order; key 0 is the baseline
    pub keys: Vec<String>,
    /// Display labels, one per key (defaults to the keys)
    pub labels: Vec<String>,
    /// Key index per sample, at the file's own resolution
    pub codes: Vec<usize>,
}

fn is_baseline(key: &str) -> bool {
    key == "0" || key == "baseline"
}

impl ConditionFunction {
    /// Read a condition file
    pub fn load(path: &Path) -> Result<Self, GdsError> {
        let text = read_text(path)?;
        Self::from_text(path, &text)
    }

    fn from_text(path: &Path, text: &TextFile) -> Result<Self, GdsError> {
        let values: Vec<&str> = text.rows.iter().map(|(_, row)| row.as_str()).collect();
        if values.is_empty() {
            return Err(GdsError::Semantic(format!("empty condition function: {}", path.display())));
        }

        let header_keys = header_keys(&text.comments);
        let mut content_keys = content_keys(&values);

        let keys = if header_keys.is_empty() {
            sort_keys(&mut content_keys);
            content_keys
        } else if header_keys.len() != content_keys.len() {
            return Err(GdsError::Semantic(format!(
                "condition function {} declares {} keys in its header but uses {}",
                path.display(),
                header_keys.len(),
                content_keys.len()
            )));
        } else if header_keys.iter().any(|k| !content_keys.contains(k)) {
            return Err(GdsError::Semantic(format!(
                "condition function {} header keys do not match its content",
                path.display()
            )));
        } else {
            header_keys
        };

        let codes = values
            .iter()
            .map(|v| keys.iter().position(|k| k == v).unwrap_or(0))
            .collect();

        debug!(path = %path.display(), keys = keys.len(), samples = values.len(), "condition function loaded");
        Ok(Self {
            path: path.to_path_buf(),
            labels: keys.clone(),
            keys,
            codes,
        })
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Key index per fine-resolution sample
    pub fn fine_codes(&self, timing: &Timing) -> Result<Vec<usize>, GdsError> {
        let len = self.codes.len();
        let total = timing.total_points;
        if total == 0 || len % total != 0 {
            return Err(GdsError::Semantic(format!(
                "condition function length {} is not a multiple of the number of time points ({})",
                len, total
            )));
        }
        let per_tr = len / total;
        let ratio = timing.ratio();
        if ratio % per_tr != 0 {
            return Err(GdsError::Semantic(format!(
                "condition function resolution ({} samples per TR) does not divide TR/sampling ({})",
                per_tr, ratio
            )));
        }
        let up = ratio / per_tr;
        Ok(self
            .codes
            .iter()
            .flat_map(|&c| std::iter::repeat(c).take(up))
            .collect())
    }

    /// Replace all labels; the count must match the keys
    pub fn set_labels(&mut self, labels: Vec<String>) -> Result<(), GdsError> {
        if labels.len() != self.keys.len() {
            return Err(GdsError::Semantic(format!(
                "{} condition labels given for {} condition keys",
                labels.len(),
                self.keys.len()
            )));
        }
        self.labels = labels;
        Ok(())
    }

    /// Rename one label
    pub fn rename_label(&mut self, old: &str, new: &str) -> Result<(), GdsError> {
        let slot = self
            .labels
            .iter_mut()
            .find(|l| l.as_str() == old)
            .ok_or_else(|| GdsError::Semantic(format!("condition label not found: {}", old)))?;
        *slot = new.to_string();
        Ok(())
    }
}

/// Keys declared as `; condition: <label>` comment lines
fn header_keys(comments: &[String]) -> Vec<String> {
    comments
        .iter()
        .filter_map(|line| {
            let body = line.get(1..)?.trim();
            let tag = body.get(..10)?;
            if tag.eq_ignore_ascii_case("condition:") {
                Some(body[10..].split_whitespace().collect::<Vec<_>>().join(" "))
            } else {
                None
            }
        })
        .filter(|k| !k.is_empty())
        .collect()
}

/// Baseline (or first value) first, then unique keys in order of appearance
fn content_keys(values: &[&str]) -> Vec<String> {
    let first = values
        .iter()
        .find(|v| is_baseline(v))
        .copied()
        .unwrap_or(values[0]);
    let mut keys = vec![first.to_string()];
    for v in values {
        if !keys.iter().any(|k| k == v) {
            keys.push(v.to_string());
        }
    }
    keys
}

fn sort_keys(keys: &mut Vec<String>) {
    if keys.first().map(|k| is_baseline(k)).unwrap_or(false) {
        keys[1..].sort();
    } else {
        keys.sort();
    }
}
