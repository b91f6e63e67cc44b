//! Session timing parameters

use matrix_store::ScanHeader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::GdsError;

/// Resolved session timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    /// Repetition time (ms)
    pub tr_ms: u32,
    /// Fine sampling resolution (ms)
    pub sampling_ms: u32,
    /// Number of scan-resolution time points
    pub total_points: usize,
}

impl Timing {
    /// Fine samples per TR
    pub fn ratio(&self) -> usize {
        (self.tr_ms / self.sampling_ms) as usize
    }

    /// Length of every covariate vector
    pub fn fine_len(&self) -> usize {
        self.total_points * self.ratio()
    }

    /// Session duration (ms)
    pub fn total_ms(&self) -> u64 {
        self.total_points as u64 * self.tr_ms as u64
    }
}

/// One declared scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub name: String,
    /// `None` for fake scans declared by name and length
    pub path: Option<PathBuf>,
    /// Number of time points
    pub length: usize,
    /// TR from the scan header
    pub tr_ms: Option<u32>,
}

impl ScanRecord {
    pub fn is_fake(&self) -> bool {
        self.path.is_none()
    }
}

/// Explicit and scan-derived timing, resolved lazily
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub tr_ms: Option<u32>,
    pub sampling_ms: u32,
    pub length: Option<usize>,
    pub scans: Vec<ScanRecord>,
    timing: Option<Timing>,
}

impl SessionParams {
    pub fn new(default_sampling_ms: u32) -> Self {
        Self {
            tr_ms: None,
            sampling_ms: default_sampling_ms,
            length: None,
            scans: Vec::new(),
            timing: None,
        }
    }

    /// Timing, if already resolved
    pub fn timing(&self) -> Option<Timing> {
        self.timing
    }

    /// Forget the resolved timing after a parameter change
    pub fn invalidate(&mut self) {
        self.timing = None;
    }

    /// Declare a scan file; its header supplies TR and length
    pub fn add_scan(&mut self, path: &Path) -> Result<(), GdsError> {
        let header = ScanHeader::read(path)?;
        self.scans.push(ScanRecord {
            name: path.display().to_string(),
            path: Some(path.to_path_buf()),
            length: header.time_points,
            tr_ms: header.tr_ms,
        });
        Ok(())
    }

    /// Declare a scan by name and length only
    pub fn add_fake_scan(&mut self, name: &str, length: usize) {
        self.scans.push(ScanRecord {
            name: name.to_string(),
            path: None,
            length,
            tr_ms: None,
        });
    }

    /// Resolve TR, sampling and length from explicit values and scan headers
    pub fn resolve(&mut self) -> Result<Timing, GdsError> {
        if let Some(timing) = self.timing {
            return Ok(timing);
        }

        let mut scan_tr: Option<u32> = None;
        for scan in &self.scans {
            if let Some(tr) = scan.tr_ms {
                match scan_tr {
                    None => scan_tr = Some(tr),
                    Some(prev) if prev != tr => {
                        return Err(GdsError::Semantic(format!(
                            "different TR found in scan files ({} and {})",
                            prev, tr
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        let tr_ms = match (self.tr_ms, scan_tr) {
            (None, None) => return Err(GdsError::Semantic("TR is not defined".to_string())),
            (Some(tr), None) | (None, Some(tr)) => tr,
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                return Err(GdsError::Semantic(format!(
                    "TR ({}) does not match the scan files ({})",
                    a, b
                )))
            }
        };

        let scan_len = (!self.scans.is_empty()).then(|| self.scans.iter().map(|s| s.length).sum::<usize>());
        let total_points = match (self.length, scan_len) {
            (None, None) => {
                return Err(GdsError::Semantic(
                    "number of time points is not defined".to_string(),
                ))
            }
            (Some(n), None) | (None, Some(n)) => n,
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                return Err(GdsError::Semantic(format!(
                    "length ({}) does not match the scan files ({})",
                    a, b
                )))
            }
        };

        if self.sampling_ms == 0 || tr_ms % self.sampling_ms != 0 {
            return Err(GdsError::Semantic(format!(
                "TR ({}) is not a multiple of the sampling rate ({})",
                tr_ms, self.sampling_ms
            )));
        }
        if total_points == 0 {
            return Err(GdsError::Semantic("session has no time points".to_string()));
        }

        let timing = Timing {
            tr_ms,
            sampling_ms: self.sampling_ms,
            total_points,
        };
        debug!(?timing, "session parameters resolved");
        self.timing = Some(timing);
        Ok(timing)
    }
}
