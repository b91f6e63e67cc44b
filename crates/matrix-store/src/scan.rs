//! Scan File Headers

use std::fs;
use std::path::Path;

use crate::StorageError;

/// Timing information from a scan file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHeader {
    /// Repetition time (ms), when the header carries one
    pub tr_ms: Option<u32>,
    /// Number of acquired volumes
    pub time_points: usize,
}

impl ScanHeader {
    /// Read `TR(ms):` and `VoxDims(TXYZ):` / `TimePoints:` from a scan header
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let content = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        let mut tr_ms = None;
        let mut time_points = None;

        for (i, raw) in content.lines().enumerate() {
            let line = raw.trim_start_matches(';').trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let first = value.split_whitespace().next();
            match key.trim() {
                "TR(ms)" => {
                    let tr = first
                        .and_then(|t| t.parse::<f64>().ok())
                        .ok_or_else(|| StorageError::format(path, i + 1, "bad TR value"))?;
                    if tr > 0.0 {
                        tr_ms = Some(tr.round() as u32);
                    }
                }
                "VoxDims(TXYZ)" | "TimePoints" => {
                    let t = first
                        .and_then(|t| t.parse::<usize>().ok())
                        .ok_or_else(|| StorageError::format(path, i + 1, "bad time point count"))?;
                    time_points = Some(t);
                }
                _ => {}
            }
        }

        let time_points = time_points.ok_or_else(|| StorageError::format(path, 0, "no time point count in header"))?;
        Ok(Self { tr_ms, time_points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run1.tes");
        fs::write(&path, "VB98\nTES1\nVoxDims(TXYZ):\t120\t64\t64\t30\nTR(ms):\t2000\n").unwrap();
        let header = ScanHeader::read(&path).unwrap();
        assert_eq!(header, ScanHeader { tr_ms: Some(2000), time_points: 120 });
    }

    #[test]
    fn test_scan_header_without_tr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run2.tes");
        fs::write(&path, "; TimePoints: 80\n").unwrap();
        assert_eq!(ScanHeader::read(&path).unwrap().tr_ms, None);
    }

    #[test]
    fn test_scan_header_without_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run3.tes");
        fs::write(&path, "TR(ms): 2000\n").unwrap();
        assert!(ScanHeader::read(&path).is_err());
    }
}
