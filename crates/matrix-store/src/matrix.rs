//! Headered Column Matrix Files

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::StorageError;

/// A column matrix together with its free-form header lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixFile {
    /// Header lines, without the `; ` framing
    pub header: Vec<String>,
    /// Columns, all of equal length
    pub columns: Vec<Vec<f64>>,
    rows: usize,
}

impl MatrixFile {
    /// Build a matrix; every column must have `rows` samples
    pub fn new(header: Vec<String>, columns: Vec<Vec<f64>>, rows: usize) -> Result<Self, String> {
        if let Some(bad) = columns.iter().position(|c| c.len() != rows) {
            return Err(format!(
                "column {} has {} rows, expected {}",
                bad,
                columns[bad].len(),
                rows
            ));
        }
        Ok(Self {
            header,
            columns,
            rows,
        })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    /// Write the matrix as text
    pub fn write(&self, path: &Path) -> Result<(), StorageError> {
        let file = fs::File::create(path).map_err(|e| StorageError::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out).map_err(|e| StorageError::io(path, e))?;
        info!(path = %path.display(), rows = self.rows, cols = self.cols(), "matrix written");
        Ok(())
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, ";VB98")?;
        writeln!(out, ";MAT1")?;
        writeln!(out, ";DataType:\tDouble")?;
        writeln!(out, ";VoxDims(XY):\t{}\t{}", self.cols(), self.rows)?;
        for line in &self.header {
            if line.is_empty() {
                writeln!(out, ";")?;
            } else {
                writeln!(out, "; {}", line)?;
            }
        }
        for r in 0..self.rows {
            let row: Vec<String> = self.columns.iter().map(|c| c[r].to_string()).collect();
            writeln!(out, "{}", row.join("\t"))?;
        }
        out.flush()
    }

    /// Read a matrix written by [`MatrixFile::write`]
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let content = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        let mut lines = content.lines().enumerate();

        for magic in [";VB98", ";MAT1"] {
            match lines.next() {
                Some((_, l)) if l.trim_end() == magic => {}
                Some((i, _)) => return Err(StorageError::format(path, i + 1, format!("expected {}", magic))),
                None => return Err(StorageError::Empty(path.to_path_buf())),
            }
        }

        let mut header = Vec::new();
        let mut dims: Option<(usize, usize)> = None;
        let mut data: Vec<Vec<f64>> = Vec::new();

        for (i, raw) in lines {
            let line = raw.trim_end_matches(['\r', '\n']);
            if let Some(rest) = line.strip_prefix(";VoxDims(XY):") {
                let nums: Vec<usize> = rest.split_whitespace().filter_map(|t| t.parse().ok()).collect();
                if nums.len() != 2 {
                    return Err(StorageError::format(path, i + 1, "bad VoxDims line"));
                }
                dims = Some((nums[0], nums[1]));
            } else if line.starts_with(";DataType:") {
                continue;
            } else if let Some(rest) = line.strip_prefix(';') {
                header.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            } else if line.trim().is_empty() {
                continue;
            } else {
                let row = line
                    .split('\t')
                    .map(|t| t.trim().parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|_| StorageError::format(path, i + 1, "non-numeric matrix value"))?;
                data.push(row);
            }
        }

        let (cols, rows) = dims.ok_or_else(|| StorageError::format(path, 0, "missing VoxDims line"))?;
        if data.len() != rows {
            return Err(StorageError::format(
                path,
                0,
                format!("expected {} rows, found {}", rows, data.len()),
            ));
        }

        let mut columns = vec![Vec::with_capacity(rows); cols];
        for (r, row) in data.iter().enumerate() {
            if row.len() != cols {
                return Err(StorageError::format(
                    path,
                    0,
                    format!("row {} has {} values, expected {}", r, row.len(), cols),
                ));
            }
            for (c, v) in row.iter().enumerate() {
                columns[c].push(*v);
            }
        }

        debug!(path = %path.display(), rows, cols, "matrix read");
        Ok(Self {
            header,
            columns,
            rows,
        })
    }
}
