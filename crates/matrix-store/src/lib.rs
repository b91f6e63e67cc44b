//! Matrix Store
//!
//! File formats consumed and produced by the design-matrix builder: REF vector
//! files, whitespace-delimited text columns, scan headers and the headered
//! column matrices written as `.G` (scan resolution) and `.preG` (fine resolution).

mod header;
mod matrix;
mod ref_file;
mod scan;

pub use header::{GHeader, ParameterInfo};
pub use matrix::MatrixFile;
pub use ref_file::{read_columns, read_labels, read_ref, read_text, write_labels, write_ref, TextFile};
pub use scan::ScanHeader;

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// File could not be opened, read or written
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content does not follow the expected layout
    #[error("invalid file format in {} [line {line}]: {reason}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// File holds no data lines
    #[error("no data found in {}", .0.display())]
    Empty(PathBuf),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
