//! Engine Error Types

use matrix_store::StorageError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use vector_ops::VectorError;

/// Error categories reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed arity or unknown keyword
    Syntax,
    /// Directive used outside the section it belongs to
    Context,
    /// Out-of-domain value, unresolved or ambiguous name, non-integer ratio
    Semantic,
    /// Unreadable input or non-writable output
    File,
    /// Degenerate numeric operation
    Numeric,
}

/// Errors raised while processing a directive
#[derive(Debug, Error)]
pub enum GdsError {
    /// Malformed directive
    #[error("{0}")]
    Syntax(String),

    /// Directive outside its legal section
    #[error("{0}")]
    Context(String),

    /// Value or name that cannot be used
    #[error("{0}")]
    Semantic(String),

    /// File problem detected by the engine itself
    #[error("{0}")]
    File(String),

    /// Degenerate numeric result
    #[error("{0}")]
    Numeric(String),

    /// Failure reported by the matrix store
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure reported by a vector operation
    #[error(transparent)]
    Vector(#[from] VectorError),
}

impl GdsError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GdsError::Syntax(_) => ErrorKind::Syntax,
            GdsError::Context(_) => ErrorKind::Context,
            GdsError::Semantic(_) => ErrorKind::Semantic,
            GdsError::File(_) | GdsError::Storage(_) => ErrorKind::File,
            GdsError::Numeric(_) | GdsError::Vector(VectorError::Singular) => ErrorKind::Numeric,
            GdsError::Vector(_) => ErrorKind::Semantic,
        }
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error(ErrorKind),
    Warning,
    Info,
}

/// A message tied to a script location
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Script file the directive came from
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error(_))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error(ErrorKind::Syntax) | Severity::Error(ErrorKind::Context) => "SYNTAX ERROR",
            Severity::Error(_) => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        write!(
            f,
            "GDS {} in {} [line {}]:\n--- {}",
            label,
            self.file.display(),
            self.line,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(GdsError::Syntax("x".into()).kind(), ErrorKind::Syntax);
        assert_eq!(GdsError::from(VectorError::Singular).kind(), ErrorKind::Numeric);
        assert_eq!(GdsError::from(VectorError::OddLength(3)).kind(), ErrorKind::Semantic);
        let io = StorageError::Empty(PathBuf::from("a.ref"));
        assert_eq!(GdsError::from(io).kind(), ErrorKind::File);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic {
            file: PathBuf::from("run.gds"),
            line: 12,
            severity: Severity::Error(ErrorKind::Syntax),
            message: "unknown tag: foo".to_string(),
        };
        assert_eq!(d.to_string(), "GDS SYNTAX ERROR in run.gds [line 12]:\n--- unknown tag: foo");
    }
}
