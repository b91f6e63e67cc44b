//! REF Vector and Text Column Files

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::StorageError;

/// A text file split into comment and data lines
#[derive(Debug, Clone, Default)]
pub struct TextFile {
    /// Comment lines, comment character included
    pub comments: Vec<String>,
    /// Data lines with surrounding whitespace removed, paired with their 1-based line number
    pub rows: Vec<(usize, String)>,
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || matches!(trimmed.as_bytes()[0], b';' | b'#' | b'%')
}

/// Read a text file, separating comments (`;`, `#`, `%`, blank) from data lines
pub fn read_text(path: &Path) -> Result<TextFile, StorageError> {
    let content = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    let mut file = TextFile::default();
    for (idx, line) in content.lines().enumerate() {
        if is_comment(line) {
            file.comments.push(line.trim_end().to_string());
        } else {
            file.rows.push((idx + 1, line.trim().to_string()));
        }
    }
    Ok(file)
}

/// Read a REF vector: the first token of every data line is one sample
pub fn read_ref(path: &Path) -> Result<Vec<f64>, StorageError> {
    let text = read_text(path)?;
    let mut values = Vec::with_capacity(text.rows.len());
    for (line, row) in &text.rows {
        let token = row.split_whitespace().next().unwrap_or_default();
        let value = token
            .parse::<f64>()
            .map_err(|_| StorageError::format(path, *line, format!("not a number: {}", token)))?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(StorageError::Empty(path.to_path_buf()));
    }
    debug!(path = %path.display(), samples = values.len(), "read ref vector");
    Ok(values)
}

/// Read a whitespace-delimited numeric table; every row must have the same width
pub fn read_columns(path: &Path) -> Result<Vec<Vec<f64>>, StorageError> {
    let text = read_text(path)?;
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(text.rows.len());
    for (line, row) in &text.rows {
        let values = row
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| StorageError::format(path, *line, "non-numeric value"))?;
        if let Some(first) = rows.first() {
            if first.len() != values.len() {
                return Err(StorageError::format(
                    path,
                    *line,
                    format!("expected {} columns, found {}", first.len(), values.len()),
                ));
            }
        }
        rows.push(values);
    }
    if rows.is_empty() {
        return Err(StorageError::Empty(path.to_path_buf()));
    }
    Ok(rows)
}

/// Read one label per data line (first token)
pub fn read_labels(path: &Path) -> Result<Vec<String>, StorageError> {
    let text = read_text(path)?;
    Ok(text
        .rows
        .iter()
        .filter_map(|(_, row)| row.split_whitespace().next().map(str::to_string))
        .collect())
}

/// Write a REF vector with optional extra comment lines
pub fn write_ref(path: &Path, values: &[f64], comments: &[String]) -> Result<(), StorageError> {
    let file = fs::File::create(path).map_err(|e| StorageError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let write = |out: &mut BufWriter<fs::File>| -> std::io::Result<()> {
        writeln!(out, ";VB98")?;
        writeln!(out, ";REF1")?;
        for comment in comments {
            writeln!(out, ";{}", comment)?;
        }
        for v in values {
            writeln!(out, "{:.6}", v)?;
        }
        out.flush()
    };
    write(&mut out).map_err(|e| StorageError::io(path, e))?;
    debug!(path = %path.display(), samples = values.len(), "wrote ref vector");
    Ok(())
}

/// Write a label list in the TXT1 layout
pub fn write_labels(path: &Path, labels: &[String]) -> Result<(), StorageError> {
    let mut content = String::from(";VB98\n;TXT1\n\n");
    for label in labels {
        content.push_str(label);
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| StorageError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_roundtrip_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.ref");
        write_ref(&path, &[0.0, 0.25, 1.5], &[";; demo".to_string()]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(";VB98\n;REF1\n;;; demo\n"));
        assert_eq!(read_ref(&path).unwrap(), vec![0.0, 0.25, 1.5]);
    }

    #[test]
    fn test_ref_skips_comment_styles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.ref");
        fs::write(&path, "# hash\n% percent\n; semi\n\n1\n  2  trailing\n").unwrap();
        assert_eq!(read_ref(&path).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_ref_bad_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ref");
        fs::write(&path, "1\nabc\n").unwrap();
        match read_ref(&path) {
            Err(StorageError::Format { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = read_ref(Path::new("/nonexistent/file.ref")).unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_columns_must_be_rectangular() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        fs::write(&path, "1 2 3\n4 5\n").unwrap();
        assert!(read_columns(&path).is_err());
        fs::write(&path, "; header\n1 2 3\n4 5 6\n").unwrap();
        assert_eq!(read_columns(&path).unwrap(), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_labels_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        let labels = vec!["rest".to_string(), "tap".to_string()];
        write_labels(&path, &labels).unwrap();
        assert_eq!(read_labels(&path).unwrap(), labels);
    }
}
