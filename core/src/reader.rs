//! Readers that turn trigger documents on disk into raw table rows.
//!
//! Search pipelines write their output as documents holding several
//! metadata tables.  This module provides a [`TableReader`] trait so the
//! tables can be sourced from any container format, and one concrete
//! backend, [`JsonTableReader`], for documents of the form
//!
//! ```json
//! { "process": [ {...} ], "sngl_inspiral": [ {...}, {...} ] }
//! ```
//!
//! Rows leave the reader untyped; [`crate::table::MetaDataTable`]
//! validates them against the schema of the table being built.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;

use crate::types::TableType;

/// One untyped row: column name to scalar value.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while locating or reading trigger documents.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document {}: {}", .path.display(), .source)]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid file pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no files match '{0}'")]
    NoMatchingFiles(String),

    #[error("{}: {}", .path.display(), .reason)]
    NotADocument { path: PathBuf, reason: String },

    #[error("{}: column '{}' of {} row {} is not a scalar", .path.display(), .column, .table, .row)]
    NonScalarValue {
        path: PathBuf,
        table: TableType,
        row: usize,
        column: String,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Source of metadata-table rows.
///
/// Implement this trait to read tables from a new file format.
pub trait TableReader {
    /// Return every row of `table` found in the files matching `pattern`,
    /// in file order and then row order.
    fn read_table(&self, pattern: &str, table: TableType) -> Result<Vec<RawRow>, ReaderError>;
}

// ---------------------------------------------------------------------------
// Pattern resolution
// ---------------------------------------------------------------------------

/// Expand a file pattern into the list of files it names.
///
/// A pattern naming an existing file is returned as-is.  Otherwise the
/// final path component is treated as a regular expression that must
/// match a whole file name in the parent directory; matches are returned
/// sorted by name.
pub fn resolve_pattern(pattern: &str) -> Result<Vec<PathBuf>, ReaderError> {
    let path = Path::new(pattern);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReaderError::NoMatchingFiles(pattern.to_string()))?;

    let re = Regex::new(&format!("^(?:{})$", name)).map_err(|source| ReaderError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    if !dir.is_dir() {
        return Err(ReaderError::NoMatchingFiles(pattern.to_string()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(file_name) = entry.file_name().to_str() {
            if re.is_match(file_name) {
                files.push(entry.path());
            }
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ReaderError::NoMatchingFiles(pattern.to_string()));
    }
    debug!("Pattern '{}' matched {} file(s)", pattern, files.len());
    Ok(files)
}

// ---------------------------------------------------------------------------
// JSON document reader
// ---------------------------------------------------------------------------

/// Reader for JSON trigger documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonTableReader;

impl JsonTableReader {
    fn read_document(path: &Path, table: TableType) -> Result<Vec<RawRow>, ReaderError> {
        let text = fs::read_to_string(path)?;
        let doc: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| ReaderError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let tables = doc.as_object().ok_or_else(|| ReaderError::NotADocument {
            path: path.to_path_buf(),
            reason: "top level is not an object".into(),
        })?;

        let rows = match tables.get(table.as_str()) {
            Some(serde_json::Value::Array(rows)) => rows,
            Some(_) => {
                return Err(ReaderError::NotADocument {
                    path: path.to_path_buf(),
                    reason: format!("table '{}' is not an array", table),
                })
            }
            None => {
                warn!("{} has no {} table", path.display(), table);
                return Ok(Vec::new());
            }
        };

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let row = row.as_object().ok_or_else(|| ReaderError::NotADocument {
                    path: path.to_path_buf(),
                    reason: format!("{} row {} is not an object", table, i),
                })?;
                if let Some((column, _)) = row
                    .iter()
                    .find(|(_, v)| !(v.is_number() || v.is_string()))
                {
                    return Err(ReaderError::NonScalarValue {
                        path: path.to_path_buf(),
                        table,
                        row: i,
                        column: column.clone(),
                    });
                }
                Ok(row.clone())
            })
            .collect()
    }
}

impl TableReader for JsonTableReader {
    fn read_table(&self, pattern: &str, table: TableType) -> Result<Vec<RawRow>, ReaderError> {
        let mut rows = Vec::new();
        for path in resolve_pattern(pattern)? {
            let found = Self::read_document(&path, table)?;
            debug!("{}: {} {} row(s)", path.display(), found.len(), table);
            rows.extend(found);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    /// A scratch directory unique to one test.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "inspiral-core-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn existing_path_is_used_verbatim() {
        let dir = scratch_dir("verbatim");
        let file = dir.join("H1-INSPIRAL.json");
        fs::write(&file, json!({ "sngl_inspiral": [] }).to_string()).unwrap();

        let files = resolve_pattern(file.to_str().unwrap()).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn pattern_matches_whole_file_names_in_order() {
        let dir = scratch_dir("pattern");
        for name in ["L1-INSPIRAL-2.json", "H1-INSPIRAL-1.json", "H1-TMPLTBANK.json"] {
            fs::write(dir.join(name), "{}").unwrap();
        }

        let pattern = dir.join(".*-INSPIRAL-.*\\.json");
        let files = resolve_pattern(pattern.to_str().unwrap()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["H1-INSPIRAL-1.json", "L1-INSPIRAL-2.json"]);

        let none = dir.join("V1-.*");
        assert_matches!(
            resolve_pattern(none.to_str().unwrap()),
            Err(ReaderError::NoMatchingFiles(_))
        );
        let bad = dir.join("H1-(");
        assert_matches!(
            resolve_pattern(bad.to_str().unwrap()),
            Err(ReaderError::BadPattern { .. })
        );
    }

    #[test]
    fn rows_are_concatenated_across_files() {
        let dir = scratch_dir("concat");
        fs::write(
            dir.join("a.json"),
            json!({ "sngl_inspiral": [ { "ifo": "H1", "snr": 5.0 } ] }).to_string(),
        )
        .unwrap();
        fs::write(
            dir.join("b.json"),
            json!({
                "process": [ { "program": "inspiral" } ],
                "sngl_inspiral": [ { "ifo": "L1", "snr": 4.0 }, { "ifo": "H2", "snr": 3.0 } ],
            })
            .to_string(),
        )
        .unwrap();
        fs::write(dir.join("c.json"), json!({ "process": [] }).to_string()).unwrap();

        let pattern = dir.join(".*\\.json");
        let rows = JsonTableReader
            .read_table(pattern.to_str().unwrap(), TableType::SnglInspiral)
            .unwrap();
        let ifos: Vec<_> = rows.iter().map(|r| r["ifo"].as_str().unwrap()).collect();
        assert_eq!(ifos, vec!["H1", "L1", "H2"]);
    }

    #[test]
    fn nested_values_are_rejected() {
        let dir = scratch_dir("nested");
        let file = dir.join("bad.json");
        fs::write(
            &file,
            json!({ "sngl_inspiral": [ { "ifo": "H1", "snr": [5.0] } ] }).to_string(),
        )
        .unwrap();

        let err = JsonTableReader
            .read_table(file.to_str().unwrap(), TableType::SnglInspiral)
            .unwrap_err();
        assert_matches!(
            err,
            ReaderError::NonScalarValue { row: 0, ref column, .. } if column == "snr"
        );
    }
}
