//! JSON Lines (JSONL) helpers.
//!
//! - [`JsonlRecords`] lazily reads one [`Record`] per non-blank line and is the
//!   stream behind [`extractors::jsonl`](crate::extractors::jsonl).
//! - [`write_jsonl_vec`] writes any serializable slice as JSONL; the test
//!   fixtures use it to lay down source files.
//!
//! Empty and whitespace-only lines are skipped on read. Errors carry the
//! 1-based line number and the file path.

use crate::record::Record;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

/// Lazy iterator over the records of one JSONL file.
#[derive(Debug)]
pub struct JsonlRecords {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonlRecords {
    /// Open `path` for reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path,
            lines: BufReader::new(f).lines(),
            line_no: 0,
        })
    }
}

impl Iterator for JsonlRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let n = self.line_no;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(
                        Err(e).with_context(|| format!("read line {n} in {}", self.path.display())),
                    );
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str::<serde_json::Value>(&line)
                    .map_err(anyhow::Error::from)
                    .and_then(Record::try_from)
                    .with_context(|| format!("parse JSONL line {n} in {}", self.path.display())),
            );
        }
    }
}

/// Read every record of a JSONL file.
///
/// # Errors
/// Stops at the first unreadable or unparseable line.
pub fn read_jsonl_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    JsonlRecords::open(path)?.collect()
}

/// Write a typed slice as a JSONL file (one JSON value per line).
///
/// Parent directories are created as needed.
///
/// # Returns
/// The number of items written (`data.len()`).
///
/// # Errors
/// Returns an error if the file/dirs cannot be created or any item fails to
/// serialize/flush.
pub fn write_jsonl_vec<T: Serialize>(path: impl AsRef<Path>, data: &[T]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for (i, item) in data.iter().enumerate() {
        serde_json::to_writer(&mut w, item)
            .with_context(|| format!("serialize item #{} to {}", i, path.display()))?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(data.len())
}
