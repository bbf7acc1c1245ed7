//! Source-file fixtures for build tests.

use super::builders::random_records;
use crate::extract::Extractor;
use crate::io::jsonl::{JsonlRecords, write_jsonl_vec};
use crate::source::SourceItem;
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Write `items` JSONL files of `records_per_item` random records each into
/// `dir`, named `batch-0000.jsonl`, `batch-0001.jsonl`, ...
///
/// File `i` is generated from seed `seed + i`, so a batch is reproducible.
///
/// # Errors
/// Returns an error if a file cannot be written.
pub fn random_jsonl_batch(
    dir: impl AsRef<Path>,
    items: usize,
    records_per_item: usize,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    (0..items)
        .map(|i| {
            let path = dir.join(format!("batch-{i:04}.jsonl"));
            write_random_jsonl(&path, records_per_item, seed + i as u64)?;
            Ok(path)
        })
        .collect()
}

/// Overwrite `path` with `count` random records.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_random_jsonl(path: impl AsRef<Path>, count: usize, seed: u64) -> Result<usize> {
    write_jsonl_vec(path, &random_records(count, seed))
}

/// Set the modification time of `path`.
///
/// # Errors
/// Returns an error if the file cannot be opened or updated.
pub fn set_mtime(path: impl AsRef<Path>, when: SystemTime) -> Result<()> {
    let path = path.as_ref();
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(when))
        .with_context(|| format!("set mtime of {}", path.display()))
}

/// Move the modification time of `path` forward by `secs` seconds.
///
/// Useful after rewriting a file within the filesystem's timestamp
/// resolution of the previous write.
///
/// # Errors
/// Returns an error if the file cannot be inspected or updated.
pub fn bump_mtime(path: impl AsRef<Path>, secs: u64) -> Result<()> {
    let path = path.as_ref();
    let modified = path
        .metadata()
        .and_then(|m| m.modified())
        .with_context(|| format!("stat {}", path.display()))?;
    set_mtime(path, modified + Duration::from_secs(secs))
}

/// A JSONL extractor that fails for every item whose identity contains `marker`.
#[must_use]
pub fn failing_jsonl(marker: impl Into<String>) -> Extractor {
    let marker = marker.into();
    Extractor::stream(move |item: &SourceItem| {
        if item.identity.contains(&marker) {
            bail!("refusing to extract {}", item.identity);
        }
        JsonlRecords::open(&item.path)
    })
}

/// A JSONL extractor that panics for every item whose identity contains `marker`.
#[must_use]
pub fn panicking_jsonl(marker: impl Into<String>) -> Extractor {
    let marker = marker.into();
    Extractor::stream(move |item: &SourceItem| {
        assert!(!item.identity.contains(&marker), "extractor blew up on {}", item.identity);
        JsonlRecords::open(&item.path)
    })
}
