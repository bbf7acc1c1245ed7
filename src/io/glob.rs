//! Glob pattern expansion for source selection.
//!
//! # Examples
//!
//! ```no_run
//! use strata::io::glob::expand_glob;
//!
//! // Match all JSONL files in a directory
//! let files = expand_glob("logs/*.jsonl")?;
//!
//! // Match files with date-based partitions
//! let partitions = expand_glob("data/events/year=2024/month=*/day=*/*.json")?;
//! # Ok::<(), strata::Error>(())
//! ```

use crate::error::{Error, Result};
use glob::glob;
use std::path::PathBuf;

/// Expand a glob pattern into the lexicographically sorted list of regular
/// files it matches. `**` crosses directories; symlinks are followed when
/// deciding whether an entry is a file. Zero matches is an empty vector.
///
/// # Errors
///
/// Returns an error if:
/// - The pattern is invalid ([`Error::Pattern`])
/// - A matched entry cannot be inspected ([`Error::Io`])
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}
