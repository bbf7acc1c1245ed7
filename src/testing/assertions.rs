//! Assertion helpers for tables and destinations.

use crate::table::Table;
use arrow::array::Array;
use std::fs;
use std::path::Path;

/// Assert that two tables have the same schema and the same rows in order.
///
/// # Panics
///
/// Panics with both schemas or the first differing column if they differ.
pub fn assert_tables_equal(actual: &Table, expected: &Table) {
    assert_eq!(
        actual.schema(),
        expected.schema(),
        "Table schema mismatch:\n  Expected: {:?}\n  Actual: {:?}",
        expected.column_names(),
        actual.column_names()
    );
    assert_eq!(
        actual.num_rows(),
        expected.num_rows(),
        "Table row count mismatch"
    );
    for name in expected.column_names() {
        let (a, e) = (actual.column(name), expected.column(name));
        assert!(
            a.zip(e).is_some_and(|(a, e)| a.to_data() == e.to_data()),
            "Table column `{name}` differs:\n  Expected: {e:?}\n  Actual: {a:?}"
        );
    }
}

/// Assert that no staging file is left in `dir`.
///
/// # Panics
///
/// Panics if `dir` holds a `.staging-*` or `.manifest-*` file.
pub fn assert_no_staging_files(dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let leftovers: Vec<String> = entries
        .filter_map(|e| e.ok()?.file_name().into_string().ok())
        .filter(|n| n.starts_with(".staging-") || n.starts_with(".manifest-"))
        .collect();
    assert!(
        leftovers.is_empty(),
        "Temporary files left in {}: {leftovers:?}",
        dir.display()
    );
}

/// File names in `dir`, sorted. A missing directory yields an empty list.
#[must_use]
pub fn dir_entries(dir: impl AsRef<Path>) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok()?.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
