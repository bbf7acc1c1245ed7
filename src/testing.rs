//! Testing utilities for dataset builds.
//!
//! - **Builders**: a seeded pseudo-random generator and record factories, so
//!   tests get reproducible data without an external RNG.
//! - **Fixtures**: lay down batches of JSONL source files, bump modification
//!   times, and wrap extractors to fail on chosen items.
//! - **Assertions**: compare tables and inspect destinations.
//!
//! # Quick Start
//!
//! ```no_run
//! use strata::testing::*;
//! use strata::{DatasetBuilder, extractors};
//!
//! # fn main() -> anyhow::Result<()> {
//! let src = tempfile::tempdir()?;
//! let dest = tempfile::tempdir()?;
//! random_jsonl_batch(src.path(), 8, 16, 7)?;
//!
//! let pattern = format!("{}/*.jsonl", src.path().display());
//! let dataset = DatasetBuilder::new(pattern, extractors::jsonl(), dest.path().join("out"))
//!     .build()?;
//! assert_eq!(dataset.read()?.num_rows(), 8 * 16);
//! assert_no_staging_files(dest.path().join("out"));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
