//! # Strata
//!
//! An **incremental, parallel, partitioned dataset builder**. Strata turns
//! heterogeneous, semi-structured records extracted from many small source
//! files into a columnar dataset on disk that can be extended later and read
//! back as one logical table.
//!
//! ## Key Features
//!
//! - **Schema inference and reconciliation** - columns appear in first-seen
//!   order, missing fields become null, `int64` widens to `float64`, and lists
//!   and nested records are reconciled recursively
//! - **Incremental builds** - a checksummed manifest records which items were
//!   ingested, so re-runs only process new or changed files
//! - **Parallel extraction** - the work is split into balanced chunks, one
//!   partition per chunk, on a dedicated worker pool
//! - **Crash-safe writes** - partitions are staged and published without
//!   clobbering, and the manifest is replaced atomically after every partition
//!   of a run is in place
//! - **Pluggable storage** - Parquet and Arrow IPC backends (feature flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use strata::{BuildConfig, build_dataset, extractors};
//!
//! # fn main() -> strata::Result<()> {
//! let dataset = build_dataset(
//!     "data/raw/*.jsonl",
//!     extractors::jsonl(),
//!     "data/events",
//!     BuildConfig { workers: 4, ..BuildConfig::default() },
//! )?;
//! let table = dataset.read()?;
//! println!("{} rows x {} columns", table.num_rows(), table.num_columns());
//!
//! // Later: only new or modified files are processed.
//! let dataset = build_dataset(
//!     "data/raw/*.jsonl",
//!     extractors::jsonl(),
//!     "data/events",
//!     BuildConfig { incremental: true, ..BuildConfig::default() },
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Extractors
//!
//! An [`Extractor`] turns one [`SourceItem`] into records. It is either a
//! single-record function ([`Extractor::single`]) or a lazy record stream
//! ([`Extractor::stream`]). Unless disabled, every record is prefixed with the
//! `file_path`, `link_target`, and `mod_time` of its item.
//!
//! ```no_run
//! use strata::{DatasetBuilder, Extractor, Record, SourceItem};
//! use std::fs;
//!
//! let line_lengths = Extractor::stream(|item: &SourceItem| {
//!     let text = fs::read_to_string(&item.path)?;
//!     Ok(text
//!         .lines()
//!         .map(|l| Ok(Record::new().with("len", l.len() as i64)))
//!         .collect::<Vec<_>>())
//! });
//! let dataset = DatasetBuilder::new("notes/*.txt", line_lengths, "out/lines").build()?;
//! # Ok::<(), strata::Error>(())
//! ```
//!
//! ### Destinations
//!
//! A destination directory holds `part-<run>-<chunk>.<ext>` partition files
//! and a `_manifest.json`. A non-incremental build refuses to touch an
//! existing dataset ([`Error::AlreadyExists`]); an incremental one appends.
//!
//! ### Reading
//!
//! [`Dataset::read`] decodes every partition, merges their schemas, and
//! conforms each one to the union before concatenating. [`load_table`] skips
//! the destination entirely and returns the extracted table in memory.
//!
//! ## Feature Flags
//!
//! - `io-parquet` (default) - Parquet partitions
//! - `io-ipc` (default) - Arrow IPC stream partitions
//! - `cli` - the `strata` command-line tool
//!
//! ## Module Overview
//!
//! - [`source`] - enumerate source items
//! - [`extract`], [`extractors`] - run extractors over items
//! - [`schema`], [`table`] - schema inference and table building
//! - [`manifest`] - incremental bookkeeping
//! - [`partition`] - staging and publishing partition files
//! - [`coordinator`] - parallel runs
//! - [`dataset`] - reading a destination
//! - [`build`] - the build entry points
//! - [`testing`] - fixtures and assertions for tests

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod arrow_utils;
pub mod build;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod extractors;
pub mod io;
pub mod manifest;
pub mod partition;
pub mod record;
pub mod schema;
pub mod source;
pub mod table;
pub mod testing;

// General re-exports
pub use build::{BuildConfig, BuildReport, DatasetBuilder, build_dataset, load_table};
pub use coordinator::{Coordinator, RunOutcome, SkippedItem, plan_chunks};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use extract::{ExtractionPipeline, Extractor, ItemErrorMode};
pub use io::{Format, StorageBackend};
pub use manifest::{Manifest, RunEntry};
pub use partition::{PartitionWriter, RunId, StagedPartition};
pub use record::{Record, Value};
pub use schema::{Field, FieldType, Schema};
pub use source::{ChangeDetection, GlobSource, ModSignal, Source, SourceItem, enumerate};
pub use table::{Table, TableBuilder, build_table};

// Gated re-exports
#[cfg(feature = "io-parquet")]
pub use io::parquet::ParquetBackend;

#[cfg(feature = "io-ipc")]
pub use io::ipc::IpcBackend;
