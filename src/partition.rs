//! Partition naming, staging, and publishing.
//!
//! A partition is written in two steps. [`PartitionWriter::stage`] encodes the
//! table and writes it to a hidden `.staging-*` file in the destination, synced
//! to disk. [`StagedPartition::publish`] then links it to its final name
//! `part-<run>-<chunk>.<ext>` without ever replacing an existing file. A staged
//! partition that is dropped without being published deletes its staging file,
//! which is how a failed run discards its output.

use crate::error::{Error, Result};
use crate::io::StorageBackend;
use crate::table::Table;
use anyhow::Context;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// File name prefix shared by every partition.
pub const PARTITION_PREFIX: &str = "part-";
/// File name prefix of in-flight staging files.
pub const STAGING_PREFIX: &str = ".staging-";

/// Identifier of one build run: a time-ordered UUIDv7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// A fresh id; ids created later sort after earlier ones.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Final file name of chunk `chunk` of run `run`.
#[must_use]
pub fn partition_file_name(run: RunId, chunk: usize, extension: &str) -> String {
    format!("{PARTITION_PREFIX}{run}-{chunk:05}.{extension}")
}

/// Whether `name` is a published partition file for `extension`.
#[must_use]
pub fn is_partition_file(name: &str, extension: &str) -> bool {
    name.starts_with(PARTITION_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Writes tables into partitions of one destination.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    dir: PathBuf,
    backend: Arc<dyn StorageBackend>,
}

impl PartitionWriter {
    pub fn new(dir: impl Into<PathBuf>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            dir: dir.into(),
            backend,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Encode `table` and write it to a staging file for `(run, chunk)`.
    ///
    /// # Errors
    /// Returns [`Error::PartitionWriteFailure`] if encoding or writing fails.
    pub fn stage(&self, table: &Table, run: RunId, chunk: usize) -> Result<StagedPartition> {
        let target = self
            .dir
            .join(partition_file_name(run, chunk, self.backend.extension()));
        let fail = |source: anyhow::Error| Error::PartitionWriteFailure {
            path: target.clone(),
            source,
        };
        let bytes = self
            .backend
            .encode(table)
            .with_context(|| format!("encode {} rows as {}", table.num_rows(), self.backend.name()))
            .map_err(fail)?;
        let file = write_staging(&self.dir, &bytes).map_err(fail)?;
        tracing::debug!(
            path = %target.display(),
            rows = table.num_rows(),
            bytes = bytes.len(),
            "staged partition"
        );
        Ok(StagedPartition {
            file,
            target,
            rows: table.num_rows(),
        })
    }

    /// Stage and immediately publish.
    ///
    /// # Errors
    /// See [`stage`](Self::stage) and [`StagedPartition::publish`].
    pub fn write(&self, table: &Table, run: RunId, chunk: usize) -> Result<PathBuf> {
        self.stage(table, run, chunk)?.publish()
    }
}

fn write_staging(dir: &Path, bytes: &[u8]) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .with_context(|| format!("create staging file in {}", dir.display()))?;
    file.write_all(bytes).context("write staging file")?;
    file.as_file().sync_all().context("sync staging file")?;
    Ok(file)
}

/// An encoded partition waiting to be published.
#[derive(Debug)]
pub struct StagedPartition {
    file: NamedTempFile,
    target: PathBuf,
    rows: usize,
}

impl StagedPartition {
    /// Final path this partition will be published at.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Link the staging file to its final name.
    ///
    /// # Errors
    /// Returns [`Error::PartitionWriteFailure`] if a file with the final name
    /// already exists or the link fails; the staging file is then removed.
    pub fn publish(self) -> Result<PathBuf> {
        let Self { file, target, .. } = self;
        match file.persist_noclobber(&target) {
            Ok(_) => Ok(target),
            Err(e) => Err(Error::PartitionWriteFailure {
                source: anyhow::Error::from(e.error).context("publish partition"),
                path: target,
            }),
        }
    }
}
