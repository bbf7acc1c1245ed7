//! Read access to a partitioned dataset.
//!
//! A [`Dataset`] is a view over whatever partitions are present in a
//! destination when it is queried. Partitions are never modified, so each
//! call sees a consistent snapshot without locking. [`Dataset::read`]
//! reconciles the per-partition schemas into one union schema and conforms
//! every partition to it.

use crate::error::{Error, Result};
use crate::io::{Format, StorageBackend};
use crate::manifest::Manifest;
use crate::partition::is_partition_file;
use crate::schema::Schema;
use crate::table::Table;
use anyhow::Context;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The logical union of all partitions in a destination.
#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    backend: Arc<dyn StorageBackend>,
}

impl Dataset {
    /// Open the dataset at `root`, using the format recorded in its manifest
    /// (Parquet when there is no manifest yet).
    ///
    /// # Errors
    /// Returns [`Error::ManifestCorrupt`] if the manifest cannot be loaded, or
    /// [`Error::InvalidConfig`] if its format is not compiled in.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let format = Manifest::read(&root)?.map_or(Format::default(), |m| m.format());
        let backend = format.backend()?;
        Ok(Self { root, backend })
    }

    /// View `root` through an explicit backend.
    pub fn with_backend(root: impl Into<PathBuf>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            root: root.into(),
            backend,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// The destination's manifest (empty if none has been committed).
    ///
    /// # Errors
    /// See [`Manifest::load`].
    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.root)
    }

    /// Partition files currently present, sorted by name (run, then chunk).
    ///
    /// A missing destination has no partitions.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the destination cannot be listed.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        list_partitions(&self.root, self.backend.extension())
    }

    /// Decode one partition file.
    ///
    /// # Errors
    /// Returns [`Error::PartitionReadFailure`] if the file cannot be read or decoded.
    pub fn read_partition(&self, path: &Path) -> Result<Table> {
        fs::read(path)
            .with_context(|| format!("read {}", path.display()))
            .and_then(|bytes| self.backend.decode(bytes))
            .map_err(|source| Error::PartitionReadFailure {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Union of all partition schemas, in first-seen column order.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] if two partitions disagree irreconcilably.
    pub fn schema(&self) -> Result<Schema> {
        let mut union = Schema::new();
        for path in self.files()? {
            union.merge(self.read_partition(&path)?.schema())?;
        }
        Ok(union)
    }

    /// Read every partition into one table.
    ///
    /// Rows appear in partition order; columns missing from a partition are
    /// null, widened columns are cast, and nested values are conformed
    /// recursively.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] on irreconcilable partition schemas or
    /// [`Error::PartitionReadFailure`] if a partition cannot be decoded.
    pub fn read(&self) -> Result<Table> {
        let tables = self
            .files()?
            .iter()
            .map(|path| self.read_partition(path))
            .collect::<Result<Vec<_>>>()?;
        Table::concat(&tables)
    }

    /// Total rows across partitions.
    ///
    /// # Errors
    /// Same as [`read_partition`](Self::read_partition).
    pub fn num_rows(&self) -> Result<usize> {
        self.files()?
            .iter()
            .map(|p| self.read_partition(p).map(|t| t.num_rows()))
            .sum()
    }
}

/// Published partition files for `extension` in `dir`, sorted by name.
pub(crate) fn list_partitions(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let keep = entry
            .file_name()
            .to_str()
            .is_some_and(|name| is_partition_file(name, extension));
        if keep && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
