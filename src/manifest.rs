//! The incremental manifest: which source items a dataset already contains.
//!
//! The manifest lives at `<dest>/_manifest.json` and maps every ingested item
//! identity to the [`ModSignal`] it had when it was last processed. It also
//! records the dataset's storage [`Format`] and a log of committed runs.
//!
//! Entries are only ever added or advanced; nothing is removed. The file is
//! replaced atomically (temporary file in the destination, then rename) and
//! carries a SHA-256 checksum of its body so partial or hand-edited files are
//! detected on load.

use crate::error::{Error, Result};
use crate::io::Format;
use crate::source::{ModSignal, SourceItem, hex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// File name of the manifest inside a destination.
pub const MANIFEST_FILE: &str = "_manifest.json";

/// Current on-disk layout version.
pub const MANIFEST_VERSION: u32 = 1;

/// One committed build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub run_id: String,
    /// Commit time in milliseconds since the Unix epoch.
    pub committed_at_ms: u64,
    /// Partition file names published by the run, in chunk order.
    pub partitions: Vec<String>,
    pub items: usize,
    pub rows: usize,
}

impl RunEntry {
    /// A run entry stamped with the current time.
    #[must_use]
    pub fn now(run_id: impl Into<String>, partitions: Vec<String>, items: usize, rows: usize) -> Self {
        Self {
            run_id: run_id.into(),
            committed_at_ms: current_timestamp_ms(),
            partitions,
            items,
            rows,
        }
    }
}

/// Persisted record of incorporated source items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    format: Format,
    items: BTreeMap<String, ModSignal>,
    #[serde(default)]
    runs: Vec<RunEntry>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    manifest: Manifest,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(Format::default())
    }
}

impl Manifest {
    /// An empty manifest for a dataset stored as `format`.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self {
            version: MANIFEST_VERSION,
            format,
            items: BTreeMap::new(),
            runs: Vec::new(),
        }
    }

    /// Path of the manifest file for destination `dest`.
    #[must_use]
    pub fn path(dest: &Path) -> PathBuf {
        dest.join(MANIFEST_FILE)
    }

    /// Whether `dest` holds a manifest.
    #[must_use]
    pub fn is_established(dest: &Path) -> bool {
        Self::path(dest).is_file()
    }

    /// Load the manifest of `dest`, or an empty one if there is none.
    ///
    /// # Errors
    /// See [`read`](Self::read).
    pub fn load(dest: &Path) -> Result<Self> {
        Ok(Self::read(dest)?.unwrap_or_default())
    }

    /// Load the manifest of `dest` if it exists.
    ///
    /// # Errors
    /// Returns [`Error::ManifestCorrupt`] if the file is not valid JSON, has an
    /// unknown version, or fails its checksum; [`Error::Io`] if it cannot be read.
    pub fn read(dest: &Path) -> Result<Option<Self>> {
        let path = Self::path(dest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let corrupt = |reason: String| Error::ManifestCorrupt {
            path: path.clone(),
            reason,
        };
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("unparseable: {e}")))?;
        let manifest = envelope.manifest;
        if manifest.version != MANIFEST_VERSION {
            return Err(corrupt(format!("unknown version {}", manifest.version)));
        }
        let computed = manifest.checksum()?;
        if computed != envelope.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest file of `dest` with this manifest.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the temporary file cannot be written or renamed.
    pub fn save(&self, dest: &Path) -> Result<()> {
        let envelope = Envelope {
            checksum: self.checksum()?,
            manifest: self.clone(),
        };
        let body = serde_json::to_vec_pretty(&envelope).map_err(std::io::Error::other)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".manifest-")
            .tempfile_in(dest)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path(dest)).map_err(|e| e.error)?;
        Ok(())
    }

    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Number of tracked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&ModSignal> {
        self.items.get(identity)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &ModSignal)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn runs(&self) -> &[RunEntry] {
        &self.runs
    }

    /// Items that are new or changed relative to this manifest, in input order.
    #[must_use]
    pub fn delta(&self, items: &[SourceItem]) -> Vec<SourceItem> {
        items
            .iter()
            .filter(|item| {
                self.items
                    .get(&item.identity)
                    .is_none_or(|recorded| item.signal.supersedes(recorded))
            })
            .cloned()
            .collect()
    }

    /// Record `processed` items and the run that processed them.
    ///
    /// An existing entry is only advanced, never regressed.
    pub fn commit(&mut self, processed: &[SourceItem], run: RunEntry) {
        for item in processed {
            match self.items.get_mut(&item.identity) {
                Some(recorded) => {
                    if item.signal.supersedes(recorded) {
                        *recorded = item.signal.clone();
                    }
                }
                None => {
                    self.items.insert(item.identity.clone(), item.signal.clone());
                }
            }
        }
        self.runs.push(run);
    }

    /// SHA-256 of the serialized manifest body.
    fn checksum(&self) -> Result<String> {
        let body = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        Ok(compute_checksum(&body))
    }
}

/// Compute SHA-256 checksum of data.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

#[allow(clippy::cast_possible_truncation)]
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
