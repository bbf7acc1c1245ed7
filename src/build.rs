//! Build entry point: configuration, the fluent [`DatasetBuilder`], and the
//! destination contract.
//!
//! | destination        | `incremental` | outcome                                   |
//! |--------------------|---------------|-------------------------------------------|
//! | absent or empty    | either        | fresh build of every matched item         |
//! | established        | `false`       | [`Error::AlreadyExists`], nothing written |
//! | established        | `true`        | only new or changed items are processed   |
//! | partitions, no manifest | either   | [`Error::ManifestCorrupt`]                |
//!
//! A destination is *established* once it holds a manifest or partitions.

use crate::coordinator::{
    Coordinator, SkippedItem, collect_outputs, extract_chunk, fan_out, plan_chunks,
    remove_published,
};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::extract::{ExtractionPipeline, Extractor, ItemErrorMode};
use crate::io::Format;
use crate::manifest::{MANIFEST_FILE, Manifest, RunEntry};
use crate::partition::{PARTITION_PREFIX, PartitionWriter, RunId};
use crate::source::{ChangeDetection, GlobSource, Source};
use crate::table::{Table, TableBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Options of one build. Missing fields in a JSON config take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Extend an established destination instead of rejecting it.
    pub incremental: bool,
    /// Number of parallel workers (and at most that many partitions per run).
    pub workers: usize,
    pub format: Format,
    /// Prepend `file_path`, `link_target`, and `mod_time` to every record.
    pub metadata: bool,
    pub change_detection: ChangeDetection,
    pub on_item_error: ItemErrorMode,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            incremental: false,
            workers: 1,
            format: Format::default(),
            metadata: true,
            change_detection: ChangeDetection::default(),
            on_item_error: ItemErrorMode::default(),
        }
    }
}

impl BuildConfig {
    /// Load a config from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::InvalidConfig`] if it is not a valid config document.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Reject configurations no build can run with.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] when `workers` is zero or the format's
    /// backend is not compiled in.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        self.format.backend().map(drop)
    }
}

/// Summary of what a build did.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Id of the committed run; `None` when there was nothing to do.
    pub run_id: Option<RunId>,
    /// Items matched by the selection.
    pub matched: usize,
    /// Items selected for processing (all matched items on a fresh build).
    pub delta: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedItem>,
    pub partitions: Vec<PathBuf>,
    pub rows: usize,
}

enum Selection {
    Pattern(String),
    Custom(Box<dyn Source>),
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Fluent front end to a build.
///
/// ```no_run
/// use strata::{DatasetBuilder, extractors};
///
/// let dataset = DatasetBuilder::new("logs/*.jsonl", extractors::jsonl(), "out/events")
///     .incremental(true)
///     .workers(4)
///     .build()?;
/// println!("{} partitions", dataset.files()?.len());
/// # Ok::<(), strata::Error>(())
/// ```
#[derive(Debug)]
pub struct DatasetBuilder {
    selection: Selection,
    extractor: Extractor,
    dest: PathBuf,
    config: BuildConfig,
}

impl DatasetBuilder {
    /// Build `dest` from files matching the glob `pattern`.
    pub fn new(pattern: impl Into<String>, extractor: Extractor, dest: impl Into<PathBuf>) -> Self {
        Self {
            selection: Selection::Pattern(pattern.into()),
            extractor,
            dest: dest.into(),
            config: BuildConfig::default(),
        }
    }

    /// Build `dest` from an arbitrary [`Source`].
    pub fn from_source(
        source: impl Source + 'static,
        extractor: Extractor,
        dest: impl Into<PathBuf>,
    ) -> Self {
        Self {
            selection: Selection::Custom(Box::new(source)),
            extractor,
            dest: dest.into(),
            config: BuildConfig::default(),
        }
    }

    /// Replace every option at once.
    #[must_use]
    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn incremental(mut self, incremental: bool) -> Self {
        self.config.incremental = incremental;
        self
    }

    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    #[must_use]
    pub const fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    #[must_use]
    pub const fn metadata(mut self, metadata: bool) -> Self {
        self.config.metadata = metadata;
        self
    }

    #[must_use]
    pub const fn change_detection(mut self, detection: ChangeDetection) -> Self {
        self.config.change_detection = detection;
        self
    }

    #[must_use]
    pub const fn on_item_error(mut self, mode: ItemErrorMode) -> Self {
        self.config.on_item_error = mode;
        self
    }

    /// Run the build and return a view of the resulting dataset.
    ///
    /// # Errors
    /// See [`build_with_report`](Self::build_with_report).
    pub fn build(self) -> Result<Dataset> {
        self.build_with_report().map(|(dataset, _)| dataset)
    }

    /// Run the build, also returning what it did.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] for a non-incremental build of an established
    /// destination, [`Error::InvalidConfig`] for an unusable configuration,
    /// and any enumeration, extraction, schema, or write failure of the run.
    /// A failed build leaves the destination as it was.
    pub fn build_with_report(self) -> Result<(Dataset, BuildReport)> {
        let Self {
            selection,
            extractor,
            dest,
            config,
        } = self;
        let source: Box<dyn Source> = match selection {
            Selection::Pattern(pattern) => {
                Box::new(GlobSource::new(pattern).with_detection(config.change_detection))
            }
            Selection::Custom(source) => source,
        };
        execute(source.as_ref(), extractor, &dest, &config)
    }
}

/// Build `dest` from the files matching `pattern`.
///
/// # Errors
/// See [`DatasetBuilder::build_with_report`].
pub fn build_dataset(
    pattern: &str,
    extractor: Extractor,
    dest: impl Into<PathBuf>,
    config: BuildConfig,
) -> Result<Dataset> {
    DatasetBuilder::new(pattern, extractor, dest)
        .config(config)
        .build()
}

/// Extract every file matching `pattern` into one in-memory table, without a
/// destination.
///
/// `workers`, `metadata`, `change_detection`, and `on_item_error` apply as in
/// a build; `incremental` and `format` are ignored. With several workers each
/// chunk is built separately and the chunk tables are concatenated in order
/// under their union schema, which gives the same table as one worker.
///
/// ```no_run
/// use strata::{BuildConfig, extractors, load_table};
///
/// let table = load_table("logs/*.jsonl", extractors::jsonl(), &BuildConfig::default())?;
/// println!("{:?}", table.shape());
/// # Ok::<(), strata::Error>(())
/// ```
///
/// # Errors
/// [`Error::InvalidConfig`] when `workers` is zero, and any enumeration,
/// extraction, or schema failure.
pub fn load_table(pattern: &str, extractor: Extractor, config: &BuildConfig) -> Result<Table> {
    if config.workers == 0 {
        return Err(Error::InvalidConfig("workers must be at least 1".into()));
    }
    let items = GlobSource::new(pattern)
        .with_detection(config.change_detection)
        .enumerate()?;
    let pipeline = ExtractionPipeline::new(extractor).with_metadata(config.metadata);
    let seed = pipeline.seed_schema();
    tracing::info!(pattern, items = items.len(), workers = config.workers, "loading table");

    let chunks = plan_chunks(items, config.workers);
    let results = fan_out(config.workers, chunks, |chunk, items, cancel| {
        extract_chunk(&pipeline, &seed, config.on_item_error, chunk, items, cancel)
    })?;
    let tables: Vec<Table> = collect_outputs(results)?
        .into_iter()
        .filter_map(|chunk| chunk.table)
        .collect();
    if tables.is_empty() {
        return TableBuilder::with_schema(seed).finish();
    }
    Table::concat(&tables)
}

fn execute(
    source: &dyn Source,
    extractor: Extractor,
    dest: &Path,
    config: &BuildConfig,
) -> Result<(Dataset, BuildReport)> {
    config.validate()?;
    let has_manifest = Manifest::is_established(dest);
    let has_partitions = holds_partitions(dest)?;
    let established = has_manifest || has_partitions;
    tracing::info!(
        dest = %dest.display(),
        incremental = config.incremental,
        established,
        workers = config.workers,
        "build requested"
    );
    if established && !config.incremental {
        return Err(Error::AlreadyExists(dest.to_path_buf()));
    }
    if !has_manifest && has_partitions {
        return Err(Error::ManifestCorrupt {
            path: Manifest::path(dest),
            reason: format!("partitions present without {MANIFEST_FILE}"),
        });
    }

    let existing = if has_manifest {
        Manifest::read(dest)?
    } else {
        None
    };
    let mut manifest = match existing {
        Some(m) if m.format() != config.format => {
            return Err(Error::InvalidConfig(format!(
                "dataset at {} is stored as {}, not {}",
                dest.display(),
                m.format(),
                config.format
            )));
        }
        Some(m) => m,
        None => Manifest::new(config.format),
    };
    let backend = config.format.backend()?;

    let items = source.enumerate()?;
    let delta = manifest.delta(&items);
    tracing::info!(matched = items.len(), delta = delta.len(), "computed delta");
    let mut report = BuildReport {
        matched: items.len(),
        delta: delta.len(),
        ..BuildReport::default()
    };
    if established && delta.is_empty() {
        tracing::info!(dest = %dest.display(), "dataset is up to date");
        return Ok((Dataset::with_backend(dest, backend), report));
    }

    let created = !dest.exists();
    fs::create_dir_all(dest)?;
    let coordinator = Coordinator::new(
        ExtractionPipeline::new(extractor).with_metadata(config.metadata),
        PartitionWriter::new(dest, backend.clone()),
    )
    .with_workers(config.workers)
    .with_item_error_mode(config.on_item_error);

    let outcome = match coordinator.run(delta) {
        Ok(outcome) => outcome,
        Err(e) => {
            if created {
                remove_if_empty(dest);
            }
            return Err(e);
        }
    };

    let names = outcome
        .partitions
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .collect();
    manifest.commit(
        &outcome.processed,
        RunEntry::now(
            outcome.run_id.to_string(),
            names,
            outcome.processed.len(),
            outcome.rows,
        ),
    );
    if let Err(e) = manifest.save(dest) {
        tracing::error!(error = %e, "manifest commit failed; removing run partitions");
        remove_published(&outcome.partitions);
        if created {
            remove_if_empty(dest);
        }
        return Err(e);
    }

    tracing::info!(
        run_id = %outcome.run_id,
        processed = outcome.processed.len(),
        partitions = outcome.partitions.len(),
        rows = outcome.rows,
        "build committed"
    );
    report.run_id = Some(outcome.run_id);
    report.processed = outcome.processed.len();
    report.skipped = outcome.skipped;
    report.partitions = outcome.partitions;
    report.rows = outcome.rows;
    Ok((Dataset::with_backend(dest, backend), report))
}

/// Whether `dest` contains any partition file, whatever its format.
fn holds_partitions(dest: &Path) -> Result<bool> {
    let entries = match fs::read_dir(dest) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        if entry?
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PARTITION_PREFIX))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn remove_if_empty(dest: &Path) {
    if let Err(e) = fs::remove_dir(dest) {
        tracing::debug!(dest = %dest.display(), error = %e, "left destination in place");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_config_uses_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("build.json");
        fs::write(&path, r#"{"workers": 4, "on_item_error": "skip", "change_detection": "content-hash"}"#)?;
        let config = BuildConfig::from_json_file(&path)?;
        assert_eq!(config.workers, 4);
        assert_eq!(config.on_item_error, ItemErrorMode::Skip);
        assert_eq!(config.change_detection, ChangeDetection::ContentHash);
        assert!(config.metadata);
        assert!(!config.incremental);
        assert_eq!(config.format, Format::Parquet);
        Ok(())
    }

    #[test]
    fn bad_config_is_invalid() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("build.json");
        fs::write(&path, r#"{"workers": "many"}"#)?;
        assert!(matches!(
            BuildConfig::from_json_file(&path),
            Err(Error::InvalidConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn zero_workers_rejected() {
        let config = BuildConfig {
            workers: 0,
            ..BuildConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn partition_detection_ignores_other_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(!holds_partitions(&dir.path().join("missing"))?);
        fs::write(dir.path().join("notes.txt"), "")?;
        assert!(!holds_partitions(dir.path())?);
        fs::write(dir.path().join("part-x-00000.arrow"), "")?;
        assert!(holds_partitions(dir.path())?);
        Ok(())
    }
}
