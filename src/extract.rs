//! The extraction capability and the per-item extraction pipeline.
//!
//! An [`Extractor`] is chosen once, at construction, to be either a
//! single-record function or a lazy record stream. The
//! [`ExtractionPipeline`] runs it over one source item, drains the stream
//! completely, and merges the item's metadata fields in front of each record.

use crate::error::{Error, Result};
use crate::record::{Record, Value};
use crate::schema::{FieldType, Schema};
use crate::source::SourceItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Metadata column holding the item identity.
pub const FILE_PATH: &str = "file_path";
/// Metadata column holding the symlink target, null for regular files.
pub const LINK_TARGET: &str = "link_target";
/// Metadata column holding the modification time in seconds.
pub const MOD_TIME: &str = "mod_time";

/// Lazy, finite, non-restartable record sequence yielded by a stream extractor.
pub type RecordStream = Box<dyn Iterator<Item = anyhow::Result<Record>>>;

type SingleFn = dyn Fn(&SourceItem) -> anyhow::Result<Record> + Send + Sync;
type StreamFn = dyn Fn(&SourceItem) -> anyhow::Result<RecordStream> + Send + Sync;

/// Caller-supplied extraction capability.
///
/// Extractors are invoked once per source item, from whichever worker thread
/// owns the item's chunk, and must not assume any ordering across items beyond
/// the order within one chunk.
#[derive(Clone)]
pub enum Extractor {
    /// Produces exactly one record per item.
    Single(Arc<SingleFn>),
    /// Produces a lazy sequence of records per item.
    Stream(Arc<StreamFn>),
}

impl Extractor {
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(&SourceItem) -> anyhow::Result<Record> + Send + Sync + 'static,
    {
        Self::Single(Arc::new(f))
    }

    pub fn stream<F, I>(f: F) -> Self
    where
        F: Fn(&SourceItem) -> anyhow::Result<I> + Send + Sync + 'static,
        I: IntoIterator<Item = anyhow::Result<Record>>,
        I::IntoIter: 'static,
    {
        Self::Stream(Arc::new(move |item: &SourceItem| {
            Ok(Box::new(f(item)?.into_iter()) as RecordStream)
        }))
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => f.write_str("Extractor::Single"),
            Self::Stream(_) => f.write_str("Extractor::Stream"),
        }
    }
}

/// What a build does when extraction fails for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemErrorMode {
    /// The first failure aborts the run.
    #[default]
    FailFast,
    /// Failed items are logged, reported, and left out of the manifest so the
    /// next incremental run retries them.
    Skip,
}

/// Runs an [`Extractor`] over single items.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    extractor: Extractor,
    metadata: bool,
}

impl ExtractionPipeline {
    #[must_use]
    pub const fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            metadata: true,
        }
    }

    /// Toggle the `file_path` / `link_target` / `mod_time` columns.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: bool) -> Self {
        self.metadata = metadata;
        self
    }

    /// Schema the table builder is seeded with: the metadata columns, or nothing.
    #[must_use]
    pub fn seed_schema(&self) -> Schema {
        if !self.metadata {
            return Schema::new();
        }
        let mut schema = Schema::new();
        for (name, ty) in [
            (FILE_PATH, FieldType::Utf8),
            (LINK_TARGET, FieldType::Utf8),
            (MOD_TIME, FieldType::Float64),
        ] {
            // Observing a new name only appends.
            let observed = schema.observe_field(name.to_string(), &ty, name);
            debug_assert!(observed.is_ok(), "metadata field {name} rejected");
        }
        schema
    }

    /// Extract every record of `item`, consuming a stream extractor fully.
    ///
    /// # Errors
    /// Any failure of the extractor, whether when called or while yielding,
    /// becomes [`Error::ExtractionFailure`] carrying the item identity.
    pub fn run(&self, item: &SourceItem) -> Result<Vec<Record>> {
        let fail = |source: anyhow::Error| Error::ExtractionFailure {
            item: item.identity.clone(),
            source,
        };
        let records = match &self.extractor {
            Extractor::Single(f) => vec![f(item).map_err(fail)?],
            Extractor::Stream(f) => f(item)
                .map_err(fail)?
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(fail)?,
        };
        if !self.metadata {
            return Ok(records);
        }
        let meta = item_metadata(item);
        Ok(records
            .into_iter()
            .map(|r| r.prefixed_with(meta.clone()))
            .collect())
    }
}

/// The metadata fields derived from `item`, in column order.
#[must_use]
pub fn item_metadata(item: &SourceItem) -> Record {
    Record::with_capacity(3)
        .with(FILE_PATH, item.identity.as_str())
        .with(
            LINK_TARGET,
            item.link_target
                .as_ref()
                .map(|p| Value::Str(p.display().to_string())),
        )
        .with(MOD_TIME, item.signal.modified_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ModSignal;
    use anyhow::anyhow;
    use std::path::PathBuf;

    fn item(name: &str) -> SourceItem {
        SourceItem {
            identity: format!("/data/{name}"),
            path: PathBuf::from(format!("/data/{name}")),
            link_target: None,
            signal: ModSignal {
                modified_ns: 1_500_000_000,
                digest: None,
            },
        }
    }

    #[test]
    fn stream_records_get_metadata_first() -> anyhow::Result<()> {
        let ex = Extractor::stream(|_: &SourceItem| {
            Ok((0..3).map(|i| Ok(Record::new().with("i", i))))
        });
        let records = ExtractionPipeline::new(ex).run(&item("a.json"))?;
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].names().collect::<Vec<_>>(),
            vec![FILE_PATH, LINK_TARGET, MOD_TIME, "i"]
        );
        assert_eq!(records[2].get("i"), Some(&Value::Int(2)));
        assert_eq!(records[0].get(MOD_TIME), Some(&Value::Float(1.5)));
        assert_eq!(records[0].get(LINK_TARGET), Some(&Value::Null));
        Ok(())
    }

    #[test]
    fn single_without_metadata() -> anyhow::Result<()> {
        let ex = Extractor::single(|it: &SourceItem| Ok(Record::new().with("id", it.identity.as_str())));
        let records = ExtractionPipeline::new(ex).with_metadata(false).run(&item("b"))?;
        assert_eq!(records, vec![Record::new().with("id", "/data/b")]);
        Ok(())
    }

    #[test]
    fn mid_stream_error_names_the_item() {
        let ex = Extractor::stream(|_: &SourceItem| {
            Ok(vec![Ok(Record::new().with("x", 1)), Err(anyhow!("line 2 is garbage"))])
        });
        let err = ExtractionPipeline::new(ex).run(&item("bad.json")).unwrap_err();
        match err {
            Error::ExtractionFailure { item, source } => {
                assert_eq!(item, "/data/bad.json");
                assert!(source.to_string().contains("line 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn seed_schema_matches_metadata_order() {
        let ex = Extractor::single(|_: &SourceItem| Ok(Record::new()));
        let seed = ExtractionPipeline::new(ex).seed_schema();
        assert_eq!(seed.names().collect::<Vec<_>>(), vec![FILE_PATH, LINK_TARGET, MOD_TIME]);
        assert_eq!(seed.get(LINK_TARGET), Some(&FieldType::Utf8));
        assert_eq!(seed.get(MOD_TIME), Some(&FieldType::Float64));

        let ex = Extractor::single(|_: &SourceItem| Ok(Record::new()));
        assert!(ExtractionPipeline::new(ex).with_metadata(false).seed_schema().is_empty());
    }
}
