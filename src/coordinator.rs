//! Worker-pool fan-out of one build run.
//!
//! The delta is split into contiguous chunks with [`plan_chunks`]; each chunk
//! is extracted, built into one table, and staged as one partition by its own
//! rayon task. Chunks share nothing but a cancellation flag. Only after every
//! chunk has finished does the coordinator decide: on any failure all staged
//! partitions are discarded, otherwise they are published in chunk order.

use crate::error::{Error, Result};
use crate::extract::{ExtractionPipeline, ItemErrorMode};
use crate::partition::{PartitionWriter, RunId, StagedPartition};
use crate::schema::Schema;
use crate::source::SourceItem;
use crate::table::{Table, TableBuilder};
use rayon::prelude::*;
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Split `items` into `min(workers, items.len())` contiguous chunks.
///
/// Order is preserved, sizes differ by at most one, and earlier chunks get the
/// extra items. An empty input yields no chunks; `workers == 0` is treated as 1.
#[must_use]
pub fn plan_chunks<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let len = items.len();
    if len == 0 {
        return Vec::new();
    }
    let n = workers.clamp(1, len);
    let (base, extra) = (len / n, len % n);
    let mut out = Vec::with_capacity(n);
    let mut rest = items.into_iter();
    for i in 0..n {
        let size = base + usize::from(i < extra);
        out.push(rest.by_ref().take(size).collect());
    }
    out
}

/// An item left out of a run under [`ItemErrorMode::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub identity: String,
    pub reason: String,
}

/// What a successful run published.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Published partition paths, in chunk order.
    pub partitions: Vec<PathBuf>,
    /// Items whose records are in the published partitions.
    pub processed: Vec<SourceItem>,
    pub skipped: Vec<SkippedItem>,
    pub rows: usize,
}

/// One chunk's table, before it is staged anywhere.
pub(crate) struct ExtractedChunk {
    /// `None` when no item of the chunk was processed.
    pub(crate) table: Option<Table>,
    pub(crate) processed: Vec<SourceItem>,
    pub(crate) skipped: Vec<SkippedItem>,
}

struct ChunkOutput {
    staged: Option<StagedPartition>,
    processed: Vec<SourceItem>,
    skipped: Vec<SkippedItem>,
}

/// Runs extraction, table building, and staging over chunks in parallel.
#[derive(Debug, Clone)]
pub struct Coordinator {
    pipeline: ExtractionPipeline,
    writer: PartitionWriter,
    seed: Schema,
    workers: usize,
    on_item_error: ItemErrorMode,
}

impl Coordinator {
    #[must_use]
    pub fn new(pipeline: ExtractionPipeline, writer: PartitionWriter) -> Self {
        let seed = pipeline.seed_schema();
        Self {
            pipeline,
            writer,
            seed,
            workers: 1,
            on_item_error: ItemErrorMode::default(),
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub const fn with_item_error_mode(mut self, mode: ItemErrorMode) -> Self {
        self.on_item_error = mode;
        self
    }

    /// Process `items` as one run.
    ///
    /// # Errors
    /// Returns the first failure in chunk order (ignoring chunks that merely
    /// stopped because of it). Nothing is left in the destination on error.
    pub fn run(&self, items: Vec<SourceItem>) -> Result<RunOutcome> {
        self.run_with_id(RunId::new(), items)
    }

    fn run_with_id(&self, run_id: RunId, items: Vec<SourceItem>) -> Result<RunOutcome> {
        let total = items.len();
        let chunks = plan_chunks(items, self.workers);
        tracing::info!(
            run_id = %run_id,
            items = total,
            chunks = chunks.len(),
            workers = self.workers,
            "starting run"
        );

        let results = fan_out(self.workers, chunks, |chunk, items, cancel| {
            self.run_chunk(run_id, chunk, items, cancel)
        })?;
        let outputs = match collect_outputs(results) {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "run failed; discarding staged partitions");
                return Err(e);
            }
        };
        self.publish(run_id, outputs)
    }

    fn run_chunk(
        &self,
        run_id: RunId,
        chunk: usize,
        items: Vec<SourceItem>,
        cancel: &AtomicBool,
    ) -> Result<ChunkOutput> {
        let extracted = extract_chunk(
            &self.pipeline,
            &self.seed,
            self.on_item_error,
            chunk,
            items,
            cancel,
        )?;
        let staged = match &extracted.table {
            Some(table) => Some(self.writer.stage(table, run_id, chunk)?),
            None => None,
        };
        tracing::debug!(
            chunk,
            items = extracted.processed.len(),
            skipped = extracted.skipped.len(),
            rows = staged.as_ref().map_or(0, StagedPartition::rows),
            "chunk complete"
        );
        Ok(ChunkOutput {
            staged,
            processed: extracted.processed,
            skipped: extracted.skipped,
        })
    }

    fn publish(&self, run_id: RunId, outputs: Vec<ChunkOutput>) -> Result<RunOutcome> {
        let mut outcome = RunOutcome {
            run_id,
            partitions: Vec::new(),
            processed: Vec::new(),
            skipped: Vec::new(),
            rows: 0,
        };
        let mut pending = outputs.into_iter();
        while let Some(output) = pending.next() {
            if let Some(staged) = output.staged {
                let rows = staged.rows();
                match staged.publish() {
                    Ok(path) => {
                        outcome.partitions.push(path);
                        outcome.rows += rows;
                    }
                    Err(e) => {
                        tracing::error!(run_id = %run_id, error = %e, "publish failed; rolling back run");
                        remove_published(&outcome.partitions);
                        drop(pending);
                        return Err(e);
                    }
                }
            }
            outcome.processed.extend(output.processed);
            outcome.skipped.extend(output.skipped);
        }
        tracing::info!(
            run_id = %run_id,
            partitions = outcome.partitions.len(),
            rows = outcome.rows,
            skipped = outcome.skipped.len(),
            dir = %self.writer.dir().display(),
            "published run"
        );
        Ok(outcome)
    }
}

/// Run `work` once per chunk on a dedicated pool of `workers` threads, or
/// inline when there is a single chunk.
///
/// A panicking chunk becomes [`Error::WorkerPanic`]; the first failing chunk
/// raises the shared cancellation flag handed to every `work` call.
pub(crate) fn fan_out<T, F>(
    workers: usize,
    chunks: Vec<Vec<SourceItem>>,
    work: F,
) -> Result<Vec<Result<T>>>
where
    T: Send,
    F: Fn(usize, Vec<SourceItem>, &AtomicBool) -> Result<T> + Sync,
{
    let cancel = AtomicBool::new(false);
    let guarded = |chunk: usize, items: Vec<SourceItem>| {
        let result = catch_unwind(AssertUnwindSafe(|| work(chunk, items, &cancel)))
            .unwrap_or_else(|payload| {
                Err(Error::WorkerPanic {
                    chunk,
                    message: panic_message(payload.as_ref()),
                })
            });
        if result.is_err() {
            cancel.store(true, Ordering::SeqCst);
        }
        result
    };

    if chunks.len() <= 1 {
        return Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| guarded(i, chunk))
            .collect());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("strata-worker-{i}"))
        .build()?;
    Ok(pool.install(|| {
        chunks
            .into_par_iter()
            .enumerate()
            .map(|(i, chunk)| guarded(i, chunk))
            .collect()
    }))
}

/// Extract every item of one chunk into a single table seeded with `seed`.
///
/// Stops with [`Error::Cancelled`] before the next item once `cancel` is set.
pub(crate) fn extract_chunk(
    pipeline: &ExtractionPipeline,
    seed: &Schema,
    mode: ItemErrorMode,
    chunk: usize,
    items: Vec<SourceItem>,
    cancel: &AtomicBool,
) -> Result<ExtractedChunk> {
    let mut builder = TableBuilder::with_schema(seed.clone());
    let mut processed = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    for item in items {
        if cancel.load(Ordering::SeqCst) {
            return Err(Error::Cancelled(chunk));
        }
        match pipeline.run(&item) {
            Ok(records) => {
                builder.extend(records)?;
                processed.push(item);
            }
            Err(e @ Error::ExtractionFailure { .. }) if mode == ItemErrorMode::Skip => {
                let reason = format!("{:#}", anyhow::Error::from(e));
                tracing::warn!(chunk, item = %item.identity, %reason, "skipping item");
                skipped.push(SkippedItem {
                    identity: item.identity,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }
    let table = if processed.is_empty() {
        None
    } else {
        Some(builder.finish()?)
    };
    Ok(ExtractedChunk {
        table,
        processed,
        skipped,
    })
}

/// The first real error in chunk order, or every output when all succeeded.
pub(crate) fn collect_outputs<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut cancelled = None;
    let mut failure = None;
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(Error::Cancelled(chunk)) => {
                cancelled.get_or_insert(Error::Cancelled(chunk));
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    match failure.or(cancelled) {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}

/// Remove partitions already published by a run that is being rolled back.
pub(crate) fn remove_published(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partition");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
