use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use strata::{
    BuildConfig, ChangeDetection, Dataset, DatasetBuilder, Format, ItemErrorMode, extractors,
};

use crate::ExtractorKind;

pub struct BuildArgs {
    pub pattern: String,
    pub dest: PathBuf,
    pub config: Option<PathBuf>,
    pub incremental: bool,
    pub workers: Option<usize>,
    pub format: Option<Format>,
    pub extractor: ExtractorKind,
    pub content_hash: bool,
    pub skip_failed: bool,
    pub no_metadata: bool,
}

impl BuildArgs {
    fn resolve_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::from_json_file(path)
                .with_context(|| format!("load build config {}", path.display()))?,
            None => BuildConfig::default(),
        };
        if self.incremental {
            config.incremental = true;
        }
        if let Some(workers) = self.workers {
            config.workers = if workers == 0 { num_cpus::get() } else { workers };
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.content_hash {
            config.change_detection = ChangeDetection::ContentHash;
        }
        if self.skip_failed {
            config.on_item_error = ItemErrorMode::Skip;
        }
        if self.no_metadata {
            config.metadata = false;
        }
        Ok(config)
    }
}

pub fn build(args: BuildArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let extractor = match args.extractor {
        ExtractorKind::Jsonl => extractors::jsonl(),
        ExtractorKind::Json => extractors::json(),
    };
    let (dataset, report) = DatasetBuilder::new(args.pattern, extractor, &args.dest)
        .config(config)
        .build_with_report()
        .with_context(|| format!("build {}", args.dest.display()))?;

    match report.run_id {
        Some(run_id) => println!(
            "run {run_id}: {} of {} matched items processed, {} rows in {} partitions",
            report.processed,
            report.matched,
            report.rows,
            report.partitions.len()
        ),
        None => println!("{} is up to date ({} items)", dataset.root().display(), report.matched),
    }
    for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.identity, skipped.reason);
    }
    Ok(())
}

pub fn files(dest: &Path) -> Result<()> {
    let dataset = Dataset::open(dest)?;
    for file in dataset.files()? {
        println!("{}", file.display());
    }
    Ok(())
}

pub fn schema(dest: &Path) -> Result<()> {
    let dataset = Dataset::open(dest)?;
    for field in dataset.schema()?.fields() {
        println!("{}: {}", field.name, field.ty);
    }
    Ok(())
}

pub fn read(dest: &Path, limit: usize) -> Result<()> {
    let table = Dataset::open(dest)?.read()?;
    let total = table.num_rows();
    let shown = table.batch().slice(0, limit.min(total));
    println!("{}", pretty_format_batches(&[shown]).context("format rows")?);
    println!("{} of {total} rows", limit.min(total));
    Ok(())
}
