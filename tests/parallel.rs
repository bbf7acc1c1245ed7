use anyhow::Result;
use std::path::Path;
use strata::testing::*;
use strata::{DatasetBuilder, Error, Format, Manifest, extractors};

fn pattern(dir: &Path) -> String {
    format!("{}/*.jsonl", dir.display())
}

#[test]
fn two_workers_write_two_partitions_with_the_same_rows() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    random_jsonl_batch(src.path(), 16, 32, 11)?;

    let serial = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("one"))
        .build()?;
    let parallel = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("two"))
        .workers(2)
        .build()?;

    assert_eq!(serial.files()?.len(), 1);
    assert_eq!(parallel.files()?.len(), 2);
    for (i, file) in parallel.files()?.iter().enumerate() {
        assert_eq!(parallel.read_partition(file)?.num_rows(), 8 * 32, "partition {i}");
    }
    assert_tables_equal(&parallel.read()?, &serial.read()?);
    Ok(())
}

#[test]
fn more_workers_than_items() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    random_jsonl_batch(src.path(), 3, 4, 11)?;
    let (dataset, report) = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .workers(8)
        .build_with_report()?;
    assert_eq!(report.partitions.len(), 3);
    assert_eq!(dataset.files()?, report.partitions);
    assert_eq!(dataset.num_rows()?, 12);
    Ok(())
}

#[test]
fn uneven_items_are_balanced() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    random_jsonl_batch(src.path(), 7, 1, 11)?;
    let dataset = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .workers(4)
        .build()?;
    let rows: Vec<usize> = dataset
        .files()?
        .iter()
        .map(|f| dataset.read_partition(f).map(|t| t.num_rows()))
        .collect::<strata::Result<_>>()?;
    assert_eq!(rows, vec![2, 2, 2, 1]);
    Ok(())
}

#[test]
fn one_failing_chunk_discards_the_whole_run() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 8, 16, 3)?;
    let first = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), &dest)
        .workers(4)
        .build()?;
    let entries = dir_entries(&dest);
    let manifest = Manifest::load(&dest)?;

    random_jsonl_batch(src.path().join("more"), 8, 16, 300)?;
    let more = format!("{}/**/*.jsonl", src.path().display());
    let err = DatasetBuilder::new(more, failing_jsonl("more/batch-0005"), &dest)
        .incremental(true)
        .workers(4)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::ExtractionFailure { ref item, .. } if item.contains("batch-0005")));

    assert_eq!(dir_entries(&dest), entries);
    assert_eq!(Manifest::load(&dest)?, manifest);
    assert_eq!(first.num_rows()?, 8 * 16);
    Ok(())
}

#[test]
fn worker_panics_are_reported_and_contained() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 6, 4, 3)?;

    let err = DatasetBuilder::new(pattern(src.path()), panicking_jsonl("batch-0004"), &dest)
        .workers(3)
        .build()
        .unwrap_err();
    match err {
        Error::WorkerPanic { chunk, message } => {
            assert_eq!(chunk, 2);
            assert!(message.contains("batch-0004"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
    Ok(())
}

#[cfg(feature = "io-ipc")]
#[test]
fn parallel_ipc_build() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 5, 10, 21)?;
    let dataset = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), &dest)
        .workers(2)
        .format(Format::Ipc)
        .build()?;
    assert_eq!(dataset.files()?.len(), 2);
    assert_eq!(Manifest::load(&dest)?.format(), Format::Ipc);
    assert_eq!(strata::Dataset::open(&dest)?.read()?.shape(), (50, 7));
    Ok(())
}
