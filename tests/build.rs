use anyhow::Result;
use arrow::array::{Array, AsArray};
use arrow::datatypes::Float64Type;
use std::fs;
use strata::testing::*;
use strata::{
    BuildConfig, DatasetBuilder, Error, FieldType, Manifest, build_dataset, extractors, load_table,
};

fn pattern(dir: &std::path::Path) -> String {
    format!("{}/*.jsonl", dir.display())
}

#[cfg(feature = "io-parquet")]
#[test]
fn fresh_build_of_64_items() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 64, 256, 1)?;

    let dataset = build_dataset(
        &pattern(src.path()),
        extractors::jsonl(),
        &dest,
        BuildConfig::default(),
    )?;
    assert_eq!(dataset.files()?.len(), 1);

    let table = dataset.read()?;
    assert_eq!(table.shape(), (64 * 256, 7));
    assert_eq!(
        table.column_names(),
        vec!["file_path", "link_target", "mod_time", "a", "b", "c", "d"]
    );
    assert_eq!(table.schema().get("a"), Some(&FieldType::Int64));
    assert_eq!(table.schema().get("b"), Some(&FieldType::Float64));
    assert_eq!(table.schema().get("c"), Some(&FieldType::Utf8));
    assert_eq!(
        table.schema().get("d"),
        Some(&FieldType::List(Box::new(FieldType::Float64)))
    );

    let manifest = Manifest::load(&dest)?;
    assert_eq!(manifest.len(), 64);
    assert_eq!(manifest.runs().len(), 1);
    assert_eq!(manifest.runs()[0].rows, 64 * 256);
    assert_no_staging_files(&dest);
    Ok(())
}

#[test]
fn metadata_columns_describe_the_item() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let files = random_jsonl_batch(src.path(), 2, 3, 5)?;

    let dataset = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .build()?;
    let table = dataset.read()?;
    assert_eq!(table.num_rows(), 6);

    let paths = table.column("file_path").map(|c| c.as_string::<i32>().clone());
    let paths = paths.ok_or_else(|| anyhow::anyhow!("file_path missing"))?;
    let first = std::path::absolute(&files[0])?;
    assert_eq!(paths.value(0), first.display().to_string());
    assert_eq!(paths.value(5), std::path::absolute(&files[1])?.display().to_string());

    let links = table.column("link_target").ok_or_else(|| anyhow::anyhow!("link_target missing"))?;
    assert_eq!(links.null_count(), 6);

    let mod_time = table
        .column("mod_time")
        .ok_or_else(|| anyhow::anyhow!("mod_time missing"))?
        .as_primitive::<Float64Type>();
    assert!(mod_time.value(0) > 0.0);
    Ok(())
}

#[test]
fn metadata_can_be_disabled() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    random_jsonl_batch(src.path(), 1, 4, 5)?;
    let dataset = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .metadata(false)
        .build()?;
    assert_eq!(dataset.read()?.column_names(), vec!["a", "b", "c", "d"]);
    Ok(())
}

#[test]
fn rebuilding_an_established_destination_is_rejected() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 4, 8, 2)?;
    build_dataset(&pattern(src.path()), extractors::jsonl(), &dest, BuildConfig::default())?;

    let before = dir_entries(&dest);
    let manifest_before = fs::read(Manifest::path(&dest))?;
    random_jsonl_batch(src.path(), 6, 8, 50)?;

    let err = build_dataset(&pattern(src.path()), extractors::jsonl(), &dest, BuildConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(ref p) if *p == dest));
    assert_eq!(dir_entries(&dest), before);
    assert_eq!(fs::read(Manifest::path(&dest))?, manifest_before);
    Ok(())
}

#[test]
fn zero_matches_still_establish_the_destination() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");

    let (dataset, report) = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), &dest)
        .build_with_report()?;
    assert_eq!(report.matched, 0);
    assert!(report.partitions.is_empty());
    assert!(dataset.files()?.is_empty());
    assert_eq!(dataset.read()?.num_rows(), 0);
    assert!(Manifest::is_established(&dest));

    let again = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), &dest).build();
    assert!(matches!(again, Err(Error::AlreadyExists(_))));
    Ok(())
}

#[test]
fn failed_fresh_build_leaves_no_destination() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 3, 8, 2)?;

    let err = DatasetBuilder::new(pattern(src.path()), failing_jsonl("batch-0001"), &dest)
        .build()
        .unwrap_err();
    match err {
        Error::ExtractionFailure { item, .. } => assert!(item.ends_with("batch-0001.jsonl")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn invalid_pattern_is_reported() -> Result<()> {
    let out = tempfile::tempdir()?;
    let err = DatasetBuilder::new("src/[", extractors::jsonl(), out.path().join("ds"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Pattern { .. }));
    Ok(())
}

#[test]
fn zero_workers_is_invalid() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let err = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .workers(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(!out.path().join("ds").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinked_sources_record_their_target() -> Result<()> {
    let src = tempfile::tempdir()?;
    let store = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let real = store.path().join("real.data");
    write_random_jsonl(&real, 2, 9)?;
    std::os::unix::fs::symlink(&real, src.path().join("linked.jsonl"))?;

    let table = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), out.path().join("ds"))
        .build()?
        .read()?;
    let links = table
        .column("link_target")
        .ok_or_else(|| anyhow::anyhow!("link_target missing"))?
        .as_string::<i32>();
    assert_eq!(links.value(0), real.display().to_string());
    assert_eq!(links.value(1), real.display().to_string());
    Ok(())
}

#[test]
fn failed_manifest_commit_removes_the_run_partitions() -> Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    let dest = out.path().join("ds");
    random_jsonl_batch(src.path(), 4, 8, 2)?;
    // A directory where the manifest belongs makes the final replace fail.
    fs::create_dir_all(Manifest::path(&dest))?;

    let err = DatasetBuilder::new(pattern(src.path()), extractors::jsonl(), &dest)
        .workers(2)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(dir_entries(&dest), vec![strata::manifest::MANIFEST_FILE.to_string()]);
    assert!(Manifest::path(&dest).is_dir());
    Ok(())
}

#[test]
fn load_table_of_64_items() -> Result<()> {
    let src = tempfile::tempdir()?;
    random_jsonl_batch(src.path(), 64, 256, 1)?;

    let table = load_table(&pattern(src.path()), extractors::jsonl(), &BuildConfig::default())?;
    assert_eq!(table.shape(), (16384, 7));
    assert_eq!(
        table.column_names(),
        vec!["file_path", "link_target", "mod_time", "a", "b", "c", "d"]
    );

    let parallel = load_table(
        &pattern(src.path()),
        extractors::jsonl(),
        &BuildConfig {
            workers: 3,
            ..BuildConfig::default()
        },
    )?;
    assert_tables_equal(&parallel, &table);
    Ok(())
}

#[test]
fn load_table_without_matches_keeps_metadata_columns() -> Result<()> {
    let src = tempfile::tempdir()?;
    let table = load_table(&pattern(src.path()), extractors::jsonl(), &BuildConfig::default())?;
    assert_eq!(table.shape(), (0, 3));

    let err = load_table(
        &pattern(src.path()),
        extractors::jsonl(),
        &BuildConfig {
            workers: 0,
            ..BuildConfig::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    Ok(())
}
