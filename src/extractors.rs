//! Built-in extractors for JSON sources.

use crate::extract::Extractor;
use crate::io::jsonl::JsonlRecords;
use crate::record::Record;
use crate::source::SourceItem;
use anyhow::Context;
use std::io::BufReader;

/// One record per non-blank line of a JSON Lines file.
#[must_use]
pub fn jsonl() -> Extractor {
    Extractor::stream(|item: &SourceItem| JsonlRecords::open(&item.path))
}

/// One record per file; the document must be a JSON object.
#[must_use]
pub fn json() -> Extractor {
    Extractor::single(|item: &SourceItem| {
        let reader = BufReader::new(item.open().with_context(|| format!("open {}", item.identity))?);
        let doc: serde_json::Value = serde_json::from_reader(reader)
            .with_context(|| format!("parse JSON document {}", item.identity))?;
        Record::try_from(doc).with_context(|| format!("convert {}", item.identity))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionPipeline;
    use crate::record::Value;
    use crate::source::ChangeDetection;
    use std::fs;

    #[test]
    fn jsonl_yields_each_line() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.jsonl");
        fs::write(&path, "{\"n\":1}\n{\"n\":2}\n")?;
        let item = SourceItem::from_path(&path, ChangeDetection::ModifiedTime)?;
        let records = ExtractionPipeline::new(jsonl()).with_metadata(false).run(&item)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("n"), Some(&Value::Int(2)));
        Ok(())
    }

    #[test]
    fn json_requires_an_object() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, "{\"k\": {\"v\": true}}")?;
        fs::write(&bad, "[1]")?;
        let pipeline = ExtractionPipeline::new(json());

        let item = SourceItem::from_path(&good, ChangeDetection::ModifiedTime)?;
        let records = pipeline.run(&item)?;
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].get("k"), Some(Value::Map(_))));

        let item = SourceItem::from_path(&bad, ChangeDetection::ModifiedTime)?;
        assert!(matches!(
            pipeline.run(&item),
            Err(crate::Error::ExtractionFailure { .. })
        ));
        Ok(())
    }
}
