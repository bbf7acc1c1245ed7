//! Parquet partition backend.
//!
//! Tables are written with `parquet::arrow::ArrowWriter`, which embeds the
//! Arrow schema in the file metadata, so decoding restores list and struct
//! columns exactly. Reads go through `ParquetRecordBatchReaderBuilder` over an
//! in-memory [`Bytes`] buffer and are concatenated into one batch.
//!
//! Parquet cannot store a struct without fields, so every field-less struct
//! column (at any depth) is written with a single all-null placeholder child
//! named [`EMPTY_STRUCT_FIELD`], which is removed again on read.

use super::StorageBackend;
use crate::table::Table;
use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, AsArray, ListArray, StructArray, new_null_array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Fields, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

/// Placeholder child that stands in for the fields of an empty struct.
pub const EMPTY_STRUCT_FIELD: &str = "__strata_empty";

/// Writes one table per Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetBackend {
    compression: Compression,
    batch_size: usize,
}

impl Default for ParquetBackend {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            batch_size: 64 * 1024,
        }
    }
}

impl ParquetBackend {
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

impl StorageBackend for ParquetBackend {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>> {
        let batch = &reshape_batch(table.batch(), Reshape::Pad)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .build();
        let mut buf = Vec::new();
        let mut writer =
            ArrowWriter::try_new(&mut buf, batch.schema(), Some(props)).context("create ArrowWriter")?;
        // A zero-row batch still records the schema.
        writer.write(batch).context("write batch to parquet")?;
        writer.close().context("close ArrowWriter")?;
        Ok(buf)
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Table> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
            .context("open ParquetRecordBatchReader")?;
        let schema = builder.schema().clone();
        let reader = builder
            .with_batch_size(self.batch_size)
            .build()
            .context("build ParquetRecordBatchReader")?;
        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            .context("read parquet batches")?;
        let batch = concat_batches(&schema, &batches).context("concatenate parquet batches")?;
        Ok(Table::from_batch(reshape_batch(&batch, Reshape::Strip)?)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reshape {
    /// Give field-less structs the placeholder child.
    Pad,
    /// Turn structs holding only the placeholder back into field-less structs.
    Strip,
}

fn reshape_batch(batch: &RecordBatch, mode: Reshape) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| reshape(c, mode))
        .collect::<Result<Vec<_>>>()?;
    let fields: Fields = batch
        .schema()
        .fields()
        .iter()
        .zip(&columns)
        .map(|(f, c)| f.as_ref().clone().with_data_type(c.data_type().clone()))
        .collect();
    RecordBatch::try_new_with_options(
        Arc::new(ArrowSchema::new(fields)),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
    )
    .context("reshape empty struct columns")
}

fn is_placeholder(fields: &Fields) -> bool {
    fields.len() == 1 && fields[0].name() == EMPTY_STRUCT_FIELD
}

fn reshape(array: &ArrayRef, mode: Reshape) -> Result<ArrayRef> {
    Ok(match array.data_type() {
        DataType::Struct(fields) if fields.is_empty() => match mode {
            Reshape::Pad => Arc::new(StructArray::try_new(
                Fields::from(vec![Field::new(EMPTY_STRUCT_FIELD, DataType::Boolean, true)]),
                vec![new_null_array(&DataType::Boolean, array.len())],
                array.nulls().cloned(),
            )?),
            Reshape::Strip => Arc::clone(array),
        },
        DataType::Struct(fields) if is_placeholder(fields) && mode == Reshape::Strip => Arc::new(
            StructArray::new_empty_fields(array.len(), array.nulls().cloned()),
        ),
        DataType::Struct(_) => {
            let (fields, columns, nulls) = array.as_struct().clone().into_parts();
            let columns = columns
                .iter()
                .map(|c| reshape(c, mode))
                .collect::<Result<Vec<_>>>()?;
            let fields: Fields = fields
                .iter()
                .zip(&columns)
                .map(|(f, c)| f.as_ref().clone().with_data_type(c.data_type().clone()))
                .collect();
            Arc::new(StructArray::try_new(fields, columns, nulls)?)
        }
        DataType::List(field) => {
            let list = array.as_list::<i32>();
            let values = reshape(list.values(), mode)?;
            let field = Arc::new(field.as_ref().clone().with_data_type(values.data_type().clone()));
            Arc::new(ListArray::try_new(
                field,
                list.offsets().clone(),
                values,
                list.nulls().cloned(),
            )?)
        }
        _ => Arc::clone(array),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, Value};
    use crate::schema::FieldType;
    use crate::table::build_table;

    #[test]
    fn nested_columns_survive_a_round_trip() -> anyhow::Result<()> {
        let table = build_table(vec![
            Record::new()
                .with("a", 1)
                .with("d", vec![0.5, 1.5])
                .with("m", Record::new().with("k", "v")),
            Record::new().with("a", Value::Null).with("d", Vec::<f64>::new()),
        ])?;
        let backend = ParquetBackend::default();
        let back = backend.decode(backend.encode(&table)?)?;
        assert_eq!(back.schema(), table.schema());
        assert_eq!(back.num_rows(), 2);
        assert_eq!(
            back.schema().get("d"),
            Some(&FieldType::List(Box::new(FieldType::Float64)))
        );
        Ok(())
    }

    #[test]
    fn empty_records_survive_a_round_trip() -> anyhow::Result<()> {
        let table = build_table(vec![
            Record::new()
                .with("x", 1)
                .with("m", Record::new())
                .with("l", vec![Record::new()]),
            Record::new().with("x", 2).with("m", Value::Null),
        ])?;
        assert_eq!(
            table.schema().get("m"),
            Some(&FieldType::Struct(crate::schema::Schema::new()))
        );

        let backend = ParquetBackend::default();
        let back = backend.decode(backend.encode(&table)?)?;
        assert_eq!(back.schema(), table.schema());
        assert_eq!(back.num_rows(), 2);
        let m = back.column("m").ok_or_else(|| anyhow::anyhow!("m missing"))?;
        assert!(!m.is_null(0));
        assert!(m.is_null(1));
        let l = back.column("l").ok_or_else(|| anyhow::anyhow!("l missing"))?;
        assert_eq!(l.as_list::<i32>().value_length(0), 1);
        Ok(())
    }

    #[test]
    fn empty_table_keeps_schema() -> anyhow::Result<()> {
        let mut builder = crate::table::TableBuilder::with_schema(crate::schema::Schema::from_fields([
            crate::schema::Field::new("x", FieldType::Utf8),
        ])?);
        builder.extend(std::iter::empty())?;
        let table = builder.finish()?;
        let backend = ParquetBackend::default().with_compression(Compression::UNCOMPRESSED);
        let back = backend.decode(backend.encode(&table)?)?;
        assert_eq!(back.shape(), (0, 1));
        Ok(())
    }
}
