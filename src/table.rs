//! In-memory tables and the single-pass [`TableBuilder`].
//!
//! The builder walks a record stream once. Every unseen field is appended to
//! the schema (earlier rows are backfilled with null), every value is checked
//! against the current column type and may widen it, and rows missing a field
//! get null. [`TableBuilder::finish`] turns the accumulated columns into an
//! Arrow [`RecordBatch`] laid out in schema order.

use crate::arrow_utils::{build_array, conform_array};
use crate::error::Result;
use crate::record::{Record, Value};
use crate::schema::{FieldType, Schema};
use arrow::array::{ArrayRef, new_null_array};
use arrow::compute::concat_batches;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// An immutable table: a [`Schema`] plus its Arrow materialization.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    batch: RecordBatch,
}

impl Table {
    /// A table with no columns and no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema: Schema::new(),
            batch: RecordBatch::new_empty(Arc::new(Schema::new().to_arrow())),
        }
    }

    /// Wrap an Arrow batch, deriving the [`Schema`] from its Arrow schema.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`](crate::Error::UnsupportedType) if a
    /// column type has no [`FieldType`] counterpart.
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        let schema = Schema::from_arrow(batch.schema_ref())?;
        Ok(Self { schema, batch })
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    /// `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.names().collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.schema.index_of(name).map(|i| self.batch.column(i))
    }

    /// Reshape this table to `target`, a superset of its schema: columns are
    /// reordered to `target`'s order, missing columns become null, and widened
    /// columns are cast.
    ///
    /// # Errors
    /// Returns an error if a column cannot be represented in the target type.
    pub fn conform_to(&self, target: &Schema) -> Result<RecordBatch> {
        let rows = self.num_rows();
        let mut columns = Vec::with_capacity(target.len());
        for field in target.fields() {
            let column = match self.column(&field.name) {
                Some(col) => conform_array(col, &field.ty)?,
                None => new_null_array(&field.ty.to_arrow(), rows),
            };
            columns.push(column);
        }
        Ok(RecordBatch::try_new_with_options(
            Arc::new(target.to_arrow()),
            columns,
            &RecordBatchOptions::new().with_row_count(Some(rows)),
        )?)
    }

    /// Concatenate tables in order under the union of their schemas.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`](crate::Error::SchemaConflict) if the
    /// schemas cannot be reconciled.
    pub fn concat(tables: &[Self]) -> Result<Self> {
        let mut union = Schema::new();
        for table in tables {
            union.merge(table.schema())?;
        }
        let batches = tables
            .iter()
            .map(|t| t.conform_to(&union))
            .collect::<Result<Vec<_>>>()?;
        let batch = concat_batches(&Arc::new(union.to_arrow()), &batches)?;
        Ok(Self {
            schema: union,
            batch,
        })
    }
}

/// Single-pass schema inference and column accumulation.
#[derive(Debug, Default)]
pub struct TableBuilder {
    schema: Schema,
    columns: Vec<Vec<Value>>,
    rows: usize,
}

impl TableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known schema. Its fields come first and keep their types
    /// unless observed values widen them.
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        let columns = vec![Vec::new(); schema.len()];
        Self {
            schema,
            columns,
            rows: 0,
        }
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.rows
    }

    /// Validate `record` against the schema, widening it as needed, and append
    /// it as one row.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`](crate::Error::SchemaConflict) if a
    /// value is incompatible with its column's current type.
    pub fn push(&mut self, record: Record) -> Result<()> {
        for (name, value) in record {
            let ty = FieldType::of(&value, &name)?;
            let path = name.clone();
            let idx = self.schema.observe_field(name, &ty, &path)?;
            if idx == self.columns.len() {
                let mut column = Vec::with_capacity(self.rows + 1);
                column.resize(self.rows, Value::Null);
                self.columns.push(column);
            }
            self.columns[idx].push(value);
        }
        self.rows += 1;
        for column in &mut self.columns {
            if column.len() < self.rows {
                column.push(Value::Null);
            }
        }
        Ok(())
    }

    /// [`push`](Self::push) every record of `records`.
    ///
    /// # Errors
    /// Stops at the first schema conflict.
    pub fn extend<I: IntoIterator<Item = Record>>(&mut self, records: I) -> Result<()> {
        records.into_iter().try_for_each(|r| self.push(r))
    }

    /// Materialize the accumulated rows.
    ///
    /// # Errors
    /// Returns an error if Arrow rejects the assembled columns.
    pub fn finish(self) -> Result<Table> {
        let mut arrays = Vec::with_capacity(self.columns.len());
        for (field, values) in self.schema.fields().iter().zip(&self.columns) {
            let refs: Vec<&Value> = values.iter().collect();
            arrays.push(build_array(&field.ty, &refs, &field.name)?);
        }
        let batch = RecordBatch::try_new_with_options(
            Arc::new(self.schema.to_arrow()),
            arrays,
            &RecordBatchOptions::new().with_row_count(Some(self.rows)),
        )?;
        Ok(Table {
            schema: self.schema,
            batch,
        })
    }
}

/// Build a table from a record stream in one pass.
///
/// # Errors
/// Returns [`Error::SchemaConflict`](crate::Error::SchemaConflict) on the first
/// incompatible value.
pub fn build_table<I: IntoIterator<Item = Record>>(records: I) -> Result<Table> {
    let mut builder = TableBuilder::new();
    builder.extend(records)?;
    builder.finish()
}
