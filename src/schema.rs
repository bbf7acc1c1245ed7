//! Column schemas and the type-widening rules shared by table building and
//! read-time reconciliation.
//!
//! A [`Schema`] lists fields in first-seen order. Each field carries the
//! narrowest [`FieldType`] consistent with every value observed for it. Types
//! only ever widen along these edges:
//!
//! - `null` → any type (a field seen only as null so far)
//! - `int64` → `float64`
//! - `list<A>` → `list<B>` when `A` widens to `B`
//! - `struct<..>` → `struct<..>` with the union of fields, each widened
//!
//! Every other combination is a [`SchemaConflict`](crate::Error::SchemaConflict).
//! The same rules apply within one batch of records and across partitions at
//! read time.

use crate::error::{Error, Result};
use crate::record::{Record, Value};
use arrow::datatypes::{DataType, Field as ArrowField, Fields, Schema as ArrowSchema};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Inferred type of a column or nested value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Only nulls observed so far.
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    List(Box<FieldType>),
    Struct(Schema),
}

impl FieldType {
    /// Infer the type of a single value. `path` names the value in errors.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] if a list mixes incompatible element types
    /// or a nested record contains such a list.
    pub fn of(value: &Value, path: &str) -> Result<Self> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Int(_) => Self::Int64,
            Value::Float(_) => Self::Float64,
            Value::Str(_) => Self::Utf8,
            Value::List(items) => {
                let elem_path = format!("{path}[]");
                let mut elem = Self::Null;
                for item in items {
                    elem = elem.unify(&Self::of(item, &elem_path)?, &elem_path)?;
                }
                Self::List(Box::new(elem))
            }
            Value::Map(rec) => {
                let mut nested = Schema::new();
                nested.observe_at(rec, path)?;
                Self::Struct(nested)
            }
        })
    }

    /// Widen `self` and `other` to their least common type.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] when no common type exists.
    pub fn unify(&self, other: &Self, path: &str) -> Result<Self> {
        match (self, other) {
            (Self::Null, t) | (t, Self::Null) => Ok(t.clone()),
            (a, b) if a == b => Ok(a.clone()),
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Ok(Self::Float64),
            (Self::List(a), Self::List(b)) => {
                Ok(Self::List(Box::new(a.unify(b, &format!("{path}[]"))?)))
            }
            (Self::Struct(a), Self::Struct(b)) => {
                let mut merged = a.clone();
                merged.merge_at(b, path)?;
                Ok(Self::Struct(merged))
            }
            (a, b) => Err(Error::conflict(path, a, b)),
        }
    }

    /// Arrow data type used to materialize this type.
    #[must_use]
    pub fn to_arrow(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean => DataType::Boolean,
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::Utf8 => DataType::Utf8,
            Self::List(elem) => DataType::List(Arc::new(ArrowField::new_list_field(
                elem.to_arrow(),
                true,
            ))),
            Self::Struct(schema) => DataType::Struct(schema.to_arrow_fields()),
        }
    }

    /// Map an Arrow data type back to a [`FieldType`].
    ///
    /// Narrower integer and float widths collapse to 64 bits; string variants
    /// collapse to `utf8`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for types with no counterpart.
    pub fn from_arrow(dt: &DataType) -> Result<Self> {
        Ok(match dt {
            DataType::Null => Self::Null,
            DataType::Boolean => Self::Boolean,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Self::Int64,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Self::Float64,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Self::Utf8,
            DataType::List(f) | DataType::LargeList(f) => {
                Self::List(Box::new(Self::from_arrow(f.data_type())?))
            }
            DataType::Struct(fields) => Self::Struct(Schema::from_arrow_fields(fields)?),
            other => return Err(Error::UnsupportedType(other.to_string())),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean => f.write_str("boolean"),
            Self::Int64 => f.write_str("int64"),
            Self::Float64 => f.write_str("float64"),
            Self::Utf8 => f.write_str("utf8"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Struct(schema) => {
                f.write_str("struct<")?;
                for (i, field) in schema.fields().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered field → type mapping; column order is first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from fields; later duplicates widen earlier ones.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] if duplicate names carry incompatible types.
    pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Result<Self> {
        let mut schema = Self::new();
        for field in fields {
            let path = field.name.clone();
            schema.observe_field(field.name, &field.ty, &path)?;
        }
        Ok(schema)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.index_of(name).map(|i| &self.fields[i].ty)
    }

    /// Widen this schema with every field of `record`, appending unseen fields
    /// in the record's order.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] on the first incompatible field.
    pub fn observe(&mut self, record: &Record) -> Result<()> {
        self.observe_at(record, "")
    }

    /// Widen this schema with every field of `other` (read-time reconciliation).
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] on the first incompatible field.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        self.merge_at(other, "")
    }

    /// Non-mutating [`merge`](Self::merge).
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] on the first incompatible field.
    pub fn merged(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.merge(other)?;
        Ok(out)
    }

    /// Widen (or append) one field and return its column index.
    ///
    /// # Errors
    /// Returns [`Error::SchemaConflict`] if `ty` cannot be unified with the current type.
    pub fn observe_field(&mut self, name: String, ty: &FieldType, path: &str) -> Result<usize> {
        if let Some(&i) = self.index.get(&name) {
            let current = &self.fields[i].ty;
            if current != ty {
                self.fields[i].ty = current.unify(ty, path)?;
            }
            return Ok(i);
        }
        let i = self.fields.len();
        self.index.insert(name.clone(), i);
        self.fields.push(Field::new(name, ty.clone()));
        Ok(i)
    }

    pub(crate) fn observe_at(&mut self, record: &Record, prefix: &str) -> Result<()> {
        for (name, value) in record.iter() {
            let path = join_path(prefix, name);
            let ty = FieldType::of(value, &path)?;
            self.observe_field(name.to_string(), &ty, &path)?;
        }
        Ok(())
    }

    fn merge_at(&mut self, other: &Self, prefix: &str) -> Result<()> {
        for field in &other.fields {
            let path = join_path(prefix, &field.name);
            self.observe_field(field.name.clone(), &field.ty, &path)?;
        }
        Ok(())
    }

    /// Arrow fields for this schema; every column is nullable.
    #[must_use]
    pub fn to_arrow_fields(&self) -> Fields {
        self.fields
            .iter()
            .map(|f| ArrowField::new(&f.name, f.ty.to_arrow(), true))
            .collect()
    }

    #[must_use]
    pub fn to_arrow(&self) -> ArrowSchema {
        ArrowSchema::new(self.to_arrow_fields())
    }

    /// # Errors
    /// Returns [`Error::UnsupportedType`] for columns with no [`FieldType`] counterpart.
    pub fn from_arrow(schema: &ArrowSchema) -> Result<Self> {
        Self::from_arrow_fields(schema.fields())
    }

    fn from_arrow_fields(fields: &Fields) -> Result<Self> {
        Self::from_fields(
            fields
                .iter()
                .map(|f| FieldType::from_arrow(f.data_type()).map(|ty| Field::new(f.name(), ty)))
                .collect::<Result<Vec<_>>>()?,
        )
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
