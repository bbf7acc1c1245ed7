//! Arrow array construction from record values, and conforming existing arrays
//! to a wider schema.

use crate::error::{Error, Result};
use crate::record::Value;
use crate::schema::{FieldType, Schema};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray, NullArray, StringArray,
    StructArray, new_null_array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field as ArrowField};
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Materialize `values` as one Arrow array of type `ty`.
///
/// Values are expected to have been validated against `ty` already; integers in
/// a `float64` column are converted.
///
/// # Errors
/// Returns [`Error::SchemaConflict`] if a value does not fit `ty`.
pub fn build_array(ty: &FieldType, values: &[&Value], path: &str) -> Result<ArrayRef> {
    Ok(match ty {
        FieldType::Null => Arc::new(NullArray::new(values.len())),
        FieldType::Boolean => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Ok(Some(*b)),
                    Value::Null => Ok(None),
                    other => Err(mismatch(ty, other, path)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        FieldType::Int64 => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Ok(Some(*i)),
                    Value::Null => Ok(None),
                    other => Err(mismatch(ty, other, path)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        FieldType::Float64 => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Ok(Some(*f)),
                    #[allow(clippy::cast_precision_loss)]
                    Value::Int(i) => Ok(Some(*i as f64)),
                    Value::Null => Ok(None),
                    other => Err(mismatch(ty, other, path)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        FieldType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(Some(s.as_str())),
                    Value::Null => Ok(None),
                    other => Err(mismatch(ty, other, path)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        FieldType::List(elem) => build_list(elem, values, path)?,
        FieldType::Struct(schema) => build_struct(schema, values, path)?,
    })
}

fn build_list(elem: &FieldType, values: &[&Value], path: &str) -> Result<ArrayRef> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut validity = Vec::with_capacity(values.len());
    let mut children: Vec<&Value> = Vec::new();
    for v in values {
        match v {
            Value::List(items) => {
                lengths.push(items.len());
                validity.push(true);
                children.extend(items.iter());
            }
            Value::Null => {
                lengths.push(0);
                validity.push(false);
            }
            other => return Err(mismatch(&FieldType::List(Box::new(elem.clone())), other, path)),
        }
    }
    let child = build_array(elem, &children, &format!("{path}[]"))?;
    let field = Arc::new(ArrowField::new_list_field(elem.to_arrow(), true));
    Ok(Arc::new(ListArray::try_new(
        field,
        OffsetBuffer::from_lengths(lengths),
        child,
        null_buffer(validity),
    )?))
}

fn build_struct(schema: &Schema, values: &[&Value], path: &str) -> Result<ArrayRef> {
    let mut validity = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Map(_) => validity.push(true),
            Value::Null => validity.push(false),
            other => {
                return Err(mismatch(&FieldType::Struct(schema.clone()), other, path));
            }
        }
    }
    let nulls = null_buffer(validity);
    if schema.is_empty() {
        return Ok(Arc::new(StructArray::new_empty_fields(values.len(), nulls)));
    }
    let mut columns = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let child: Vec<&Value> = values
            .iter()
            .map(|v| match v {
                Value::Map(rec) => rec.get(&field.name).unwrap_or(&NULL),
                _ => &NULL,
            })
            .collect();
        columns.push(build_array(&field.ty, &child, &format!("{path}.{}", field.name))?);
    }
    Ok(Arc::new(StructArray::try_new(
        schema.to_arrow_fields(),
        columns,
        nulls,
    )?))
}

/// Reshape `array` so its data type is exactly `target`'s Arrow type.
///
/// Struct children are matched by name (missing children become null), list
/// values are conformed element-wise, and scalar widenings go through Arrow's
/// cast kernel.
///
/// # Errors
/// Returns an error if the array cannot be represented as `target`.
pub fn conform_array(array: &ArrayRef, target: &FieldType) -> Result<ArrayRef> {
    let dt = target.to_arrow();
    if array.data_type() == &dt {
        return Ok(Arc::clone(array));
    }
    match target {
        FieldType::List(elem) => {
            if let Some(list) = array.as_any().downcast_ref::<ListArray>() {
                let values = conform_array(list.values(), elem)?;
                let field = Arc::new(ArrowField::new_list_field(elem.to_arrow(), true));
                return Ok(Arc::new(ListArray::try_new(
                    field,
                    list.offsets().clone(),
                    values,
                    list.nulls().cloned(),
                )?));
            }
        }
        FieldType::Struct(schema) => {
            let Some(st) = array.as_any().downcast_ref::<StructArray>() else {
                return new_null_or_fail(array, &dt);
            };
            let mut columns = Vec::with_capacity(schema.len());
            for field in schema.fields() {
                let column = match st.column_by_name(&field.name) {
                    Some(child) => conform_array(child, &field.ty)?,
                    None => new_null_array(&field.ty.to_arrow(), st.len()),
                };
                columns.push(column);
            }
            if columns.is_empty() {
                return Ok(Arc::new(StructArray::new_empty_fields(
                    st.len(),
                    st.nulls().cloned(),
                )));
            }
            return Ok(Arc::new(StructArray::try_new(
                schema.to_arrow_fields(),
                columns,
                st.nulls().cloned(),
            )?));
        }
        _ => {}
    }
    Ok(cast(array, &dt)?)
}

/// An all-null source array can take any shape; anything else cannot become a struct.
fn new_null_or_fail(array: &ArrayRef, dt: &DataType) -> Result<ArrayRef> {
    let all_null = array.data_type() == &DataType::Null
        || array
            .logical_nulls()
            .is_some_and(|n| n.null_count() == array.len());
    if all_null {
        Ok(new_null_array(dt, array.len()))
    } else {
        Err(Error::UnsupportedType(format!(
            "cannot conform {} to {dt}",
            array.data_type()
        )))
    }
}

fn null_buffer(validity: Vec<bool>) -> Option<NullBuffer> {
    if validity.iter().all(|v| *v) {
        None
    } else {
        Some(NullBuffer::from(validity))
    }
}

fn mismatch(expected: &FieldType, found: &Value, path: &str) -> Error {
    let found = FieldType::of(found, path).unwrap_or(FieldType::Null);
    Error::conflict(path, expected, &found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::schema::Field;
    use arrow::array::AsArray;
    use arrow::datatypes::{Float64Type, Int64Type};

    #[test]
    fn float_column_accepts_ints() -> anyhow::Result<()> {
        let vals = [Value::Int(2), Value::Null, Value::Float(0.5)];
        let refs: Vec<&Value> = vals.iter().collect();
        let arr = build_array(&FieldType::Float64, &refs, "x")?;
        let f = arr.as_primitive::<Float64Type>();
        assert_eq!(f.value(0), 2.0);
        assert!(f.is_null(1));
        assert_eq!(f.value(2), 0.5);
        Ok(())
    }

    #[test]
    fn list_nulls_and_offsets() -> anyhow::Result<()> {
        let vals = [
            Value::from(vec![1i64, 2]),
            Value::Null,
            Value::List(vec![]),
            Value::from(vec![3i64]),
        ];
        let refs: Vec<&Value> = vals.iter().collect();
        let ty = FieldType::List(Box::new(FieldType::Int64));
        let arr = build_array(&ty, &refs, "l")?;
        let list = arr.as_list::<i32>();
        assert_eq!(list.len(), 4);
        assert!(list.is_null(1));
        assert_eq!(list.value_length(0), 2);
        assert_eq!(list.value_length(2), 0);
        assert_eq!(list.value(3).as_primitive::<Int64Type>().value(0), 3);
        Ok(())
    }

    #[test]
    fn struct_missing_children_are_null() -> anyhow::Result<()> {
        let schema = Schema::from_fields([
            Field::new("a", FieldType::Int64),
            Field::new("b", FieldType::Utf8),
        ])?;
        let vals = [Value::Map(Record::new().with("a", 1)), Value::Null];
        let refs: Vec<&Value> = vals.iter().collect();
        let arr = build_array(&FieldType::Struct(schema), &refs, "m")?;
        let st = arr.as_struct();
        assert!(st.is_null(1));
        assert!(st.column(1).is_null(0));
        Ok(())
    }

    #[test]
    fn conform_widens_nested_list_and_struct() -> anyhow::Result<()> {
        let narrow = Schema::from_fields([Field::new("a", FieldType::Int64)])?;
        let vals = [Value::Map(Record::new().with("a", 7))];
        let refs: Vec<&Value> = vals.iter().collect();
        let arr = build_array(&FieldType::Struct(narrow), &refs, "m")?;

        let wide = Schema::from_fields([
            Field::new("a", FieldType::Float64),
            Field::new("z", FieldType::List(Box::new(FieldType::Utf8))),
        ])?;
        let target = FieldType::Struct(wide);
        let out = conform_array(&arr, &target)?;
        assert_eq!(out.data_type(), &target.to_arrow());
        let st = out.as_struct();
        assert_eq!(st.column(0).as_primitive::<Float64Type>().value(0), 7.0);
        assert!(st.column(1).is_null(0));
        Ok(())
    }

    #[test]
    fn conform_null_column_to_utf8() -> anyhow::Result<()> {
        let arr: ArrayRef = Arc::new(NullArray::new(3));
        let out = conform_array(&arr, &FieldType::Utf8)?;
        assert_eq!(out.data_type(), &DataType::Utf8);
        assert_eq!(out.null_count(), 3);
        Ok(())
    }
}
