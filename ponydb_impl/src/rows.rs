//! `serde_db` integration (§9, ambient): lets an application deserialize a
//! [`ResultSet`] straight into application structs with
//! [`ResultSet::try_into`] instead of driving the `get_*` family by hand.
//!
//! This sits above the core protocol, not inside it: it is built entirely
//! out of [`ResultSet::advance_row`] and the column list already exposed by
//! §4.5. Only the directions the protocol actually carries are implemented
//! -- numeric-to-numeric, numeric/boolean-to-string, string-to-boolean, and
//! binary-to-bytes, matching the `get_*` projection rules of §4.5. NULL
//! always falls through to the catch-all and is left for `serde_db`'s
//! `Option<T>` handling, the same way the teacher crate's own conversions
//! never special-case `HdbValue::NULL`.

use crate::cursor::{decimal_to_f64, decimal_to_i64, ResultSet};
use crate::wire::Value;
use serde_db::de::{
    ConversionError, DbValue, DbValueInto, DeserializableResultSet, DeserializableRow,
    DeserializationError, DeserializationResult,
};
use std::sync::Arc;

/// One deserialized row, handed to `serde_db` as a front-to-back sequence of
/// [`Value`] cells (§4.5's column list gives the field names).
pub struct Row {
    values: std::vec::IntoIter<Value>,
    len: usize,
    names: Arc<Vec<String>>,
}

impl Row {
    fn new(values: Vec<Value>, names: Arc<Vec<String>>) -> Self {
        let len = values.len();
        Self {
            values: values.into_iter(),
            len,
            names,
        }
    }
}

impl DeserializableRow for Row {
    type Value = Value;
    type Error = DeserializationError;

    fn len(&self) -> usize {
        self.len
    }

    fn next(&mut self) -> Option<Value> {
        self.values.next()
    }

    fn number_of_fields(&self) -> usize {
        self.names.len()
    }

    fn field_name(&self, field_idx: usize) -> Option<&str> {
        self.names.get(field_idx).map(String::as_str)
    }
}

impl DeserializableResultSet for ResultSet {
    type Row = Row;
    type Error = DeserializationError;

    fn has_multiple_rows(&mut self) -> Result<bool, DeserializationError> {
        Ok(self.total_row_count() > 1)
    }

    fn next(&mut self) -> DeserializationResult<Option<Row>> {
        let names = Arc::new(self.columns().iter().map(|c| c.name.clone()).collect());
        Ok(self.advance_row()?.map(|values| Row::new(values, names)))
    }

    fn number_of_fields(&self) -> usize {
        self.columns().len()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        self.columns().get(i).map(|c| c.name.as_str())
    }
}

impl From<crate::error::HdbError> for DeserializationError {
    fn from(e: crate::error::HdbError) -> Self {
        Self::Usage(e.to_string())
    }
}

impl DbValue for Value {
    fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn wrong_type(value: &Value, target: &str) -> ConversionError {
    ConversionError::ValueType(format!("{value:?} cannot be converted into {target}"))
}

fn number_range(value: i64, target: &str) -> ConversionError {
    ConversionError::NumberRange(format!("{value} exceeds the range of {target}"))
}

macro_rules! impl_int_conversion {
    ($ty:ty) => {
        impl DbValueInto<$ty> for Value {
            fn try_into(self) -> Result<$ty, ConversionError> {
                match self {
                    Self::Int(v) => <$ty>::try_from(v)
                        .map_err(|_| number_range(i64::from(v), stringify!($ty))),
                    Self::BigInt(v) => {
                        <$ty>::try_from(v).map_err(|_| number_range(v, stringify!($ty)))
                    }
                    Self::Decimal(ref d) => {
                        let v = decimal_to_i64(d);
                        <$ty>::try_from(v).map_err(|_| number_range(v, stringify!($ty)))
                    }
                    other => Err(wrong_type(&other, stringify!($ty))),
                }
            }
        }
    };
}

impl_int_conversion!(i8);
impl_int_conversion!(i16);
impl_int_conversion!(i32);
impl_int_conversion!(i64);
impl_int_conversion!(u8);
impl_int_conversion!(u16);
impl_int_conversion!(u32);
impl_int_conversion!(u64);

impl DbValueInto<f32> for Value {
    fn try_into(self) -> Result<f32, ConversionError> {
        match self {
            Self::Int(v) => Ok(f64::from(v) as f32),
            Self::BigInt(v) => Ok(v as f32),
            Self::Decimal(ref d) => Ok(decimal_to_f64(d) as f32),
            other => Err(wrong_type(&other, "f32")),
        }
    }
}

impl DbValueInto<f64> for Value {
    fn try_into(self) -> Result<f64, ConversionError> {
        match self {
            Self::Int(v) => Ok(f64::from(v)),
            Self::BigInt(v) => Ok(v as f64),
            Self::Decimal(ref d) => Ok(decimal_to_f64(d)),
            other => Err(wrong_type(&other, "f64")),
        }
    }
}

impl DbValueInto<bool> for Value {
    fn try_into(self) -> Result<bool, ConversionError> {
        match self {
            Self::Boolean(b) => Ok(b),
            Self::String(ref s) => Ok(s.eq_ignore_ascii_case("true")),
            other => Err(wrong_type(&other, "bool")),
        }
    }
}

impl DbValueInto<String> for Value {
    fn try_into(self) -> Result<String, ConversionError> {
        match self {
            Self::String(s) => Ok(s),
            Self::Int(v) => Ok(v.to_string()),
            Self::BigInt(v) => Ok(v.to_string()),
            Self::Boolean(b) => Ok(b.to_string()),
            Self::Decimal(ref d) => Ok(decimal_to_f64(d).to_string()),
            other => Err(wrong_type(&other, "String")),
        }
    }
}

impl DbValueInto<Vec<u8>> for Value {
    fn try_into(self) -> Result<Vec<u8>, ConversionError> {
        match self {
            Self::Bytes(b) => Ok(b),
            other => Err(wrong_type(&other, "Vec<u8>")),
        }
    }
}
