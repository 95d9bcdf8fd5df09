// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Typed value storage.
//!
//! Column data is a tagged union over the physical types rather than a
//! class hierarchy: decoders specialize on the tag and batch storage is
//! one primitive array per tag.

use bytes::Bytes;
use snafu::location;
use strata_core::{Error, Result};

use crate::format::Codec;

/// Physical (storage) types of the format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalType {
    Boolean,
    Int32,
    Int64,
    Int96,
    Float,
    Double,
    ByteArray,
    /// Fixed-length byte array with its length in bytes.
    FixedLenByteArray(i32),
}

impl PhysicalType {
    pub fn from_thrift(value: i32, type_length: Option<i32>) -> Result<Self> {
        match value {
            0 => Ok(Self::Boolean),
            1 => Ok(Self::Int32),
            2 => Ok(Self::Int64),
            3 => Ok(Self::Int96),
            4 => Ok(Self::Float),
            5 => Ok(Self::Double),
            6 => Ok(Self::ByteArray),
            7 => {
                let len = type_length.ok_or_else(|| {
                    Error::corrupt(
                        "<metadata>",
                        "fixed-length byte array without a type length",
                        location!(),
                    )
                })?;
                Ok(Self::FixedLenByteArray(len))
            }
            other => Err(Error::corrupt(
                "<metadata>",
                format!("unknown physical type {other}"),
                location!(),
            )),
        }
    }
}

impl std::fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Int32 => write!(f, "INT32"),
            Self::Int64 => write!(f, "INT64"),
            Self::Int96 => write!(f, "INT96"),
            Self::Float => write!(f, "FLOAT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::ByteArray => write!(f, "BYTE_ARRAY"),
            Self::FixedLenByteArray(len) => write!(f, "FIXED_LEN_BYTE_ARRAY({len})"),
        }
    }
}

/// One decoded scalar.  `Null` stands for an unset slot; nullability
/// itself is tracked by definition levels or null bitsets.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Int96([u8; 12]),
    Float(f32),
    Double(f64),
    Bytes(Bytes),
}

/// A typed array of decoded values, one variant per physical tag.
///
/// Byte arrays and fixed-length byte arrays share the `Bytes` variant;
/// the descriptor distinguishes them where it matters.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueVector {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int96(Vec<[u8; 12]>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bytes(Vec<Bytes>),
}

impl ValueVector {
    pub fn with_capacity(physical_type: PhysicalType, capacity: usize) -> Self {
        match physical_type {
            PhysicalType::Boolean => Self::Bool(Vec::with_capacity(capacity)),
            PhysicalType::Int32 => Self::Int32(Vec::with_capacity(capacity)),
            PhysicalType::Int64 => Self::Int64(Vec::with_capacity(capacity)),
            PhysicalType::Int96 => Self::Int96(Vec::with_capacity(capacity)),
            PhysicalType::Float => Self::Float(Vec::with_capacity(capacity)),
            PhysicalType::Double => Self::Double(Vec::with_capacity(capacity)),
            PhysicalType::ByteArray | PhysicalType::FixedLenByteArray(_) => {
                Self::Bytes(Vec::with_capacity(capacity))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Int96(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a placeholder for a null slot.
    pub fn push_default(&mut self) {
        match self {
            Self::Bool(v) => v.push(false),
            Self::Int32(v) => v.push(0),
            Self::Int64(v) => v.push(0),
            Self::Int96(v) => v.push([0; 12]),
            Self::Float(v) => v.push(0.0),
            Self::Double(v) => v.push(0.0),
            Self::Bytes(v) => v.push(Bytes::new()),
        }
    }

    pub fn get(&self, index: usize) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(v[index]),
            Self::Int32(v) => Value::Int32(v[index]),
            Self::Int64(v) => Value::Int64(v[index]),
            Self::Int96(v) => Value::Int96(v[index]),
            Self::Float(v) => Value::Float(v[index]),
            Self::Double(v) => Value::Double(v[index]),
            Self::Bytes(v) => Value::Bytes(v[index].clone()),
        }
    }

    /// Append every value of `other`.  The tags must match.
    pub fn append(&mut self, other: ValueVector) -> Result<()> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(mut b)) => a.append(&mut b),
            (Self::Int32(a), Self::Int32(mut b)) => a.append(&mut b),
            (Self::Int64(a), Self::Int64(mut b)) => a.append(&mut b),
            (Self::Int96(a), Self::Int96(mut b)) => a.append(&mut b),
            (Self::Float(a), Self::Float(mut b)) => a.append(&mut b),
            (Self::Double(a), Self::Double(mut b)) => a.append(&mut b),
            (Self::Bytes(a), Self::Bytes(mut b)) => a.append(&mut b),
            _ => {
                return Err(Error::corrupt(
                    "<batch>",
                    "mismatched value tags across pages of one column",
                    location!(),
                ))
            }
        }
        Ok(())
    }

    /// Append `other[start..end]`.  The tags must match.
    pub fn extend_from_range(&mut self, other: &ValueVector, start: usize, end: usize) -> Result<()> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Int32(a), Self::Int32(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Int64(a), Self::Int64(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Int96(a), Self::Int96(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Double(a), Self::Double(b)) => a.extend_from_slice(&b[start..end]),
            (Self::Bytes(a), Self::Bytes(b)) => a.extend_from_slice(&b[start..end]),
            _ => {
                return Err(Error::corrupt(
                    "<batch>",
                    "mismatched value tags across pages of one column",
                    location!(),
                ))
            }
        }
        Ok(())
    }

    /// Split off the tail starting at `at`, leaving `0..at` in place.
    pub fn split_off(&mut self, at: usize) -> ValueVector {
        match self {
            Self::Bool(v) => Self::Bool(v.split_off(at)),
            Self::Int32(v) => Self::Int32(v.split_off(at)),
            Self::Int64(v) => Self::Int64(v.split_off(at)),
            Self::Int96(v) => Self::Int96(v.split_off(at)),
            Self::Float(v) => Self::Float(v.split_off(at)),
            Self::Double(v) => Self::Double(v.split_off(at)),
            Self::Bytes(v) => Self::Bytes(v.split_off(at)),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Self::Bool(v) => v.clear(),
            Self::Int32(v) => v.clear(),
            Self::Int64(v) => v.clear(),
            Self::Int96(v) => v.clear(),
            Self::Float(v) => v.clear(),
            Self::Double(v) => v.clear(),
            Self::Bytes(v) => v.clear(),
        }
    }
}

/// A column chunk's dictionary: ordered typed values keyed by index.
/// Parsed once per chunk and shared by reference across its pages.
#[derive(Debug)]
pub struct Dictionary {
    values: ValueVector,
}

impl Dictionary {
    /// Parse a decompressed dictionary payload: fixed-width values for
    /// numerics, `[len: u32 le][bytes]` for byte arrays, fixed `N` for
    /// fixed-length byte arrays.
    pub fn parse(data: Bytes, num_values: usize, physical_type: PhysicalType) -> Result<Self> {
        let values = crate::encodings::plain::decode_plain(&data, num_values, physical_type)?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Value {
        self.values.get(index)
    }

    /// An empty output vector with this dictionary's tag.
    pub fn make_output(&self, capacity: usize) -> ValueVector {
        match &self.values {
            ValueVector::Bool(_) => ValueVector::Bool(Vec::with_capacity(capacity)),
            ValueVector::Int32(_) => ValueVector::Int32(Vec::with_capacity(capacity)),
            ValueVector::Int64(_) => ValueVector::Int64(Vec::with_capacity(capacity)),
            ValueVector::Int96(_) => ValueVector::Int96(Vec::with_capacity(capacity)),
            ValueVector::Float(_) => ValueVector::Float(Vec::with_capacity(capacity)),
            ValueVector::Double(_) => ValueVector::Double(Vec::with_capacity(capacity)),
            ValueVector::Bytes(_) => ValueVector::Bytes(Vec::with_capacity(capacity)),
        }
    }

    /// Append the value at `index` into `out`, bounds-checked.
    pub fn push_into(&self, index: usize, out: &mut ValueVector) -> Result<()> {
        if index >= self.values.len() {
            return Err(Error::corrupt(
                "<dictionary>",
                format!(
                    "dictionary index {index} out of range for dictionary of {} entries",
                    self.values.len()
                ),
                location!(),
            ));
        }
        match (&self.values, out) {
            (ValueVector::Bool(d), ValueVector::Bool(o)) => o.push(d[index]),
            (ValueVector::Int32(d), ValueVector::Int32(o)) => o.push(d[index]),
            (ValueVector::Int64(d), ValueVector::Int64(o)) => o.push(d[index]),
            (ValueVector::Int96(d), ValueVector::Int96(o)) => o.push(d[index]),
            (ValueVector::Float(d), ValueVector::Float(o)) => o.push(d[index]),
            (ValueVector::Double(d), ValueVector::Double(o)) => o.push(d[index]),
            (ValueVector::Bytes(d), ValueVector::Bytes(o)) => o.push(d[index].clone()),
            _ => {
                return Err(Error::corrupt(
                    "<dictionary>",
                    "dictionary tag does not match output tag",
                    location!(),
                ))
            }
        }
        Ok(())
    }
}

/// Everything the page decoder needs to know about one leaf column.
#[derive(Clone, Debug)]
pub struct ColumnDescriptor {
    /// File this column was read from, for error context.
    pub file: String,
    /// Dotted path of the leaf in the schema.
    pub name: String,
    pub physical_type: PhysicalType,
    pub max_def_level: u16,
    pub max_rep_level: u16,
    pub codec: Codec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_vector_append_and_split() {
        let mut v = ValueVector::Int32(vec![1, 2, 3]);
        v.append(ValueVector::Int32(vec![4, 5])).unwrap();
        assert_eq!(v.len(), 5);
        let tail = v.split_off(3);
        assert_eq!(v, ValueVector::Int32(vec![1, 2, 3]));
        assert_eq!(tail, ValueVector::Int32(vec![4, 5]));
    }

    #[test]
    fn test_value_vector_append_tag_mismatch() {
        let mut v = ValueVector::Int32(vec![1]);
        assert!(matches!(
            v.append(ValueVector::Int64(vec![2])),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_dictionary_bounds_check() {
        let dict = Dictionary {
            values: ValueVector::Int64(vec![10, 20]),
        };
        let mut out = ValueVector::Int64(Vec::new());
        dict.push_into(1, &mut out).unwrap();
        assert_eq!(out, ValueVector::Int64(vec![20]));
        assert!(matches!(
            dict.push_into(2, &mut out),
            Err(Error::Corrupt { .. })
        ));
    }
}
