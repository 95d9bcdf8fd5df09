// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The PLAIN encoding: packed little-endian fixed-width values for
//! numerics, bit-packed booleans, `[len: u32 le][bytes]` for byte
//! arrays, and fixed `N` bytes for fixed-length byte arrays.

use bytes::Bytes;
use snafu::location;
use strata_core::{Error, Result};

use crate::data::{PhysicalType, ValueVector};

fn truncated(physical_type: PhysicalType, index: usize, num_values: usize) -> Error {
    Error::corrupt(
        "<page>",
        format!("PLAIN {physical_type} stream truncated at value {index} of {num_values}"),
        location!(),
    )
}

/// Decode `num_values` present values from a PLAIN stream.
pub fn decode_plain(data: &Bytes, num_values: usize, physical_type: PhysicalType) -> Result<ValueVector> {
    let buf = data.as_ref();
    match physical_type {
        PhysicalType::Boolean => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let byte = *buf
                    .get(i / 8)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push((byte >> (i % 8)) & 1 == 1);
            }
            Ok(ValueVector::Bool(out))
        }
        PhysicalType::Int32 => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * 4;
                let bytes = buf
                    .get(start..start + 4)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push(i32::from_le_bytes(bytes.try_into().unwrap()));
            }
            Ok(ValueVector::Int32(out))
        }
        PhysicalType::Int64 => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * 8;
                let bytes = buf
                    .get(start..start + 8)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push(i64::from_le_bytes(bytes.try_into().unwrap()));
            }
            Ok(ValueVector::Int64(out))
        }
        PhysicalType::Int96 => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * 12;
                let bytes = buf
                    .get(start..start + 12)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push(bytes.try_into().unwrap());
            }
            Ok(ValueVector::Int96(out))
        }
        PhysicalType::Float => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * 4;
                let bytes = buf
                    .get(start..start + 4)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push(f32::from_le_bytes(bytes.try_into().unwrap()));
            }
            Ok(ValueVector::Float(out))
        }
        PhysicalType::Double => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * 8;
                let bytes = buf
                    .get(start..start + 8)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                out.push(f64::from_le_bytes(bytes.try_into().unwrap()));
            }
            Ok(ValueVector::Double(out))
        }
        PhysicalType::ByteArray => {
            let mut out = Vec::with_capacity(num_values);
            let mut offset = 0usize;
            for i in 0..num_values {
                let len_bytes = buf
                    .get(offset..offset + 4)
                    .ok_or_else(|| truncated(physical_type, i, num_values))?;
                let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
                offset += 4;
                if offset + len > buf.len() {
                    return Err(truncated(physical_type, i, num_values));
                }
                // Zero-copy slice into the page buffer.
                out.push(data.slice(offset..offset + len));
                offset += len;
            }
            Ok(ValueVector::Bytes(out))
        }
        PhysicalType::FixedLenByteArray(type_length) => {
            let len = type_length.max(0) as usize;
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let start = i * len;
                if start + len > buf.len() {
                    return Err(truncated(physical_type, i, num_values));
                }
                out.push(data.slice(start..start + len));
            }
            Ok(ValueVector::Bytes(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_bools_bit_packed() {
        // true, false, true, true, false -> 0b01101
        let data = Bytes::from_static(&[0b0000_1101]);
        assert_eq!(
            decode_plain(&data, 5, PhysicalType::Boolean).unwrap(),
            ValueVector::Bool(vec![true, false, true, true, false])
        );
    }

    #[test]
    fn test_plain_i32_little_endian() {
        let mut data = Vec::new();
        for v in [1i32, -1, 1_000_000] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(
            decode_plain(&Bytes::from(data), 3, PhysicalType::Int32).unwrap(),
            ValueVector::Int32(vec![1, -1, 1_000_000])
        );
    }

    #[test]
    fn test_plain_doubles() {
        let mut data = Vec::new();
        for v in [1.6f64, 18.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(
            decode_plain(&Bytes::from(data), 2, PhysicalType::Double).unwrap(),
            ValueVector::Double(vec![1.6, 18.0])
        );
    }

    #[test]
    fn test_plain_byte_arrays() {
        let mut data = Vec::new();
        for s in [&b"apple"[..], b"", b"banana"] {
            data.extend_from_slice(&(s.len() as u32).to_le_bytes());
            data.extend_from_slice(s);
        }
        let decoded = decode_plain(&Bytes::from(data), 3, PhysicalType::ByteArray).unwrap();
        assert_eq!(
            decoded,
            ValueVector::Bytes(vec![
                Bytes::from_static(b"apple"),
                Bytes::new(),
                Bytes::from_static(b"banana"),
            ])
        );
    }

    #[test]
    fn test_plain_fixed_len_byte_arrays() {
        let data = Bytes::from_static(b"abcdef");
        assert_eq!(
            decode_plain(&data, 3, PhysicalType::FixedLenByteArray(2)).unwrap(),
            ValueVector::Bytes(vec![
                Bytes::from_static(b"ab"),
                Bytes::from_static(b"cd"),
                Bytes::from_static(b"ef"),
            ])
        );
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let data = Bytes::from_static(&[1, 2, 3]);
        assert!(matches!(
            decode_plain(&data, 1, PhysicalType::Int32),
            Err(Error::Corrupt { .. })
        ));
    }
}
