// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! BYTE_STREAM_SPLIT: floating-point values stored as parallel byte
//! planes (byte `j` of value `i` lives at `data[j * n + i]`), which
//! compresses far better than interleaved floats.

use snafu::location;
use strata_core::{Error, Result};

use crate::data::{PhysicalType, ValueVector};

/// Deinterleave `num_values` floats or doubles from their byte planes.
pub fn decode_byte_stream_split(
    data: &[u8],
    num_values: usize,
    physical_type: PhysicalType,
) -> Result<ValueVector> {
    let width = match physical_type {
        PhysicalType::Float => 4,
        PhysicalType::Double => 8,
        other => {
            return Err(Error::corrupt(
                "<page>",
                format!("BYTE_STREAM_SPLIT is not defined for {other}"),
                location!(),
            ))
        }
    };
    if data.len() != num_values * width {
        return Err(Error::corrupt(
            "<page>",
            format!(
                "BYTE_STREAM_SPLIT data holds {} bytes, expected {} ({} values of width {width})",
                data.len(),
                num_values * width,
                num_values
            ),
            location!(),
        ));
    }

    match physical_type {
        PhysicalType::Float => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let mut bytes = [0u8; 4];
                for (j, byte) in bytes.iter_mut().enumerate() {
                    *byte = data[j * num_values + i];
                }
                out.push(f32::from_le_bytes(bytes));
            }
            Ok(ValueVector::Float(out))
        }
        PhysicalType::Double => {
            let mut out = Vec::with_capacity(num_values);
            for i in 0..num_values {
                let mut bytes = [0u8; 8];
                for (j, byte) in bytes.iter_mut().enumerate() {
                    *byte = data[j * num_values + i];
                }
                out.push(f64::from_le_bytes(bytes));
            }
            Ok(ValueVector::Double(out))
        }
        _ => unreachable!(),
    }
}
