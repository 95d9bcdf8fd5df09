// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The RLE / bit-packed hybrid decoder.
//!
//! Both level streams and dictionary-index streams use the same hybrid
//! layout: a varint header tags each group as an RLE run
//! (`run_len << 1`) or a bit-packed group (`(num_groups << 1) | 1`),
//! where bit-packed groups always hold a multiple of 8 values and only
//! the logical value count is consumed.

use snafu::location;
use strata_core::bits::{ceil_div, num_required_bits, read_bits};
use strata_core::{Error, Result};

fn truncated(what: &str) -> Error {
    Error::corrupt(
        "<hybrid stream>",
        format!("truncated {what} in RLE/bit-packed stream"),
        location!(),
    )
}

fn read_uleb(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *data.get(*pos).ok_or_else(|| truncated("varint"))?;
        *pos += 1;
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(truncated("varint"));
        }
    }
}

/// Decode exactly `num_values` values of the given bit width.
///
/// Zero-length runs are skipped; the trailing padding of the final
/// bit-packed group is left unread.
pub fn decode_hybrid(data: &[u8], bit_width: usize, num_values: usize) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(num_values);
    if bit_width == 0 {
        // A zero-bit stream can only encode zeros.
        out.resize(num_values, 0);
        return Ok(out);
    }
    if bit_width > 32 {
        return Err(Error::corrupt(
            "<hybrid stream>",
            format!("bit width {bit_width} out of range"),
            location!(),
        ));
    }

    let mut pos = 0usize;
    while out.len() < num_values {
        let header = read_uleb(data, &mut pos)?;
        if header & 1 == 0 {
            // RLE run: one value repeated.  Zero-length runs carry their
            // value bytes but contribute nothing.
            let run_len = (header >> 1) as usize;
            let value_bytes = ceil_div(bit_width, 8);
            if pos + value_bytes > data.len() {
                return Err(truncated("RLE run value"));
            }
            let mut value: u32 = 0;
            for (i, byte) in data[pos..pos + value_bytes].iter().enumerate() {
                value |= (*byte as u32) << (8 * i);
            }
            pos += value_bytes;
            let take = run_len.min(num_values - out.len());
            out.resize(out.len() + take, value);
        } else {
            // Bit-packed groups of 8 values.
            let num_groups = (header >> 1) as usize;
            let group_values = num_groups * 8;
            let byte_len = ceil_div(group_values * bit_width, 8);
            if pos + byte_len > data.len() {
                return Err(truncated("bit-packed group"));
            }
            let packed = &data[pos..pos + byte_len];
            pos += byte_len;
            let take = group_values.min(num_values - out.len());
            for i in 0..take {
                out.push(read_bits(packed, i * bit_width, bit_width) as u32);
            }
        }
    }
    Ok(out)
}

/// Decode a v1 level stream: a little-endian `u32` byte length followed
/// by the hybrid stream.  Returns the levels and the total bytes
/// consumed (prefix included).
pub fn read_levels_v1(
    data: &[u8],
    max_level: u16,
    num_values: usize,
) -> Result<(Vec<u16>, usize)> {
    if max_level == 0 {
        // Virtual all-zero stream, no bytes on disk.
        return Ok((Vec::new(), 0));
    }
    if data.len() < 4 {
        // An empty page may omit the level streams entirely.
        if num_values == 0 {
            return Ok((Vec::new(), 0));
        }
        return Err(truncated("level stream length prefix"));
    }
    let byte_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
    if 4 + byte_len > data.len() {
        return Err(truncated("level stream"));
    }
    let levels = decode_levels(&data[4..4 + byte_len], max_level, num_values)?;
    Ok((levels, 4 + byte_len))
}

/// Decode a v2 level stream: the byte length comes from the page header
/// and there is no prefix.
pub fn read_levels_v2(data: &[u8], max_level: u16, num_values: usize) -> Result<Vec<u16>> {
    if max_level == 0 {
        return Ok(Vec::new());
    }
    decode_levels(data, max_level, num_values)
}

fn decode_levels(data: &[u8], max_level: u16, num_values: usize) -> Result<Vec<u16>> {
    let bit_width = num_required_bits(max_level as u64);
    let raw = decode_hybrid(data, bit_width, num_values)?;
    let mut levels = Vec::with_capacity(raw.len());
    for value in raw {
        if value > max_level as u32 {
            return Err(Error::corrupt(
                "<hybrid stream>",
                format!("level {value} exceeds declared maximum {max_level}"),
                location!(),
            ));
        }
        levels.push(value as u16);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Hybrid-stream writer for test vectors (and the in-memory files the
    /// integration tests build).
    pub fn encode_hybrid(values: &[u32], bit_width: usize) -> Vec<u8> {
        // Encode everything as bit-packed groups; simple and legal.
        let mut out = Vec::new();
        if values.is_empty() {
            return out;
        }
        let num_groups = ceil_div(values.len(), 8);
        let mut header = (num_groups as u64) << 1 | 1;
        loop {
            let byte = (header & 0x7F) as u8;
            header >>= 7;
            if header == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
        let mut bit_pos = 0usize;
        let mut packed = vec![0u8; ceil_div(num_groups * 8 * bit_width, 8)];
        for value in values {
            for bit in 0..bit_width {
                if (value >> bit) & 1 == 1 {
                    packed[(bit_pos + bit) / 8] |= 1 << ((bit_pos + bit) % 8);
                }
            }
            bit_pos += bit_width;
        }
        out.extend_from_slice(&packed);
        out
    }

    #[test]
    fn test_rle_run() {
        // 10 copies of value 2, bit width 2: header = 10 << 1 = 20.
        let data = [20u8, 2];
        assert_eq!(decode_hybrid(&data, 2, 10).unwrap(), vec![2; 10]);
    }

    #[test]
    fn test_bit_packed_group() {
        // The canonical example: values 0..8 with bit width 3.
        let data = [0x03u8, 0x88, 0xC6, 0xFA];
        assert_eq!(
            decode_hybrid(&data, 3, 8).unwrap(),
            vec![0, 1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[test]
    fn test_bit_packed_partial_group_consumes_logical_count() {
        // One 8-value group but only 5 logical values.
        let data = [0x03u8, 0x88, 0xC6, 0xFA];
        assert_eq!(decode_hybrid(&data, 3, 5).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_mixed_runs() {
        // RLE run of 4 ones then a bit-packed group of 8.
        let mut data = vec![8u8, 1]; // run_len 4 << 1, value 1
        data.extend_from_slice(&[0x03, 0x88, 0xC6, 0xFA]);
        assert_eq!(
            decode_hybrid(&data, 3, 12).unwrap(),
            vec![1, 1, 1, 1, 0, 1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[test]
    fn test_zero_length_run_skipped() {
        let data = [0u8, 9, 4, 3]; // empty run (header 0 + value byte), then run of 2 threes
        assert_eq!(decode_hybrid(&data, 2, 2).unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_zero_bit_width() {
        assert_eq!(decode_hybrid(&[], 0, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let data = [0x03u8, 0x88]; // promises 3 bytes of packed data
        assert!(matches!(
            decode_hybrid(&data, 3, 8),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_v1_levels_with_prefix() {
        let stream = encode_hybrid(&[1, 0, 1, 1], 1);
        let mut data = (stream.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&stream);
        data.extend_from_slice(b"values follow");
        let (levels, consumed) = read_levels_v1(&data, 1, 4).unwrap();
        assert_eq!(levels, vec![1, 0, 1, 1]);
        assert_eq!(consumed, 4 + stream.len());
    }

    #[test]
    fn test_max_level_zero_elides_stream() {
        let (levels, consumed) = read_levels_v1(b"payload", 0, 100).unwrap();
        assert!(levels.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_level_above_max_is_corrupt() {
        let stream = encode_hybrid(&[3], 2);
        assert!(matches!(
            read_levels_v2(&stream, 1, 1),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let values: Vec<u32> = (0..100).map(|i| i % 5).collect();
        let encoded = encode_hybrid(&values, 3);
        assert_eq!(decode_hybrid(&encoded, 3, 100).unwrap(), values);
    }
}
