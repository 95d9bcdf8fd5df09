// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Decoding one page into levels and typed values.
//!
//! A [`PageInfo`] references its slice of the column chunk without
//! decompressing anything; [`decode_page`] does the full trip:
//! decompression, level decode, value decode, dictionary indirection
//! and checksum validation.  Decode runs as a pure function so the
//! cursor can schedule it on the worker pool.

use std::sync::Arc;

use bytes::Bytes;
use log::trace;
use snafu::location;
use strata_core::{Error, Result};

use crate::buffer::StrataBuffer;
use crate::compression::DecompressorRegistry;
use crate::data::{ColumnDescriptor, Dictionary, PhysicalType, ValueVector};
use crate::encodings::byte_stream_split::decode_byte_stream_split;
use crate::encodings::delta::{
    decode_delta_byte_array, decode_delta_length_byte_array, decode_delta_values,
};
use crate::encodings::dictionary::decode_dictionary;
use crate::encodings::plain::decode_plain;
use crate::format::{Codec, Encoding, PageHeader, PageType};
use crate::levels::{read_levels_v1, read_levels_v2};

/// One data page located by the scanner: a slice of the mapped chunk
/// (header included), the parsed header, and the chunk's dictionary.
#[derive(Debug)]
pub struct PageInfo {
    /// Page bytes as stored: header followed by the (compressed) payload.
    pub bytes: Bytes,
    pub header: PageHeader,
    pub header_len: usize,
    /// Offset of the page within the file, for error context.
    pub offset_in_file: u64,
    pub codec: Codec,
    pub dictionary: Option<Arc<Dictionary>>,
}

/// A fully decoded page: level streams plus an aligned value array.
///
/// `rep`/`def` are elided (empty) when the column's maxima are zero.
/// `values` always holds exactly `num_values` entries; positions where
/// `def < max_def` hold placeholder defaults.
#[derive(Debug)]
pub struct DecodedPage {
    pub rep: Vec<u16>,
    pub def: Vec<u16>,
    pub values: ValueVector,
    pub num_values: usize,
    /// Record count, populated for v2 pages.
    pub num_rows: Option<usize>,
}

impl DecodedPage {
    pub fn rep_at(&self, index: usize) -> u16 {
        if self.rep.is_empty() {
            0
        } else {
            self.rep[index]
        }
    }

    pub fn def_at(&self, index: usize) -> u16 {
        if self.def.is_empty() {
            0
        } else {
            self.def[index]
        }
    }

    pub fn is_present(&self, index: usize, max_def: u16) -> bool {
        self.def_at(index) == max_def
    }
}

/// Decode one data page.  Errors gain the column and page context the
/// caller cannot reconstruct.
pub fn decode_page(
    info: &PageInfo,
    column: &ColumnDescriptor,
    decompressors: &DecompressorRegistry,
) -> Result<DecodedPage> {
    decode_page_inner(info, column, decompressors).map_err(|e| match e {
        Error::Corrupt {
            source, location, ..
        } => Error::Corrupt {
            path: format!(
                "{} (column '{}', page offset {}, codec {})",
                column.file, column.name, info.offset_in_file, info.codec
            ),
            source,
            location,
        },
        other => other,
    })
}

fn decode_page_inner(
    info: &PageInfo,
    column: &ColumnDescriptor,
    decompressors: &DecompressorRegistry,
) -> Result<DecodedPage> {
    let compressed_len = info.header.compressed_page_size as usize;
    let payload_end = info
        .header_len
        .checked_add(compressed_len)
        .filter(|end| *end <= info.bytes.len())
        .ok_or_else(|| {
            Error::corrupt(
                "<page>",
                format!(
                    "page payload of {compressed_len} bytes exceeds its slice of {} bytes",
                    info.bytes.len() - info.header_len
                ),
                location!(),
            )
        })?;
    let payload = info.bytes.slice(info.header_len..payload_end);

    // The checksum covers the compressed page data exactly as stored.
    if let Some(expected) = info.header.crc {
        let actual = crc32fast::hash(&payload) as i32;
        if actual != expected {
            return Err(Error::corrupt(
                "<page>",
                format!("page CRC mismatch: stored {expected:#x}, computed {actual:#x}"),
                location!(),
            ));
        }
    }

    let page = match info.header.page_type {
        PageType::DataPage => decode_v1(info, column, payload, decompressors)?,
        PageType::DataPageV2 => decode_v2(info, column, payload, decompressors)?,
        other => {
            return Err(Error::corrupt(
                "<page>",
                format!("decoder handed a non-data page ({other:?})"),
                location!(),
            ))
        }
    };
    trace!(
        "decoded page for column '{}': {} values, {} present",
        column.name,
        page.num_values,
        if page.def.is_empty() {
            page.num_values
        } else {
            page.def
                .iter()
                .filter(|d| **d == column.max_def_level)
                .count()
        }
    );
    Ok(page)
}

fn decode_v1(
    info: &PageInfo,
    column: &ColumnDescriptor,
    payload: Bytes,
    decompressors: &DecompressorRegistry,
) -> Result<DecodedPage> {
    let header = info.header.data_page.ok_or_else(|| {
        Error::corrupt(
            "<page>",
            "v1 data page without a data page header",
            location!(),
        )
    })?;
    let num_values = usize::try_from(header.num_values).map_err(|_| {
        Error::corrupt(
            "<page>",
            format!("negative value count {}", header.num_values),
            location!(),
        )
    })?;
    for level_encoding in [
        header.repetition_level_encoding,
        header.definition_level_encoding,
    ] {
        if level_encoding != Encoding::Rle {
            return Err(Error::unsupported(
                format!("level encoding {level_encoding} (only RLE levels are implemented)"),
                location!(),
            ));
        }
    }

    // The v1 payload is [rep levels][def levels][values], compressed as
    // one unit.  Uncompressed chunks stay borrowed slices of the
    // mapping; running a codec hands back an owned buffer.
    let data: StrataBuffer = if info.codec == Codec::Uncompressed {
        payload.into()
    } else {
        let decompressor = decompressors.get(info.codec)?;
        decompressor
            .decompress(&payload, info.header.uncompressed_page_size as usize)?
            .into()
    };

    let (rep, rep_consumed) = read_levels_v1(&data, column.max_rep_level, num_values)?;
    let (def, def_consumed) = read_levels_v1(&data[rep_consumed..], column.max_def_level, num_values)?;
    let values_bytes = data.into_bytes().slice(rep_consumed + def_consumed..);

    build_page(
        rep,
        def,
        values_bytes,
        num_values,
        header.encoding,
        column,
        info.dictionary.as_deref(),
        None,
    )
}

fn decode_v2(
    info: &PageInfo,
    column: &ColumnDescriptor,
    payload: Bytes,
    decompressors: &DecompressorRegistry,
) -> Result<DecodedPage> {
    let header = info.header.data_page_v2.ok_or_else(|| {
        Error::corrupt(
            "<page>",
            "v2 data page without a v2 data page header",
            location!(),
        )
    })?;
    let num_values = usize::try_from(header.num_values).map_err(|_| {
        Error::corrupt(
            "<page>",
            format!("negative value count {}", header.num_values),
            location!(),
        )
    })?;
    let rep_len = header.repetition_levels_byte_length.max(0) as usize;
    let def_len = header.definition_levels_byte_length.max(0) as usize;
    if rep_len + def_len > payload.len() {
        return Err(Error::corrupt(
            "<page>",
            format!(
                "level sections ({} + {} bytes) exceed the page payload of {} bytes",
                rep_len,
                def_len,
                payload.len()
            ),
            location!(),
        ));
    }

    // Level sections are never compressed in v2.
    let rep = read_levels_v2(&payload[..rep_len], column.max_rep_level, num_values)?;
    let def = read_levels_v2(
        &payload[rep_len..rep_len + def_len],
        column.max_def_level,
        num_values,
    )?;

    let values_section = payload.slice(rep_len + def_len..);
    let values: StrataBuffer = if header.is_compressed && info.codec != Codec::Uncompressed {
        let uncompressed_len =
            (info.header.uncompressed_page_size as usize).saturating_sub(rep_len + def_len);
        let decompressor = decompressors.get(info.codec)?;
        decompressor
            .decompress(&values_section, uncompressed_len)?
            .into()
    } else {
        // is_compressed=false means the codec is skipped for this page
        // even though the chunk declares one.
        values_section.into()
    };
    let values_bytes = values.into_bytes();

    let num_rows = if column.max_rep_level == 0 {
        num_values
    } else {
        rep.iter().filter(|r| **r == 0).count()
    };

    build_page(
        rep,
        def,
        values_bytes,
        num_values,
        header.encoding,
        column,
        info.dictionary.as_deref(),
        Some(num_rows),
    )
}

#[allow(clippy::too_many_arguments)]
fn build_page(
    rep: Vec<u16>,
    def: Vec<u16>,
    values_bytes: Bytes,
    num_values: usize,
    encoding: Encoding,
    column: &ColumnDescriptor,
    dictionary: Option<&Dictionary>,
    num_rows: Option<usize>,
) -> Result<DecodedPage> {
    if !rep.is_empty() && rep.len() != num_values {
        return Err(Error::corrupt(
            "<page>",
            format!(
                "repetition stream holds {} levels, page header promised {num_values}",
                rep.len()
            ),
            location!(),
        ));
    }
    if !def.is_empty() && def.len() != num_values {
        return Err(Error::corrupt(
            "<page>",
            format!(
                "definition stream holds {} levels, page header promised {num_values}",
                def.len()
            ),
            location!(),
        ));
    }

    let present = if def.is_empty() {
        num_values
    } else {
        let mut present = 0usize;
        for (i, d) in def.iter().enumerate() {
            if *d == column.max_def_level {
                present += 1;
            }
            // A value inside a repeated element always has a defined
            // ancestor.
            if !rep.is_empty() && rep[i] > 0 && *d == 0 {
                return Err(Error::corrupt(
                    "<page>",
                    format!("value {i} has rep > 0 but def == 0"),
                    location!(),
                ));
            }
        }
        present
    };

    let decoded = decode_values(&values_bytes, present, encoding, column, dictionary)?;
    if decoded.len() != present {
        return Err(Error::corrupt(
            "<page>",
            format!(
                "decoded {} values, expected {present} present values",
                decoded.len()
            ),
            location!(),
        ));
    }

    // Align values with the level streams, reserving placeholder slots
    // where def < max_def.
    let values = if present == num_values {
        decoded
    } else {
        scatter(decoded, &def, column)
    };

    Ok(DecodedPage {
        rep,
        def,
        values,
        num_values,
        num_rows,
    })
}

fn decode_values(
    values_bytes: &Bytes,
    present: usize,
    encoding: Encoding,
    column: &ColumnDescriptor,
    dictionary: Option<&Dictionary>,
) -> Result<ValueVector> {
    match encoding {
        Encoding::Plain => decode_plain(values_bytes, present, column.physical_type),
        Encoding::PlainDictionary | Encoding::RleDictionary => {
            let dictionary = dictionary.ok_or_else(|| {
                Error::corrupt(
                    "<page>",
                    "dictionary-encoded page in a chunk without a dictionary page",
                    location!(),
                )
            })?;
            decode_dictionary(values_bytes, dictionary, present)
        }
        Encoding::DeltaBinaryPacked => {
            decode_delta_values(values_bytes, present, column.physical_type)
        }
        Encoding::DeltaLengthByteArray => {
            if column.physical_type != PhysicalType::ByteArray {
                return Err(Error::corrupt(
                    "<page>",
                    format!(
                        "DELTA_LENGTH_BYTE_ARRAY is not defined for {}",
                        column.physical_type
                    ),
                    location!(),
                ));
            }
            decode_delta_length_byte_array(values_bytes, present)
        }
        Encoding::DeltaByteArray => match column.physical_type {
            PhysicalType::ByteArray | PhysicalType::FixedLenByteArray(_) => {
                decode_delta_byte_array(values_bytes, present)
            }
            other => Err(Error::corrupt(
                "<page>",
                format!("DELTA_BYTE_ARRAY is not defined for {other}"),
                location!(),
            )),
        },
        Encoding::ByteStreamSplit => {
            decode_byte_stream_split(values_bytes, present, column.physical_type)
        }
        Encoding::Rle | Encoding::BitPacked => Err(Error::unsupported(
            format!("value encoding {encoding}"),
            location!(),
        )),
    }
}

fn scatter(decoded: ValueVector, def: &[u16], column: &ColumnDescriptor) -> ValueVector {
    let mut aligned = ValueVector::with_capacity(column.physical_type, def.len());
    let mut next = 0usize;
    for d in def {
        if *d == column.max_def_level {
            // Counts were validated above; indexing cannot miss.
            match (&mut aligned, &decoded) {
                (ValueVector::Bool(a), ValueVector::Bool(v)) => a.push(v[next]),
                (ValueVector::Int32(a), ValueVector::Int32(v)) => a.push(v[next]),
                (ValueVector::Int64(a), ValueVector::Int64(v)) => a.push(v[next]),
                (ValueVector::Int96(a), ValueVector::Int96(v)) => a.push(v[next]),
                (ValueVector::Float(a), ValueVector::Float(v)) => a.push(v[next]),
                (ValueVector::Double(a), ValueVector::Double(v)) => a.push(v[next]),
                (ValueVector::Bytes(a), ValueVector::Bytes(v)) => a.push(v[next].clone()),
                _ => unreachable!("decoder produced a mismatched tag"),
            }
            next += 1;
        } else {
            aligned.push_default();
        }
    }
    aligned
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::format::{DataPageHeader, DataPageHeaderV2};

    fn descriptor(physical_type: PhysicalType, max_def: u16, max_rep: u16) -> ColumnDescriptor {
        ColumnDescriptor {
            file: "test.parquet".to_string(),
            name: "col".to_string(),
            physical_type,
            max_def_level: max_def,
            max_rep_level: max_rep,
            codec: Codec::Uncompressed,
        }
    }

    fn v1_header(num_values: i32, encoding: Encoding, payload_len: usize, crc: Option<i32>) -> PageHeader {
        PageHeader {
            page_type: PageType::DataPage,
            uncompressed_page_size: payload_len as i32,
            compressed_page_size: payload_len as i32,
            crc,
            data_page: Some(DataPageHeader {
                num_values,
                encoding,
                definition_level_encoding: Encoding::Rle,
                repetition_level_encoding: Encoding::Rle,
            }),
            dictionary_page: None,
            data_page_v2: None,
        }
    }

    fn page_info(header: PageHeader, payload: Vec<u8>, codec: Codec) -> PageInfo {
        PageInfo {
            bytes: Bytes::from(payload),
            header,
            header_len: 0,
            offset_in_file: 0,
            codec,
            dictionary: None,
        }
    }

    fn hybrid_levels(levels: &[u16], bit_width: usize) -> Vec<u8> {
        // Single bit-packed group run, prefixed with the v1 u32 length.
        let values: Vec<u32> = levels.iter().map(|l| *l as u32).collect();
        let num_groups = values.len().div_ceil(8);
        let mut stream = vec![((num_groups as u8) << 1) | 1];
        let mut packed = vec![0u8; (num_groups * 8 * bit_width).div_ceil(8)];
        for (i, value) in values.iter().enumerate() {
            for bit in 0..bit_width {
                if (value >> bit) & 1 == 1 {
                    let pos = i * bit_width + bit;
                    packed[pos / 8] |= 1 << (pos % 8);
                }
            }
        }
        stream.extend_from_slice(&packed);
        let mut out = (stream.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&stream);
        out
    }

    #[test]
    fn test_v1_plain_required_column() {
        let mut payload = Vec::new();
        for v in [10i32, 20, 30] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let info = page_info(
            v1_header(3, Encoding::Plain, payload.len(), None),
            payload,
            Codec::Uncompressed,
        );
        let column = descriptor(PhysicalType::Int32, 0, 0);
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.num_values, 3);
        assert!(page.rep.is_empty());
        assert!(page.def.is_empty());
        assert_eq!(page.values, ValueVector::Int32(vec![10, 20, 30]));
    }

    #[test]
    fn test_v1_optional_column_reserves_null_slots() {
        // def levels 1,0,1: the middle value is null and consumes no
        // value bytes.
        let mut payload = hybrid_levels(&[1, 0, 1], 1);
        for v in [7i64, 9] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let info = page_info(
            v1_header(3, Encoding::Plain, payload.len(), None),
            payload,
            Codec::Uncompressed,
        );
        let column = descriptor(PhysicalType::Int64, 1, 0);
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.def, vec![1, 0, 1]);
        assert_eq!(page.values, ValueVector::Int64(vec![7, 0, 9]));
        assert!(page.is_present(0, 1));
        assert!(!page.is_present(1, 1));
    }

    #[test]
    fn test_v1_snappy_compressed() {
        let mut raw = Vec::new();
        for v in [1.5f64, -2.5] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let compressed = snap::raw::Encoder::new().compress_vec(&raw).unwrap();
        let mut header = v1_header(2, Encoding::Plain, compressed.len(), None);
        header.uncompressed_page_size = raw.len() as i32;
        let info = page_info(header, compressed, Codec::Snappy);
        let column = ColumnDescriptor {
            codec: Codec::Snappy,
            ..descriptor(PhysicalType::Double, 0, 0)
        };
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.values, ValueVector::Double(vec![1.5, -2.5]));
    }

    #[test]
    fn test_crc_mismatch_is_corrupt() {
        let payload = 5i32.to_le_bytes().to_vec();
        let good_crc = crc32fast::hash(&payload) as i32;
        let mut info = page_info(
            v1_header(1, Encoding::Plain, payload.len(), Some(good_crc)),
            payload,
            Codec::Uncompressed,
        );
        let column = descriptor(PhysicalType::Int32, 0, 0);
        decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();

        // Flip one byte of the stored page data.
        let mut corrupted = info.bytes.to_vec();
        corrupted[0] ^= 0xFF;
        info.bytes = Bytes::from(corrupted);
        let err = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap_err();
        match err {
            Error::Corrupt { path, source, .. } => {
                assert!(path.contains("col"), "path should name the column: {path}");
                assert!(source.to_string().contains("CRC"));
            }
            other => panic!("expected Corrupt, got {other}"),
        }
    }

    #[test]
    fn test_v2_uncompressed_levels_compressed_values() {
        // 4 values, def levels 1,1,0,1 (one null), no rep levels.
        let def_stream = {
            // RLE-free: one bit-packed group of 8.
            let mut stream = vec![0x03u8];
            stream.push(0b0000_1011); // 1,1,0,1 packed LSB-first
            stream
        };
        let mut raw_values = Vec::new();
        for v in [1i32, 2, 3] {
            raw_values.extend_from_slice(&v.to_le_bytes());
        }
        let compressed_values = snap::raw::Encoder::new().compress_vec(&raw_values).unwrap();
        let mut payload = def_stream.clone();
        payload.extend_from_slice(&compressed_values);

        let header = PageHeader {
            page_type: PageType::DataPageV2,
            uncompressed_page_size: (def_stream.len() + raw_values.len()) as i32,
            compressed_page_size: payload.len() as i32,
            crc: None,
            data_page: None,
            dictionary_page: None,
            data_page_v2: Some(DataPageHeaderV2 {
                num_values: 4,
                num_nulls: 1,
                num_rows: 4,
                encoding: Encoding::Plain,
                definition_levels_byte_length: def_stream.len() as i32,
                repetition_levels_byte_length: 0,
                is_compressed: true,
            }),
        };
        let info = page_info(header, payload, Codec::Snappy);
        let column = ColumnDescriptor {
            codec: Codec::Snappy,
            ..descriptor(PhysicalType::Int32, 1, 0)
        };
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.def, vec![1, 1, 0, 1]);
        assert_eq!(page.values, ValueVector::Int32(vec![1, 2, 0, 3]));
        assert_eq!(page.num_rows, Some(4));
    }

    #[test]
    fn test_v2_is_compressed_false_skips_codec() {
        let mut payload = Vec::new();
        for v in [11i32, 12] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let header = PageHeader {
            page_type: PageType::DataPageV2,
            uncompressed_page_size: payload.len() as i32,
            compressed_page_size: payload.len() as i32,
            crc: None,
            data_page: None,
            dictionary_page: None,
            data_page_v2: Some(DataPageHeaderV2 {
                num_values: 2,
                num_nulls: 0,
                num_rows: 2,
                encoding: Encoding::Plain,
                definition_levels_byte_length: 0,
                repetition_levels_byte_length: 0,
                is_compressed: false,
            }),
        };
        // The chunk declares snappy but this page opted out.
        let info = page_info(header, payload, Codec::Snappy);
        let column = ColumnDescriptor {
            codec: Codec::Snappy,
            ..descriptor(PhysicalType::Int32, 0, 0)
        };
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.values, ValueVector::Int32(vec![11, 12]));
    }

    #[test]
    fn test_empty_page_is_legal() {
        let info = page_info(
            v1_header(0, Encoding::Plain, 0, None),
            Vec::new(),
            Codec::Uncompressed,
        );
        let column = descriptor(PhysicalType::ByteArray, 0, 0);
        let page = decode_page(&info, &column, &DecompressorRegistry::default()).unwrap();
        assert_eq!(page.num_values, 0);
        assert_eq!(page.values.len(), 0);
    }

    #[test]
    fn test_dictionary_page_without_dictionary_is_corrupt() {
        let payload = vec![2u8, 2, 0]; // bit width 2, RLE run of 1 zero
        let info = page_info(
            v1_header(1, Encoding::RleDictionary, payload.len(), None),
            payload,
            Codec::Uncompressed,
        );
        let column = descriptor(PhysicalType::ByteArray, 0, 0);
        assert!(matches!(
            decode_page(&info, &column, &DecompressorRegistry::default()),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_unsupported_level_encoding() {
        let mut header = v1_header(1, Encoding::Plain, 4, None);
        header.data_page.as_mut().unwrap().definition_level_encoding = Encoding::BitPacked;
        let info = page_info(header, 1i32.to_le_bytes().to_vec(), Codec::Uncompressed);
        let column = descriptor(PhysicalType::Int32, 1, 0);
        assert!(matches!(
            decode_page(&info, &column, &DecompressorRegistry::default()),
            Err(Error::Unsupported { .. })
        ));
    }
}
