// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The compact wire format: a streaming cursor over thrift-compact bytes
//! and the page-header structures parsed from it.
//!
//! Both the file footer metadata and every page header use the same
//! compact encoding, so the cursor lives here and is shared by the footer
//! parser and the page scanner.  Headers are parsed incrementally from a
//! byte slice; [`ThriftCursor::bytes_read`] reports how far the scanner
//! must advance to reach the page payload.

use snafu::location;
use strata_core::{Error, Result};

/// Compact-protocol wire types.
pub mod ctype {
    pub const STOP: u8 = 0;
    pub const BOOL_TRUE: u8 = 1;
    pub const BOOL_FALSE: u8 = 2;
    pub const I8: u8 = 3;
    pub const I16: u8 = 4;
    pub const I32: u8 = 5;
    pub const I64: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const BINARY: u8 = 8;
    pub const LIST: u8 = 9;
    pub const SET: u8 = 10;
    pub const MAP: u8 = 11;
    pub const STRUCT: u8 = 12;
}

fn truncated(what: &str) -> Error {
    Error::corrupt("<thrift stream>", format!("truncated {what}"), location!())
}

/// Streaming cursor over a thrift-compact byte slice.
pub struct ThriftCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ThriftCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| truncated("byte"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| truncated("bytes"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_uleb(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 {
                return Err(Error::corrupt(
                    "<thrift stream>",
                    "varint longer than 64 bits",
                    location!(),
                ));
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn read_zigzag(&mut self) -> Result<i64> {
        let raw = self.read_uleb()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_zigzag()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_zigzag()
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.read_exact(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_binary(&mut self) -> Result<&'a [u8]> {
        let len = self.read_uleb()? as usize;
        self.read_exact(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_binary()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Error::corrupt("<thrift stream>", "string field is not UTF-8", location!())
        })
    }

    /// Read the next field header of a struct.
    ///
    /// Returns `None` at the struct's stop byte.  `last_field_id` is the
    /// caller-held running field id for short-form deltas; each nested
    /// struct keeps its own.
    pub fn read_field_header(&mut self, last_field_id: &mut i16) -> Result<Option<(i16, u8)>> {
        let byte = self.read_byte()?;
        if byte == ctype::STOP {
            return Ok(None);
        }
        let field_type = byte & 0x0F;
        let delta = byte >> 4;
        let field_id = if delta == 0 {
            self.read_zigzag()? as i16
        } else {
            *last_field_id + delta as i16
        };
        *last_field_id = field_id;
        Ok(Some((field_id, field_type)))
    }

    /// Read a list header: `(element_type, size)`.
    pub fn read_list_header(&mut self) -> Result<(u8, usize)> {
        let byte = self.read_byte()?;
        let elem_type = byte & 0x0F;
        let short_size = (byte >> 4) as usize;
        let size = if short_size == 15 {
            self.read_uleb()? as usize
        } else {
            short_size
        };
        Ok((elem_type, size))
    }

    /// Skip over one value of the given wire type.  Unknown fields in
    /// footers written by newer writers are skipped, never rejected.
    pub fn skip(&mut self, field_type: u8) -> Result<()> {
        match field_type {
            ctype::BOOL_TRUE | ctype::BOOL_FALSE => Ok(()),
            ctype::I8 => self.read_byte().map(|_| ()),
            ctype::I16 | ctype::I32 | ctype::I64 => self.read_uleb().map(|_| ()),
            ctype::DOUBLE => self.read_exact(8).map(|_| ()),
            ctype::BINARY => self.read_binary().map(|_| ()),
            ctype::LIST | ctype::SET => {
                let (elem_type, size) = self.read_list_header()?;
                for _ in 0..size {
                    // In lists, bools are full bytes rather than being
                    // folded into the element type.
                    if elem_type == ctype::BOOL_TRUE || elem_type == ctype::BOOL_FALSE {
                        self.read_byte()?;
                    } else {
                        self.skip(elem_type)?;
                    }
                }
                Ok(())
            }
            ctype::MAP => {
                let size = self.read_uleb()? as usize;
                if size == 0 {
                    return Ok(());
                }
                let kv_types = self.read_byte()?;
                let (key_type, value_type) = (kv_types >> 4, kv_types & 0x0F);
                for _ in 0..size {
                    self.skip(key_type)?;
                    self.skip(value_type)?;
                }
                Ok(())
            }
            ctype::STRUCT => {
                let mut last_field_id = 0i16;
                while let Some((_, nested_type)) = self.read_field_header(&mut last_field_id)? {
                    self.skip(nested_type)?;
                }
                Ok(())
            }
            other => Err(Error::corrupt(
                "<thrift stream>",
                format!("unknown compact wire type {other}"),
                location!(),
            )),
        }
    }
}

/// Page types of the format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageType {
    DataPage,
    IndexPage,
    DictionaryPage,
    DataPageV2,
}

impl TryFrom<i32> for PageType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::DataPage),
            1 => Ok(Self::IndexPage),
            2 => Ok(Self::DictionaryPage),
            3 => Ok(Self::DataPageV2),
            other => Err(Error::corrupt(
                "<page header>",
                format!("unknown page type {other}"),
                location!(),
            )),
        }
    }
}

/// Value and level encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    Plain,
    PlainDictionary,
    Rle,
    BitPacked,
    DeltaBinaryPacked,
    DeltaLengthByteArray,
    DeltaByteArray,
    RleDictionary,
    ByteStreamSplit,
}

impl Encoding {
    pub fn is_dictionary(self) -> bool {
        matches!(self, Self::PlainDictionary | Self::RleDictionary)
    }
}

impl TryFrom<i32> for Encoding {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Plain),
            2 => Ok(Self::PlainDictionary),
            3 => Ok(Self::Rle),
            4 => Ok(Self::BitPacked),
            5 => Ok(Self::DeltaBinaryPacked),
            6 => Ok(Self::DeltaLengthByteArray),
            7 => Ok(Self::DeltaByteArray),
            8 => Ok(Self::RleDictionary),
            9 => Ok(Self::ByteStreamSplit),
            other => Err(Error::corrupt(
                "<page header>",
                format!("unknown encoding {other}"),
                location!(),
            )),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plain => "PLAIN",
            Self::PlainDictionary => "PLAIN_DICTIONARY",
            Self::Rle => "RLE",
            Self::BitPacked => "BIT_PACKED",
            Self::DeltaBinaryPacked => "DELTA_BINARY_PACKED",
            Self::DeltaLengthByteArray => "DELTA_LENGTH_BYTE_ARRAY",
            Self::DeltaByteArray => "DELTA_BYTE_ARRAY",
            Self::RleDictionary => "RLE_DICTIONARY",
            Self::ByteStreamSplit => "BYTE_STREAM_SPLIT",
        };
        write!(f, "{name}")
    }
}

/// Compression codecs a column chunk may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    Uncompressed,
    Snappy,
    Gzip,
    Lzo,
    Brotli,
    Lz4,
    Zstd,
    Lz4Raw,
}

impl TryFrom<i32> for Codec {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Uncompressed),
            1 => Ok(Self::Snappy),
            2 => Ok(Self::Gzip),
            3 => Ok(Self::Lzo),
            4 => Ok(Self::Brotli),
            5 => Ok(Self::Lz4),
            6 => Ok(Self::Zstd),
            7 => Ok(Self::Lz4Raw),
            other => Err(Error::corrupt(
                "<metadata>",
                format!("unknown compression codec {other}"),
                location!(),
            )),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uncompressed => "UNCOMPRESSED",
            Self::Snappy => "SNAPPY",
            Self::Gzip => "GZIP",
            Self::Lzo => "LZO",
            Self::Brotli => "BROTLI",
            Self::Lz4 => "LZ4",
            Self::Zstd => "ZSTD",
            Self::Lz4Raw => "LZ4_RAW",
        };
        write!(f, "{name}")
    }
}

/// Header of a v1 data page.
#[derive(Clone, Copy, Debug)]
pub struct DataPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub definition_level_encoding: Encoding,
    pub repetition_level_encoding: Encoding,
}

/// Header of a v2 data page.  Level sections are stored uncompressed
/// ahead of the (possibly compressed) values section.
#[derive(Clone, Copy, Debug)]
pub struct DataPageHeaderV2 {
    pub num_values: i32,
    pub num_nulls: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub definition_levels_byte_length: i32,
    pub repetition_levels_byte_length: i32,
    pub is_compressed: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
}

/// A parsed page header, common fields plus exactly one nested header.
#[derive(Clone, Debug)]
pub struct PageHeader {
    pub page_type: PageType,
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub crc: Option<i32>,
    pub data_page: Option<DataPageHeader>,
    pub dictionary_page: Option<DictionaryPageHeader>,
    pub data_page_v2: Option<DataPageHeaderV2>,
}

impl PageHeader {
    /// Parse one page header from the front of `buf`, reporting bytes
    /// consumed so the scanner can locate the payload.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = ThriftCursor::new(buf);
        let header = Self::read(&mut cursor)?;
        Ok((header, cursor.bytes_read()))
    }

    fn read(cursor: &mut ThriftCursor<'_>) -> Result<Self> {
        let mut page_type: Option<PageType> = None;
        let mut uncompressed_page_size = 0i32;
        let mut compressed_page_size = 0i32;
        let mut crc = None;
        let mut data_page = None;
        let mut dictionary_page = None;
        let mut data_page_v2 = None;

        let mut last_field_id = 0i16;
        while let Some((field_id, field_type)) = cursor.read_field_header(&mut last_field_id)? {
            match field_id {
                1 => page_type = Some(PageType::try_from(cursor.read_i32()?)?),
                2 => uncompressed_page_size = cursor.read_i32()?,
                3 => compressed_page_size = cursor.read_i32()?,
                4 => crc = Some(cursor.read_i32()?),
                5 => data_page = Some(Self::read_data_page(cursor)?),
                7 => dictionary_page = Some(Self::read_dictionary_page(cursor)?),
                8 => data_page_v2 = Some(Self::read_data_page_v2(cursor)?),
                _ => cursor.skip(field_type)?,
            }
        }

        let page_type = page_type.ok_or_else(|| {
            Error::corrupt("<page header>", "page header missing its type", location!())
        })?;
        if compressed_page_size < 0 || uncompressed_page_size < 0 {
            return Err(Error::corrupt(
                "<page header>",
                format!(
                    "negative page sizes: compressed={compressed_page_size} uncompressed={uncompressed_page_size}"
                ),
                location!(),
            ));
        }
        Ok(Self {
            page_type,
            uncompressed_page_size,
            compressed_page_size,
            crc,
            data_page,
            dictionary_page,
            data_page_v2,
        })
    }

    fn read_data_page(cursor: &mut ThriftCursor<'_>) -> Result<DataPageHeader> {
        let mut num_values = 0i32;
        let mut encoding = Encoding::Plain;
        let mut definition_level_encoding = Encoding::Rle;
        let mut repetition_level_encoding = Encoding::Rle;

        let mut last_field_id = 0i16;
        while let Some((field_id, field_type)) = cursor.read_field_header(&mut last_field_id)? {
            match field_id {
                1 => num_values = cursor.read_i32()?,
                2 => encoding = Encoding::try_from(cursor.read_i32()?)?,
                3 => definition_level_encoding = Encoding::try_from(cursor.read_i32()?)?,
                4 => repetition_level_encoding = Encoding::try_from(cursor.read_i32()?)?,
                _ => cursor.skip(field_type)?,
            }
        }
        Ok(DataPageHeader {
            num_values,
            encoding,
            definition_level_encoding,
            repetition_level_encoding,
        })
    }

    fn read_data_page_v2(cursor: &mut ThriftCursor<'_>) -> Result<DataPageHeaderV2> {
        let mut num_values = 0i32;
        let mut num_nulls = 0i32;
        let mut num_rows = 0i32;
        let mut encoding = Encoding::Plain;
        let mut definition_levels_byte_length = 0i32;
        let mut repetition_levels_byte_length = 0i32;
        // Defaults to true when the writer omits the field.
        let mut is_compressed = true;

        let mut last_field_id = 0i16;
        while let Some((field_id, field_type)) = cursor.read_field_header(&mut last_field_id)? {
            match field_id {
                1 => num_values = cursor.read_i32()?,
                2 => num_nulls = cursor.read_i32()?,
                3 => num_rows = cursor.read_i32()?,
                4 => encoding = Encoding::try_from(cursor.read_i32()?)?,
                5 => definition_levels_byte_length = cursor.read_i32()?,
                6 => repetition_levels_byte_length = cursor.read_i32()?,
                7 => is_compressed = field_type == ctype::BOOL_TRUE,
                _ => cursor.skip(field_type)?,
            }
        }
        Ok(DataPageHeaderV2 {
            num_values,
            num_nulls,
            num_rows,
            encoding,
            definition_levels_byte_length,
            repetition_levels_byte_length,
            is_compressed,
        })
    }

    fn read_dictionary_page(cursor: &mut ThriftCursor<'_>) -> Result<DictionaryPageHeader> {
        let mut num_values = 0i32;
        let mut encoding = Encoding::Plain;

        let mut last_field_id = 0i16;
        while let Some((field_id, field_type)) = cursor.read_field_header(&mut last_field_id)? {
            match field_id {
                1 => num_values = cursor.read_i32()?,
                2 => encoding = Encoding::try_from(cursor.read_i32()?)?,
                _ => cursor.skip(field_type)?,
            }
        }
        Ok(DictionaryPageHeader {
            num_values,
            encoding,
        })
    }

    /// Logical value count of a page (zero for index pages).
    pub fn num_values(&self) -> i64 {
        match self.page_type {
            PageType::DataPage => self.data_page.map(|h| h.num_values as i64).unwrap_or(0),
            PageType::DataPageV2 => self.data_page_v2.map(|h| h.num_values as i64).unwrap_or(0),
            PageType::DictionaryPage => {
                self.dictionary_page.map(|h| h.num_values as i64).unwrap_or(0)
            }
            PageType::IndexPage => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Minimal compact-protocol writer used to build test vectors.
    pub(crate) struct ThriftWriter {
        pub out: Vec<u8>,
        last_field_id: i16,
    }

    impl ThriftWriter {
        pub fn new() -> Self {
            Self {
                out: Vec::new(),
                last_field_id: 0,
            }
        }

        pub fn uleb(&mut self, mut value: u64) {
            loop {
                let byte = (value & 0x7F) as u8;
                value >>= 7;
                if value == 0 {
                    self.out.push(byte);
                    break;
                }
                self.out.push(byte | 0x80);
            }
        }

        pub fn zigzag(&mut self, value: i64) {
            self.uleb(((value << 1) ^ (value >> 63)) as u64);
        }

        pub fn field(&mut self, id: i16, field_type: u8) {
            let delta = id - self.last_field_id;
            if (1..=15).contains(&delta) {
                self.out.push(((delta as u8) << 4) | field_type);
            } else {
                self.out.push(field_type);
                self.zigzag(id as i64);
            }
            self.last_field_id = id;
        }

        pub fn i32_field(&mut self, id: i16, value: i32) {
            self.field(id, ctype::I32);
            self.zigzag(value as i64);
        }

        pub fn stop(&mut self) {
            self.out.push(ctype::STOP);
        }

        /// Write a nested struct field: field deltas restart inside.
        pub fn struct_field(&mut self, id: i16, body: impl FnOnce(&mut Self)) {
            self.field(id, ctype::STRUCT);
            let saved = self.last_field_id;
            self.last_field_id = 0;
            body(self);
            self.stop();
            self.last_field_id = saved;
        }
    }

    fn v1_header_bytes(num_values: i32, encoding: i32) -> Vec<u8> {
        let mut w = ThriftWriter::new();
        w.i32_field(1, 0); // type = DATA_PAGE
        w.i32_field(2, 100); // uncompressed size
        w.i32_field(3, 80); // compressed size
        w.struct_field(5, |w| {
            w.i32_field(1, num_values);
            w.i32_field(2, encoding);
            w.i32_field(3, 3); // def levels RLE
            w.i32_field(4, 3); // rep levels RLE
        });
        w.stop();
        w.out
    }

    #[test]
    fn test_parse_v1_data_page_header() {
        let bytes = v1_header_bytes(1000, 0);
        let (header, consumed) = PageHeader::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(header.page_type, PageType::DataPage);
        assert_eq!(header.uncompressed_page_size, 100);
        assert_eq!(header.compressed_page_size, 80);
        assert_eq!(header.crc, None);
        let data_page = header.data_page.unwrap();
        assert_eq!(data_page.num_values, 1000);
        assert_eq!(data_page.encoding, Encoding::Plain);
        assert_eq!(data_page.definition_level_encoding, Encoding::Rle);
    }

    #[test]
    fn test_parse_reports_consumed_with_trailing_bytes() {
        let mut bytes = v1_header_bytes(5, 8);
        let header_len = bytes.len();
        bytes.extend_from_slice(&[0xAB; 16]); // page payload
        let (header, consumed) = PageHeader::parse(&bytes).unwrap();
        assert_eq!(consumed, header_len);
        assert_eq!(header.data_page.unwrap().encoding, Encoding::RleDictionary);
    }

    #[test]
    fn test_parse_v2_header_with_uncompressed_flag() {
        let mut w = ThriftWriter::new();
        w.i32_field(1, 3); // DATA_PAGE_V2
        w.i32_field(2, 64);
        w.i32_field(3, 64);
        w.struct_field(8, |w| {
            w.i32_field(1, 10);
            w.i32_field(2, 2);
            w.i32_field(3, 4);
            w.i32_field(4, 0);
            w.i32_field(5, 6);
            w.i32_field(6, 2);
            w.field(7, ctype::BOOL_FALSE);
        });
        w.stop();
        let (header, _) = PageHeader::parse(&w.out).unwrap();
        let v2 = header.data_page_v2.unwrap();
        assert_eq!(v2.num_values, 10);
        assert_eq!(v2.num_nulls, 2);
        assert_eq!(v2.num_rows, 4);
        assert_eq!(v2.definition_levels_byte_length, 6);
        assert_eq!(v2.repetition_levels_byte_length, 2);
        assert!(!v2.is_compressed);
    }

    #[test]
    fn test_dictionary_page_header() {
        let mut w = ThriftWriter::new();
        w.i32_field(1, 2); // DICTIONARY_PAGE
        w.i32_field(2, 40);
        w.i32_field(3, 40);
        w.struct_field(7, |w| {
            w.i32_field(1, 3);
            w.i32_field(2, 0);
        });
        w.stop();
        let (header, _) = PageHeader::parse(&w.out).unwrap();
        assert_eq!(header.page_type, PageType::DictionaryPage);
        assert_eq!(header.dictionary_page.unwrap().num_values, 3);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut w = ThriftWriter::new();
        w.i32_field(1, 0);
        w.i32_field(2, 10);
        w.i32_field(3, 10);
        w.struct_field(5, |w| {
            w.i32_field(1, 7);
            w.i32_field(2, 0);
            w.i32_field(3, 3);
            w.i32_field(4, 3);
        });
        // A statistics-like struct the parser has no interest in.
        w.struct_field(6, |w| {
            w.field(1, ctype::BINARY);
            w.uleb(3);
            w.out.extend_from_slice(b"max");
        });
        w.stop();
        let (header, _) = PageHeader::parse(&w.out).unwrap();
        assert_eq!(header.data_page.unwrap().num_values, 7);
    }

    #[test]
    fn test_truncated_header_is_corrupt() {
        let bytes = v1_header_bytes(5, 0);
        let err = PageHeader::parse(&bytes[..3]).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }
}
