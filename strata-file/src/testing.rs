// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Builders for tiny in-memory files, used by unit and integration
//! tests.  There is no production writer; this module emits just enough
//! of the format to exercise the read path.

use bytes::Bytes;

use crate::meta::Repetition;

/// Minimal thrift-compact writer.
pub struct ThriftWriter {
    pub out: Vec<u8>,
    last_field_id: i16,
}

impl Default for ThriftWriter {
    fn default() -> Self {
        Self::new()
    }
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
        self.field(id, 5);
        self.zigzag(value as i64);
    }

    pub fn i64_field(&mut self, id: i16, value: i64) {
        self.field(id, 6);
        self.zigzag(value);
    }

    pub fn bool_field(&mut self, id: i16, value: bool) {
        self.field(id, if value { 1 } else { 2 });
    }

    pub fn string_field(&mut self, id: i16, value: &str) {
        self.field(id, 8);
        self.uleb(value.len() as u64);
        self.out.extend_from_slice(value.as_bytes());
    }

    pub fn list_field(&mut self, id: i16, elem_type: u8, size: usize) {
        self.field(id, 9);
        if size < 15 {
            self.out.push(((size as u8) << 4) | elem_type);
        } else {
            self.out.push(0xF0 | elem_type);
            self.uleb(size as u64);
        }
    }

    pub fn struct_field(&mut self, id: i16, body: impl FnOnce(&mut Self)) {
        self.field(id, 12);
        let saved = self.last_field_id;
        self.last_field_id = 0;
        body(self);
        self.stop();
        self.last_field_id = saved;
    }

    pub fn stop(&mut self) {
        self.out.push(0);
    }

    /// Struct element inside a list: field deltas restart.
    pub fn list_struct(&mut self, body: impl FnOnce(&mut Self)) {
        let saved = self.last_field_id;
        self.last_field_id = 0;
        body(self);
        self.stop();
        self.last_field_id = saved;
    }
}

/// Encode one RLE/bit-packed hybrid stream as a single bit-packed run.
pub fn encode_hybrid(values: &[u32], bit_width: usize) -> Vec<u8> {
    let mut out = Vec::new();
    if values.is_empty() || bit_width == 0 {
        return out;
    }
    let num_groups = values.len().div_ceil(8);
    let mut header = ((num_groups as u64) << 1) | 1;
    loop {
        let byte = (header & 0x7F) as u8;
        header >>= 7;
        if header == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    let mut packed = vec![0u8; (num_groups * 8 * bit_width).div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        for bit in 0..bit_width {
            if (value >> bit) & 1 == 1 {
                let pos = i * bit_width + bit;
                packed[pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    out.extend_from_slice(&packed);
    out
}

/// A v1 level stream: `[len: u32 le][hybrid]`.  Empty for max level 0.
pub fn encode_levels_v1(levels: &[u16], bit_width: usize) -> Vec<u8> {
    let values: Vec<u32> = levels.iter().map(|l| *l as u32).collect();
    let stream = encode_hybrid(&values, bit_width);
    let mut out = (stream.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&stream);
    out
}

/// PLAIN-encoded values for the test schemas.
pub enum PlainColumn<'a> {
    Bool(&'a [bool]),
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    Float(&'a [f32]),
    Double(&'a [f64]),
    Str(&'a [&'a str]),
}

pub fn encode_plain(values: &PlainColumn<'_>) -> Vec<u8> {
    let mut out = Vec::new();
    match values {
        PlainColumn::Bool(vs) => {
            out = vec![0u8; vs.len().div_ceil(8)];
            for (i, v) in vs.iter().enumerate() {
                if *v {
                    out[i / 8] |= 1 << (i % 8);
                }
            }
        }
        PlainColumn::Int32(vs) => {
            for v in *vs {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        PlainColumn::Int64(vs) => {
            for v in *vs {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        PlainColumn::Float(vs) => {
            for v in *vs {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        PlainColumn::Double(vs) => {
            for v in *vs {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        PlainColumn::Str(vs) => {
            for v in *vs {
                out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                out.extend_from_slice(v.as_bytes());
            }
        }
    }
    out
}

/// A v1 data page for one leaf column: `[rep levels][def levels]
/// [PLAIN values]`, levels present only when their maxima are nonzero.
pub fn encode_leaf_page(
    rep: Option<(&[u16], usize)>,
    def: Option<(&[u16], usize)>,
    values: &PlainColumn<'_>,
) -> Vec<u8> {
    let num_values = match (rep, def) {
        (Some((rep, _)), _) => rep.len(),
        (None, Some((def, _))) => def.len(),
        (None, None) => plain_len(values),
    };
    let mut payload = Vec::new();
    if let Some((levels, bit_width)) = rep {
        payload.extend_from_slice(&encode_levels_v1(levels, bit_width));
    }
    if let Some((levels, bit_width)) = def {
        payload.extend_from_slice(&encode_levels_v1(levels, bit_width));
    }
    payload.extend_from_slice(&encode_plain(values));
    encode_data_page_v1(num_values, 0, &payload, false)
}

fn plain_len(values: &PlainColumn<'_>) -> usize {
    match values {
        PlainColumn::Bool(v) => v.len(),
        PlainColumn::Int32(v) => v.len(),
        PlainColumn::Int64(v) => v.len(),
        PlainColumn::Float(v) => v.len(),
        PlainColumn::Double(v) => v.len(),
        PlainColumn::Str(v) => v.len(),
    }
}

/// Serialize a v1 data page (header + payload) for an uncompressed
/// chunk.  `crc` is computed over the payload when requested.
pub fn encode_data_page_v1(
    num_values: usize,
    encoding: i32,
    payload: &[u8],
    with_crc: bool,
) -> Vec<u8> {
    let mut w = ThriftWriter::new();
    w.i32_field(1, 0); // DATA_PAGE
    w.i32_field(2, payload.len() as i32);
    w.i32_field(3, payload.len() as i32);
    if with_crc {
        w.i32_field(4, crc32fast::hash(payload) as i32);
    }
    w.struct_field(5, |w| {
        w.i32_field(1, num_values as i32);
        w.i32_field(2, encoding);
        w.i32_field(3, 3); // RLE
        w.i32_field(4, 3); // RLE
    });
    w.stop();
    let mut out = w.out;
    out.extend_from_slice(payload);
    out
}

/// Serialize a dictionary page (PLAIN payload).
pub fn encode_dictionary_page(num_values: usize, payload: &[u8]) -> Vec<u8> {
    let mut w = ThriftWriter::new();
    w.i32_field(1, 2); // DICTIONARY_PAGE
    w.i32_field(2, payload.len() as i32);
    w.i32_field(3, payload.len() as i32);
    w.struct_field(7, |w| {
        w.i32_field(1, num_values as i32);
        w.i32_field(2, 2); // PLAIN_DICTIONARY
    });
    w.stop();
    let mut out = w.out;
    out.extend_from_slice(payload);
    out
}

/// Schema element description for [`MetadataBuilder`].
struct ElementSpec {
    name: String,
    repetition: Option<Repetition>,
    type_id: Option<i32>,
    type_length: Option<i32>,
    num_children: usize,
    converted: Option<i32>,
}

struct ColumnSpec {
    path: Vec<String>,
    codec: i32,
    encodings: Vec<i32>,
    num_values: i64,
    data_page_offset: i64,
    total_compressed_size: i64,
    dictionary_page_offset: Option<i64>,
}

struct RowGroupSpec {
    num_rows: i64,
    columns: Vec<ColumnSpec>,
}

/// Builds footer metadata bytes for hand-assembled files.
pub struct MetadataBuilder {
    num_rows: i64,
    elements: Vec<ElementSpec>,
    row_groups: Vec<RowGroupSpec>,
}

pub struct RowGroupBuilder<'a> {
    spec: &'a mut RowGroupSpec,
}

impl RowGroupBuilder<'_> {
    pub fn column(
        &mut self,
        path: &[&str],
        codec: i32,
        num_values: i64,
        data_page_offset: i64,
        total_compressed_size: i64,
        dictionary_page_offset: Option<i64>,
    ) -> &mut Self {
        self.column_with_encodings(
            path,
            codec,
            &[0, 3],
            num_values,
            data_page_offset,
            total_compressed_size,
            dictionary_page_offset,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn column_with_encodings(
        &mut self,
        path: &[&str],
        codec: i32,
        encodings: &[i32],
        num_values: i64,
        data_page_offset: i64,
        total_compressed_size: i64,
        dictionary_page_offset: Option<i64>,
    ) -> &mut Self {
        self.spec.columns.push(ColumnSpec {
            path: path.iter().map(|s| s.to_string()).collect(),
            codec,
            encodings: encodings.to_vec(),
            num_values,
            data_page_offset,
            total_compressed_size,
            dictionary_page_offset,
        });
        self
    }
}

impl MetadataBuilder {
    pub fn new(num_rows: i64) -> Self {
        Self {
            num_rows,
            elements: Vec::new(),
            row_groups: Vec::new(),
        }
    }

    pub fn element(
        mut self,
        name: &str,
        repetition: Option<Repetition>,
        type_id: Option<i32>,
        num_children: usize,
        converted: Option<i32>,
    ) -> Self {
        self.elements.push(ElementSpec {
            name: name.to_string(),
            repetition,
            type_id,
            type_length: None,
            num_children,
            converted,
        });
        self
    }

    pub fn fixed_len_element(
        mut self,
        name: &str,
        repetition: Repetition,
        type_length: i32,
        converted: Option<i32>,
    ) -> Self {
        self.elements.push(ElementSpec {
            name: name.to_string(),
            repetition: Some(repetition),
            type_id: Some(7),
            type_length: Some(type_length),
            num_children: 0,
            converted,
        });
        self
    }

    pub fn row_group(mut self, num_rows: i64, body: impl FnOnce(&mut RowGroupBuilder<'_>)) -> Self {
        let mut spec = RowGroupSpec {
            num_rows,
            columns: Vec::new(),
        };
        body(&mut RowGroupBuilder { spec: &mut spec });
        self.row_groups.push(spec);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut w = ThriftWriter::new();
        w.i32_field(1, 1); // version
        w.list_field(2, 12, self.elements.len());
        for element in &self.elements {
            w.list_struct(|w| {
                if let Some(type_id) = element.type_id {
                    w.i32_field(1, type_id);
                }
                if let Some(type_length) = element.type_length {
                    w.i32_field(2, type_length);
                }
                if let Some(repetition) = element.repetition {
                    let id = match repetition {
                        Repetition::Required => 0,
                        Repetition::Optional => 1,
                        Repetition::Repeated => 2,
                    };
                    w.i32_field(3, id);
                }
                w.string_field(4, &element.name);
                if element.num_children > 0 {
                    w.i32_field(5, element.num_children as i32);
                }
                if let Some(converted) = element.converted {
                    w.i32_field(6, converted);
                }
            });
        }
        w.i64_field(3, self.num_rows);
        if !self.row_groups.is_empty() {
            w.list_field(4, 12, self.row_groups.len());
            for row_group in &self.row_groups {
                w.list_struct(|w| {
                    w.list_field(1, 12, row_group.columns.len());
                    for column in &row_group.columns {
                        w.list_struct(|w| {
                            w.i64_field(2, column.data_page_offset);
                            w.struct_field(3, |w| {
                                w.i32_field(1, 0); // physical type (informational)
                                w.list_field(2, 5, column.encodings.len());
                                for encoding in &column.encodings {
                                    w.zigzag(*encoding as i64);
                                }
                                w.list_field(3, 8, column.path.len());
                                for part in &column.path {
                                    w.uleb(part.len() as u64);
                                    w.out.extend_from_slice(part.as_bytes());
                                }
                                w.i32_field(4, column.codec);
                                w.i64_field(5, column.num_values);
                                w.i64_field(6, column.total_compressed_size);
                                w.i64_field(7, column.total_compressed_size);
                                w.i64_field(9, column.data_page_offset);
                                if let Some(offset) = column.dictionary_page_offset {
                                    w.i64_field(11, offset);
                                }
                            });
                        });
                    }
                    w.i64_field(2, 0);
                    w.i64_field(3, row_group.num_rows);
                });
            }
        }
        w.string_field(6, "strata test builder");
        w.stop();
        w.out
    }
}

/// Assemble a complete single-file image: leading magic, column chunk
/// bytes at their recorded offsets, footer metadata and trailer.
pub struct FileBuilder {
    bytes: Vec<u8>,
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBuilder {
    pub fn new() -> Self {
        Self {
            bytes: b"PAR1".to_vec(),
        }
    }

    /// Append a column chunk's pages; returns the chunk's file offset.
    pub fn append_chunk(&mut self, pages: &[Vec<u8>]) -> i64 {
        let offset = self.bytes.len() as i64;
        for page in pages {
            self.bytes.extend_from_slice(page);
        }
        offset
    }

    /// Current position, the offset the next chunk would land at.
    pub fn position(&self) -> i64 {
        self.bytes.len() as i64
    }

    pub fn finish(mut self, metadata: &[u8]) -> Bytes {
        self.bytes.extend_from_slice(metadata);
        self.bytes
            .extend_from_slice(&(metadata.len() as i32).to_le_bytes());
        self.bytes.extend_from_slice(b"PAR1");
        Bytes::from(self.bytes)
    }

    /// Flip one byte at an absolute offset, for corruption tests.
    pub fn corrupt_at(bytes: &Bytes, offset: usize) -> Bytes {
        let mut out = bytes.to_vec();
        out[offset] ^= 0xFF;
        Bytes::from(out)
    }
}
