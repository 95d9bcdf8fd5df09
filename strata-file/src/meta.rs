// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Footer metadata: the schema element list, row groups and column
//! chunks, parsed from the thrift-compact footer bytes.

use snafu::location;
use strata_core::{Error, Result};
use strata_encoding::format::{ctype, Codec, Encoding, ThriftCursor};
use strata_encoding::PhysicalType;

/// Field repetition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repetition {
    Required,
    Optional,
    Repeated,
}

impl Repetition {
    fn from_thrift(value: i32, path: &str) -> Result<Self> {
        match value {
            0 => Ok(Self::Required),
            1 => Ok(Self::Optional),
            2 => Ok(Self::Repeated),
            other => Err(Error::corrupt(
                path,
                format!("unknown repetition type {other}"),
                location!(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Millis,
    Micros,
    Nanos,
}

/// Logical type annotations, folded together from the legacy
/// ConvertedType field and the newer LogicalType union.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalType {
    String,
    Enum,
    Json,
    Bson,
    Date,
    Time { unit: TimeUnit, utc: bool },
    Timestamp { unit: TimeUnit, utc: bool },
    Decimal { precision: i32, scale: i32 },
    Integer { bit_width: i8, signed: bool },
    Uuid,
    Float16,
    Interval,
    Map,
    List,
    Unknown,
}

impl LogicalType {
    fn from_converted(value: i32, scale: i32, precision: i32) -> Option<Self> {
        match value {
            0 => Some(Self::String),
            1 | 2 => Some(Self::Map),
            3 => Some(Self::List),
            4 => Some(Self::Enum),
            5 => Some(Self::Decimal { precision, scale }),
            6 => Some(Self::Date),
            7 => Some(Self::Time {
                unit: TimeUnit::Millis,
                utc: true,
            }),
            8 => Some(Self::Time {
                unit: TimeUnit::Micros,
                utc: true,
            }),
            9 => Some(Self::Timestamp {
                unit: TimeUnit::Millis,
                utc: true,
            }),
            10 => Some(Self::Timestamp {
                unit: TimeUnit::Micros,
                utc: true,
            }),
            11 => Some(Self::Integer {
                bit_width: 8,
                signed: false,
            }),
            12 => Some(Self::Integer {
                bit_width: 16,
                signed: false,
            }),
            13 => Some(Self::Integer {
                bit_width: 32,
                signed: false,
            }),
            14 => Some(Self::Integer {
                bit_width: 64,
                signed: false,
            }),
            15 => Some(Self::Integer {
                bit_width: 8,
                signed: true,
            }),
            16 => Some(Self::Integer {
                bit_width: 16,
                signed: true,
            }),
            17 => Some(Self::Integer {
                bit_width: 32,
                signed: true,
            }),
            18 => Some(Self::Integer {
                bit_width: 64,
                signed: true,
            }),
            19 => Some(Self::Json),
            20 => Some(Self::Bson),
            21 => Some(Self::Interval),
            _ => None,
        }
    }
}

/// One node of the flattened schema list.  `num_children > 0` marks a
/// group; the tree is rebuilt by `strata_file::schema`.
#[derive(Clone, Debug)]
pub struct SchemaElement {
    pub name: String,
    pub repetition: Option<Repetition>,
    pub physical_type: Option<PhysicalType>,
    pub num_children: usize,
    pub logical: Option<LogicalType>,
}

#[derive(Clone, Debug)]
pub struct ColumnChunkMeta {
    pub path_in_schema: Vec<String>,
    pub codec: Codec,
    pub encodings: Vec<Encoding>,
    pub num_values: i64,
    pub total_uncompressed_size: i64,
    pub total_compressed_size: i64,
    pub data_page_offset: i64,
    pub index_page_offset: Option<i64>,
    pub dictionary_page_offset: Option<i64>,
}

impl ColumnChunkMeta {
    /// First byte of the chunk: the dictionary page when present,
    /// otherwise the first data page.
    pub fn start_offset(&self) -> i64 {
        match self.dictionary_page_offset {
            Some(offset) if offset > 0 => offset,
            _ => self.data_page_offset,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RowGroupMeta {
    pub columns: Vec<ColumnChunkMeta>,
    pub total_byte_size: i64,
    pub num_rows: i64,
}

#[derive(Clone, Debug)]
pub struct FileMetadata {
    pub version: i32,
    pub schema: Vec<SchemaElement>,
    pub num_rows: i64,
    pub row_groups: Vec<RowGroupMeta>,
    pub created_by: Option<String>,
}

/// Parse the footer metadata.  Pure: `bytes -> FileMetadata`.
pub fn parse_file_metadata(bytes: &[u8], path: &str) -> Result<FileMetadata> {
    let mut cursor = ThriftCursor::new(bytes);
    let mut version = 0i32;
    let mut schema = Vec::new();
    let mut num_rows = 0i64;
    let mut row_groups = Vec::new();
    let mut created_by = None;

    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            1 => version = cursor.read_i32().map_err(|e| rewrap(e, path))?,
            2 => {
                let (_, size) = cursor.read_list_header().map_err(|e| rewrap(e, path))?;
                for _ in 0..size {
                    schema.push(read_schema_element(&mut cursor, path)?);
                }
            }
            3 => num_rows = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            4 => {
                let (_, size) = cursor.read_list_header().map_err(|e| rewrap(e, path))?;
                for _ in 0..size {
                    row_groups.push(read_row_group(&mut cursor, path)?);
                }
            }
            6 => created_by = Some(cursor.read_string().map_err(|e| rewrap(e, path))?),
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }

    if schema.is_empty() {
        return Err(Error::corrupt(
            path,
            "footer metadata holds no schema elements",
            location!(),
        ));
    }
    Ok(FileMetadata {
        version,
        schema,
        num_rows,
        row_groups,
        created_by,
    })
}

/// Replace the cursor's placeholder path with the real file path.
fn rewrap(e: Error, path: &str) -> Error {
    match e {
        Error::Corrupt {
            source, location, ..
        } => Error::Corrupt {
            path: path.to_string(),
            source,
            location,
        },
        other => other,
    }
}

fn read_schema_element(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<SchemaElement> {
    let mut name = String::new();
    let mut repetition = None;
    let mut physical_type_id: Option<i32> = None;
    let mut type_length: Option<i32> = None;
    let mut num_children = 0usize;
    let mut converted: Option<i32> = None;
    let mut scale = 0i32;
    let mut precision = 0i32;
    let mut logical = None;

    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            1 => physical_type_id = Some(cursor.read_i32().map_err(|e| rewrap(e, path))?),
            2 => type_length = Some(cursor.read_i32().map_err(|e| rewrap(e, path))?),
            3 => {
                repetition = Some(Repetition::from_thrift(
                    cursor.read_i32().map_err(|e| rewrap(e, path))?,
                    path,
                )?)
            }
            4 => name = cursor.read_string().map_err(|e| rewrap(e, path))?,
            5 => num_children = cursor.read_i32().map_err(|e| rewrap(e, path))?.max(0) as usize,
            6 => converted = Some(cursor.read_i32().map_err(|e| rewrap(e, path))?),
            7 => scale = cursor.read_i32().map_err(|e| rewrap(e, path))?,
            8 => precision = cursor.read_i32().map_err(|e| rewrap(e, path))?,
            10 => logical = read_logical_type(cursor, path)?,
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }

    let physical_type = physical_type_id
        .map(|id| PhysicalType::from_thrift(id, type_length).map_err(|e| rewrap(e, path)))
        .transpose()?;
    // The newer annotation wins when both are present.
    let logical = logical.or_else(|| {
        converted.and_then(|c| LogicalType::from_converted(c, scale, precision))
    });

    Ok(SchemaElement {
        name,
        repetition,
        physical_type,
        num_children,
        logical,
    })
}

fn read_logical_type(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<Option<LogicalType>> {
    let mut logical = None;
    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            1 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::String);
            }
            2 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Map);
            }
            3 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::List);
            }
            4 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Enum);
            }
            5 => {
                // DECIMAL { 1: scale, 2: precision }
                let mut scale = 0i32;
                let mut precision = 0i32;
                let mut last = 0i16;
                while let Some((id, ftype)) = cursor
                    .read_field_header(&mut last)
                    .map_err(|e| rewrap(e, path))?
                {
                    match id {
                        1 => scale = cursor.read_i32().map_err(|e| rewrap(e, path))?,
                        2 => precision = cursor.read_i32().map_err(|e| rewrap(e, path))?,
                        _ => cursor.skip(ftype).map_err(|e| rewrap(e, path))?,
                    }
                }
                logical = Some(LogicalType::Decimal { precision, scale });
            }
            6 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Date);
            }
            7 | 8 => {
                // TIME / TIMESTAMP { 1: isAdjustedToUTC, 2: unit }
                let mut utc = false;
                let mut unit = TimeUnit::Millis;
                let mut last = 0i16;
                while let Some((id, ftype)) = cursor
                    .read_field_header(&mut last)
                    .map_err(|e| rewrap(e, path))?
                {
                    match id {
                        1 => utc = ftype == ctype::BOOL_TRUE,
                        2 => unit = read_time_unit(cursor, path)?,
                        _ => cursor.skip(ftype).map_err(|e| rewrap(e, path))?,
                    }
                }
                logical = Some(if field_id == 7 {
                    LogicalType::Time { unit, utc }
                } else {
                    LogicalType::Timestamp { unit, utc }
                });
            }
            10 => {
                // INTEGER { 1: bitWidth, 2: isSigned }
                let mut bit_width = 32i8;
                let mut signed = true;
                let mut last = 0i16;
                while let Some((id, ftype)) = cursor
                    .read_field_header(&mut last)
                    .map_err(|e| rewrap(e, path))?
                {
                    match id {
                        1 => bit_width = cursor.read_byte().map_err(|e| rewrap(e, path))? as i8,
                        2 => signed = ftype == ctype::BOOL_TRUE,
                        _ => cursor.skip(ftype).map_err(|e| rewrap(e, path))?,
                    }
                }
                logical = Some(LogicalType::Integer { bit_width, signed });
            }
            11 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Unknown);
            }
            12 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Json);
            }
            13 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Bson);
            }
            14 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Uuid);
            }
            15 => {
                cursor.skip(field_type).map_err(|e| rewrap(e, path))?;
                logical = Some(LogicalType::Float16);
            }
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }
    Ok(logical)
}

fn read_time_unit(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<TimeUnit> {
    let mut unit = TimeUnit::Millis;
    let mut last = 0i16;
    while let Some((id, ftype)) = cursor
        .read_field_header(&mut last)
        .map_err(|e| rewrap(e, path))?
    {
        match id {
            1 => {
                cursor.skip(ftype).map_err(|e| rewrap(e, path))?;
                unit = TimeUnit::Millis;
            }
            2 => {
                cursor.skip(ftype).map_err(|e| rewrap(e, path))?;
                unit = TimeUnit::Micros;
            }
            3 => {
                cursor.skip(ftype).map_err(|e| rewrap(e, path))?;
                unit = TimeUnit::Nanos;
            }
            _ => cursor.skip(ftype).map_err(|e| rewrap(e, path))?,
        }
    }
    Ok(unit)
}

fn read_row_group(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<RowGroupMeta> {
    let mut columns = Vec::new();
    let mut total_byte_size = 0i64;
    let mut num_rows = 0i64;

    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            1 => {
                let (_, size) = cursor.read_list_header().map_err(|e| rewrap(e, path))?;
                for _ in 0..size {
                    columns.push(read_column_chunk(cursor, path)?);
                }
            }
            2 => total_byte_size = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            3 => num_rows = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }
    Ok(RowGroupMeta {
        columns,
        total_byte_size,
        num_rows,
    })
}

fn read_column_chunk(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<ColumnChunkMeta> {
    let mut meta = None;

    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            3 => meta = Some(read_column_meta(cursor, path)?),
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }
    meta.ok_or_else(|| {
        Error::corrupt(
            path,
            "column chunk without embedded column metadata",
            location!(),
        )
    })
}

fn read_column_meta(cursor: &mut ThriftCursor<'_>, path: &str) -> Result<ColumnChunkMeta> {
    let mut path_in_schema = Vec::new();
    let mut codec = Codec::Uncompressed;
    let mut encodings = Vec::new();
    let mut num_values = 0i64;
    let mut total_uncompressed_size = 0i64;
    let mut total_compressed_size = 0i64;
    let mut data_page_offset = 0i64;
    let mut index_page_offset = None;
    let mut dictionary_page_offset = None;

    let mut last_field_id = 0i16;
    while let Some((field_id, field_type)) = cursor
        .read_field_header(&mut last_field_id)
        .map_err(|e| rewrap(e, path))?
    {
        match field_id {
            2 => {
                let (_, size) = cursor.read_list_header().map_err(|e| rewrap(e, path))?;
                for _ in 0..size {
                    let raw = cursor.read_i32().map_err(|e| rewrap(e, path))?;
                    encodings.push(Encoding::try_from(raw).map_err(|e| rewrap(e, path))?);
                }
            }
            3 => {
                let (_, size) = cursor.read_list_header().map_err(|e| rewrap(e, path))?;
                for _ in 0..size {
                    path_in_schema.push(cursor.read_string().map_err(|e| rewrap(e, path))?);
                }
            }
            4 => {
                codec = Codec::try_from(cursor.read_i32().map_err(|e| rewrap(e, path))?)
                    .map_err(|e| rewrap(e, path))?
            }
            5 => num_values = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            6 => total_uncompressed_size = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            7 => total_compressed_size = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            9 => data_page_offset = cursor.read_i64().map_err(|e| rewrap(e, path))?,
            10 => index_page_offset = Some(cursor.read_i64().map_err(|e| rewrap(e, path))?),
            11 => dictionary_page_offset = Some(cursor.read_i64().map_err(|e| rewrap(e, path))?),
            _ => cursor.skip(field_type).map_err(|e| rewrap(e, path))?,
        }
    }
    Ok(ColumnChunkMeta {
        path_in_schema,
        codec,
        encodings,
        num_values,
        total_uncompressed_size,
        total_compressed_size,
        data_page_offset,
        index_page_offset,
        dictionary_page_offset,
    })
}
