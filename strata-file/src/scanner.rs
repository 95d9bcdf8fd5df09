// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Scanning a column chunk for its page boundaries.
//!
//! Walks the chunk's byte range, parses each page header, eagerly
//! decodes the dictionary page, and emits [`PageInfo`]s whose payload
//! slices reference the mapped file without copying.

use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use snafu::location;
use strata_core::error::box_error;
use strata_core::{Error, Result};
use strata_encoding::compression::DecompressorRegistry;
use strata_encoding::decoder::PageInfo;
use strata_encoding::format::{Codec, PageHeader, PageType};
use strata_encoding::{ColumnDescriptor, Dictionary, StrataBuffer};

use crate::meta::ColumnChunkMeta;

/// Scan one column chunk and return its data pages in file order.
///
/// `mapping` covers the whole file; the chunk's range is located via
/// the chunk metadata.  Trailing bytes after the last counted page are
/// tolerated.
pub fn scan_pages(
    chunk: &ColumnChunkMeta,
    column: &Arc<ColumnDescriptor>,
    mapping: &Bytes,
    decompressors: &DecompressorRegistry,
) -> Result<Vec<PageInfo>> {
    let chunk_start = chunk.start_offset();
    let chunk_size = chunk.total_compressed_size;
    let start = usize::try_from(chunk_start).ok();
    let size = usize::try_from(chunk_size).ok();
    let range = match (start, size) {
        (Some(start), Some(size)) if start + size <= mapping.len() => start..start + size,
        _ => {
            return Err(Error::corrupt(
                &column.file,
                format!(
                    "column chunk for '{}' out of bounds: start={chunk_start} size={chunk_size} \
                     dict_offset={:?} data_offset={} file_len={}",
                    column.name,
                    chunk.dictionary_page_offset,
                    chunk.data_page_offset,
                    mapping.len()
                ),
                location!(),
            ))
        }
    };
    let buffer = mapping.slice(range);

    let mut pages = Vec::new();
    let mut dictionary: Option<Arc<Dictionary>> = None;
    let mut values_seen = 0i64;
    let mut position = 0usize;

    while values_seen < chunk.num_values && position < buffer.len() {
        let (header, header_len) = PageHeader::parse(&buffer[position..]).map_err(|e| {
            Error::Corrupt {
                path: format!(
                    "{} (column '{}', page header at offset {}, codec {})",
                    column.file,
                    column.name,
                    chunk_start as u64 + position as u64,
                    chunk.codec
                ),
                source: box_error(e),
                location: location!(),
            }
        })?;
        let compressed_size = header.compressed_page_size as usize;
        let page_end = position + header_len + compressed_size;
        if page_end > buffer.len() {
            return Err(Error::corrupt(
                &column.file,
                format!(
                    "page of column '{}' at offset {} runs past its chunk: page_end={page_end} \
                     chunk_size={chunk_size}",
                    column.name,
                    chunk_start as u64 + position as u64,
                ),
                location!(),
            ));
        }

        match header.page_type {
            PageType::DictionaryPage => {
                let dict_header = header.dictionary_page.ok_or_else(|| {
                    Error::corrupt(
                        &column.file,
                        format!(
                            "dictionary page of column '{}' without a dictionary header",
                            column.name
                        ),
                        location!(),
                    )
                })?;
                let payload = buffer.slice(position + header_len..page_end);
                dictionary = Some(Arc::new(parse_dictionary(
                    payload,
                    &header,
                    dict_header.num_values.max(0) as usize,
                    column,
                    chunk.codec,
                    decompressors,
                )?));
            }
            PageType::DataPage | PageType::DataPageV2 => {
                values_seen += header.num_values();
                pages.push(PageInfo {
                    bytes: buffer.slice(position..page_end),
                    header,
                    header_len,
                    offset_in_file: chunk_start as u64 + position as u64,
                    codec: chunk.codec,
                    dictionary: dictionary.clone(),
                });
            }
            PageType::IndexPage => {}
        }
        position = page_end;
    }

    debug!(
        "scanned column '{}': {} data pages, {} values",
        column.name,
        pages.len(),
        values_seen
    );
    Ok(pages)
}

fn parse_dictionary(
    payload: Bytes,
    header: &PageHeader,
    num_values: usize,
    column: &Arc<ColumnDescriptor>,
    codec: Codec,
    decompressors: &DecompressorRegistry,
) -> Result<Dictionary> {
    let compressed_size = payload.len();
    let data: StrataBuffer = if codec == Codec::Uncompressed {
        payload.into()
    } else {
        let decompressor = decompressors.get(codec)?;
        decompressor
            .decompress(&payload, header.uncompressed_page_size as usize)?
            .into()
    };
    Dictionary::parse(data.into_bytes(), num_values, column.physical_type).map_err(|e| Error::Corrupt {
        path: format!(
            "{} (dictionary of column '{}', type {}, {} values, uncompressed {} bytes, \
             compressed {} bytes, codec {})",
            column.file,
            column.name,
            column.physical_type,
            num_values,
            header.uncompressed_page_size,
            compressed_size,
            codec
        ),
        source: box_error(e),
        location: location!(),
    })
}
