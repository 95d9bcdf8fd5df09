// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Byte-level decoding for the Strata columnar reader.
//!
//! Everything between a column chunk's raw bytes and typed values lives
//! here: the compact wire-format cursor, page headers, decompression,
//! the RLE/bit-packed hybrid level decoder, the value encodings, and
//! the page decoder that ties them together.  File-level concerns
//! (schema, scanning, assembly) live in `strata-file`.

pub mod buffer;
pub mod compression;
pub mod data;
pub mod decoder;
pub mod encodings;
pub mod format;
pub mod levels;

pub use buffer::StrataBuffer;
pub use data::{ColumnDescriptor, Dictionary, PhysicalType, Value, ValueVector};
pub use decoder::{decode_page, DecodedPage, PageInfo};
pub use format::{Codec, Encoding, PageHeader, PageType};
