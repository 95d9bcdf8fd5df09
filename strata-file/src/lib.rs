// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Strata: a columnar file reader that materializes rows, including
//! nested structs, lists and maps, from Dremel-striped column
//! streams.
//!
//! ```no_run
//! use strata_file::FileHandle;
//!
//! # fn main() -> strata_core::Result<()> {
//! let file = FileHandle::open_path("trips.parquet")?;
//! let mut rows = file.create_row_reader(None)?;
//! while rows.has_next()? {
//!     rows.next()?;
//!     let vendor = rows.get_i32("VendorID")?;
//!     let distance = rows.get_f64("trip_distance")?;
//!     println!("{vendor}: {distance}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod assembly;
pub mod batch;
pub mod convert;
pub mod cursor;
pub mod footer;
pub mod meta;
pub mod reader;
pub mod row;
pub mod scanner;
pub mod schema;
pub mod testing;

pub use convert::Decimal;
pub use meta::{FileMetadata, LogicalType, Repetition, TimeUnit};
pub use reader::{FileHandle, RowReader};
pub use row::{Cell, ListView, MapView, StructView};
pub use schema::{FileSchema, ProjectedSchema};

pub use strata_core::{Error, Result};
