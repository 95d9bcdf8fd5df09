// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The file handle and row reader.
//!
//! `FileHandle::open` wires parsed metadata, the file mapping, the
//! executor and the codec registry together; `create_row_reader` picks
//! the flat or nested pipeline at open time.  The reader is a lazy
//! finite sequence: `has_next` initializes on first use and loads
//! batches as rows are consumed; a terminal error renders the reader
//! unusable (every later call returns the same error).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::debug;
use snafu::location;
use strata_core::executor::Executor;
use strata_core::{Error, Result};
use strata_encoding::compression::DecompressorRegistry;
use strata_encoding::{PhysicalType, Value};

use crate::assemble::{RecordArena, RecordAssembler};
use crate::assembly::{ColumnAssemblyBuffer, FlatBatch};
use crate::batch::{ColumnValueIterator, NestedColumnBatch};
use crate::convert::{
    date_from_days, time_from_value, timestamp_from_value, uuid_string, Decimal,
};
use crate::cursor::PageCursor;
use crate::footer;
use crate::meta::{parse_file_metadata, FileMetadata, LogicalType};
use crate::row::{null_list, null_map, null_struct, Cell, ListView, MapView, RecordContext, StructView};
use crate::scanner::scan_pages;
use crate::schema::{FileSchema, GroupKind, LeafColumn, ProjectedSchema, SchemaNode};

/// Records per batch.
const BATCH_RECORDS: usize = 8192;

pub(crate) struct ReaderShared {
    pub metadata: FileMetadata,
    pub schema: FileSchema,
    pub mapping: Bytes,
    pub executor: Executor,
    pub decompressors: Arc<DecompressorRegistry>,
    pub file_name: String,
    pub closed: AtomicBool,
}

/// An open file.  All state is owned here; closing it stops every
/// reader created from it at its next fetch.
pub struct FileHandle {
    shared: Arc<ReaderShared>,
}

impl FileHandle {
    /// Open over already-parsed metadata and a mapped byte region.
    pub fn open(
        file_name: impl Into<String>,
        metadata: FileMetadata,
        mapping: Bytes,
        executor: Executor,
        decompressors: Arc<DecompressorRegistry>,
    ) -> Result<Self> {
        let file_name = file_name.into();
        let schema = FileSchema::from_metadata(&metadata, &file_name)?;
        debug!(
            "opened '{file_name}': {} rows, {} row groups, {} columns, flat={}",
            metadata.num_rows,
            metadata.row_groups.len(),
            schema.num_columns(),
            schema.is_flat()
        );
        Ok(Self {
            shared: Arc::new(ReaderShared {
                metadata,
                schema,
                mapping,
                executor,
                decompressors,
                file_name,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Convenience path: memory-map the file, parse the footer, use the
    /// default executor and codecs.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let file = std::fs::File::open(path)?;
        // The mapping is read-only and the file format is append-only;
        // concurrent truncation is the caller's responsibility.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let mapping = Bytes::from_owner(mmap);
        let metadata_bytes = footer::metadata_bytes(&mapping, &file_name)?;
        let metadata = parse_file_metadata(&metadata_bytes, &file_name)?;
        Self::open(
            file_name,
            metadata,
            mapping,
            Executor::default(),
            Arc::new(DecompressorRegistry::default()),
        )
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.shared.metadata
    }

    pub fn schema(&self) -> &FileSchema {
        &self.shared.schema
    }

    pub fn num_rows(&self) -> i64 {
        self.shared.metadata.num_rows
    }

    /// Create a reader over all columns or a projection of top-level
    /// fields.
    pub fn create_row_reader(&self, projection: Option<&[&str]>) -> Result<RowReader> {
        let projected = self.shared.schema.project(projection)?;
        let kind = if self.shared.schema.is_flat() {
            ReaderKind::Flat(FlatState {
                buffers: Vec::new(),
                batches: Vec::new(),
                active: false,
            })
        } else {
            ReaderKind::Nested(NestedState {
                iterators: Vec::new(),
                batches: Vec::new(),
                arena: RecordArena::new(),
                current_root: None,
                active: false,
            })
        };
        Ok(RowReader {
            shared: self.shared.clone(),
            projection: projected,
            kind,
            row_group_index: 0,
            row_index: -1,
            batch_size: 0,
            initialized: false,
            exhausted: false,
            terminal: None,
        })
    }

    /// Stop all readers of this file at their next fetch.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

struct FlatState {
    buffers: Vec<ColumnAssemblyBuffer>,
    batches: Vec<FlatBatch>,
    active: bool,
}

struct NestedState {
    iterators: Vec<ColumnValueIterator>,
    batches: Vec<NestedColumnBatch>,
    arena: RecordArena,
    current_root: Option<u32>,
    active: bool,
}

enum ReaderKind {
    Flat(FlatState),
    Nested(NestedState),
}

/// Iterates rows of one file.  Not restartable: reopen to iterate
/// again.
pub struct RowReader {
    shared: Arc<ReaderShared>,
    projection: ProjectedSchema,
    kind: ReaderKind,
    row_group_index: usize,
    row_index: i64,
    batch_size: usize,
    initialized: bool,
    exhausted: bool,
    terminal: Option<Error>,
}

impl RowReader {
    /// True while rows remain.  Loads the next batch when the current
    /// one is drained.
    pub fn has_next(&mut self) -> Result<bool> {
        if let Some(e) = &self.terminal {
            return Err(e.duplicate());
        }
        if self.shared.closed.load(Ordering::Acquire) || self.exhausted {
            return Ok(false);
        }
        if !self.initialized {
            self.initialized = true;
        }
        if self.row_index + 1 < self.batch_size as i64 {
            return Ok(true);
        }
        match self.load_next_batch() {
            Ok(more) => Ok(more),
            Err(e) => {
                self.terminal = Some(e.duplicate());
                Err(e)
            }
        }
    }

    /// Advance to the next row, materializing it for the accessors.
    pub fn next(&mut self) -> Result<()> {
        if !self.has_next()? {
            return Err(Error::io("next() called past the last row", location!()));
        }
        self.row_index += 1;
        if let ReaderKind::Nested(_) = self.kind {
            match self.assemble_current() {
                Ok(()) => {}
                Err(e) => {
                    self.terminal = Some(e.duplicate());
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn assemble_current(&mut self) -> Result<()> {
        let shared = self.shared.clone();
        let ReaderKind::Nested(state) = &mut self.kind else {
            unreachable!("assemble_current is nested-only");
        };
        let assembler = RecordAssembler::new(&shared.schema);
        let root = assembler
            .assemble_record(&mut state.arena, &mut state.batches)?
            .ok_or_else(|| {
                Error::corrupt(
                    &shared.file_name,
                    "batch drained before its declared record count",
                    location!(),
                )
            })?;
        state.current_root = Some(root);
        Ok(())
    }

    fn load_next_batch(&mut self) -> Result<bool> {
        loop {
            let loaded = match &mut self.kind {
                ReaderKind::Flat(_) => self.load_flat_batch()?,
                ReaderKind::Nested(_) => self.load_nested_batch()?,
            };
            match loaded {
                BatchLoad::Loaded(size) => {
                    self.batch_size = size;
                    self.row_index = -1;
                    return Ok(true);
                }
                BatchLoad::RowGroupDrained => {
                    self.row_group_index += 1;
                    continue;
                }
                BatchLoad::Exhausted => {
                    self.exhausted = true;
                    return Ok(false);
                }
            }
        }
    }

    fn load_flat_batch(&mut self) -> Result<BatchLoad> {
        let shared = self.shared.clone();
        let ReaderKind::Flat(state) = &mut self.kind else {
            unreachable!("load_flat_batch is flat-only");
        };

        if !state.active {
            if self.row_group_index >= shared.metadata.row_groups.len() {
                return Ok(BatchLoad::Exhausted);
            }
            start_flat_row_group(state, &shared, &self.projection, self.row_group_index)?;
        }

        // Hand the drained arrays back before blocking for new batches.
        for (buffer, old) in state.buffers.iter().zip(state.batches.drain(..)) {
            buffer.recycle(old.values);
        }

        let mut new_batches: Vec<FlatBatch> = Vec::with_capacity(state.buffers.len());
        let mut drained = 0usize;
        for buffer in state.buffers.iter_mut() {
            match buffer.next_batch()? {
                Some(batch) => new_batches.push(batch),
                None => drained += 1,
            }
        }
        if drained == state.buffers.len() {
            state.active = false;
            state.buffers.clear();
            return Ok(BatchLoad::RowGroupDrained);
        }
        if drained > 0 || new_batches.is_empty() {
            return Err(Error::corrupt(
                &shared.file_name,
                format!(
                    "columns disagree on batch boundaries: {drained} of {} drained early",
                    state.buffers.len()
                ),
                location!(),
            ));
        }
        let size = new_batches[0].len();
        if new_batches.iter().any(|batch| batch.len() != size) {
            return Err(Error::corrupt(
                &shared.file_name,
                "columns disagree on batch record count",
                location!(),
            ));
        }
        state.batches = new_batches;
        Ok(BatchLoad::Loaded(size))
    }

    fn load_nested_batch(&mut self) -> Result<BatchLoad> {
        let shared = self.shared.clone();
        let ReaderKind::Nested(state) = &mut self.kind else {
            unreachable!("load_nested_batch is nested-only");
        };

        if !state.active {
            if self.row_group_index >= shared.metadata.row_groups.len() {
                return Ok(BatchLoad::Exhausted);
            }
            start_nested_row_group(state, &shared, &self.projection, self.row_group_index)?;
        }

        // One collection task per column, joined in order.
        let handles: Vec<_> = state
            .iterators
            .drain(..)
            .map(|mut iterator| {
                shared.executor.spawn(move || {
                    let batch = iterator.read_batch(BATCH_RECORDS)?;
                    Ok((iterator, batch))
                })
            })
            .collect();
        let mut new_batches: Vec<NestedColumnBatch> = Vec::with_capacity(handles.len());
        let mut drained = 0usize;
        for handle in handles {
            let (iterator, batch) = handle.join()?;
            state.iterators.push(iterator);
            match batch {
                Some(batch) => new_batches.push(batch),
                None => drained += 1,
            }
        }
        if drained == state.iterators.len() {
            state.active = false;
            state.iterators.clear();
            return Ok(BatchLoad::RowGroupDrained);
        }
        if drained > 0 || new_batches.is_empty() {
            return Err(Error::corrupt(
                &shared.file_name,
                format!(
                    "columns disagree on batch boundaries: {drained} of {} drained early",
                    state.iterators.len()
                ),
                location!(),
            ));
        }
        let records = new_batches[0].record_count();
        if new_batches.iter().any(|batch| batch.record_count() != records) {
            return Err(Error::corrupt(
                &shared.file_name,
                "columns disagree on batch record count",
                location!(),
            ));
        }
        state.batches = new_batches;
        state.current_root = None;
        Ok(BatchLoad::Loaded(records))
    }

    // ---- accessors ----

    fn current_row(&self) -> Result<usize> {
        if self.row_index < 0 {
            return Err(Error::io(
                "no current row; call next() before the accessors",
                location!(),
            ));
        }
        Ok(self.row_index as usize)
    }

    fn leaf_checked(&self, name: &str) -> Result<&LeafColumn> {
        let leaf = self.shared.schema.leaf_by_name(name).ok_or_else(|| {
            Error::schema(
                format!("file '{}' has no column '{name}'", self.shared.file_name),
                location!(),
            )
        })?;
        if self.projection.projected_column(leaf.column_index).is_none() {
            return Err(Error::schema(
                format!("column '{name}' is not in the active projection"),
                location!(),
            ));
        }
        Ok(leaf)
    }

    fn top_level_field(&self, name: &str) -> Result<usize> {
        let index = self
            .shared
            .schema
            .top_level_field_index(name)
            .ok_or_else(|| {
                Error::schema(
                    format!("file '{}' has no field '{name}'", self.shared.file_name),
                    location!(),
                )
            })?;
        if self.projection.projected_field(index).is_none() {
            return Err(Error::schema(
                format!("field '{name}' is not in the active projection"),
                location!(),
            ));
        }
        Ok(index)
    }

    /// The current row's value for a top-level field, as a cell.
    pub fn value(&self, name: &str) -> Result<Cell<'_>> {
        match &self.kind {
            ReaderKind::Flat(_) => {
                let leaf = self.leaf_checked(name)?;
                self.flat_cell(leaf)
            }
            ReaderKind::Nested(_) => {
                let field = self.top_level_field(name)?;
                self.nested_cell(field)
            }
        }
    }

    /// The current row's value by projected field index.
    pub fn value_at(&self, projected_index: usize) -> Result<Cell<'_>> {
        match &self.kind {
            ReaderKind::Flat(_) => {
                let column = *self.projection.columns.get(projected_index).ok_or_else(|| {
                    Error::schema(
                        format!("projected column index {projected_index} out of range"),
                        location!(),
                    )
                })?;
                self.flat_cell(self.shared.schema.leaf(column))
            }
            ReaderKind::Nested(_) => {
                let field = *self.projection.fields.get(projected_index).ok_or_else(|| {
                    Error::schema(
                        format!("projected field index {projected_index} out of range"),
                        location!(),
                    )
                })?;
                self.nested_cell(field)
            }
        }
    }

    fn flat_cell(&self, leaf: &LeafColumn) -> Result<Cell<'_>> {
        let ReaderKind::Flat(state) = &self.kind else {
            unreachable!("flat_cell on a nested reader");
        };
        let row = self.current_row()?;
        let projected = self
            .projection
            .projected_column(leaf.column_index)
            .expect("checked by the caller");
        let batch = &state.batches[projected];
        if batch.is_null(row) {
            return Ok(Cell::Null);
        }
        Ok(match batch.values.get(row) {
            Value::Null => Cell::Null,
            Value::Bool(v) => Cell::Bool(v),
            Value::Int32(v) => Cell::Int32(v),
            Value::Int64(v) => Cell::Int64(v),
            Value::Int96(v) => Cell::Int96(v),
            Value::Float(v) => Cell::Float(v),
            Value::Double(v) => Cell::Double(v),
            Value::Bytes(v) => Cell::Bytes(v),
        })
    }

    fn nested_cell(&self, field_index: usize) -> Result<Cell<'_>> {
        let ReaderKind::Nested(state) = &self.kind else {
            return Err(Error::schema(
                "nested accessors need a nested schema",
                location!(),
            ));
        };
        self.current_row()?;
        let root = state.current_root.ok_or_else(|| {
            Error::io("no current row; call next() before the accessors", location!())
        })?;
        let ctx = RecordContext {
            arena: &state.arena,
            batches: &state.batches,
        };
        ctx.root_view(root, &self.shared.schema.root).field_at(field_index)
    }

    pub fn is_null(&self, name: &str) -> Result<bool> {
        Ok(self.value(name)?.is_null())
    }

    pub fn is_null_at(&self, projected_index: usize) -> Result<bool> {
        Ok(self.value_at(projected_index)?.is_null())
    }

    pub fn get_bool_at(&self, projected_index: usize) -> Result<bool> {
        self.value_at(projected_index)?.as_bool()
    }

    pub fn get_i32_at(&self, projected_index: usize) -> Result<i32> {
        self.value_at(projected_index)?.as_i32()
    }

    pub fn get_i64_at(&self, projected_index: usize) -> Result<i64> {
        self.value_at(projected_index)?.as_i64()
    }

    pub fn get_f32_at(&self, projected_index: usize) -> Result<f32> {
        self.value_at(projected_index)?.as_f32()
    }

    pub fn get_f64_at(&self, projected_index: usize) -> Result<f64> {
        self.value_at(projected_index)?.as_f64()
    }

    pub fn get_string_at(&self, projected_index: usize) -> Result<Option<String>> {
        self.value_at(projected_index)?.as_str()
    }

    pub fn get_binary_at(&self, projected_index: usize) -> Result<Option<Bytes>> {
        self.value_at(projected_index)?.as_bytes()
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.value(name)?.as_bool()
    }

    pub fn get_i32(&self, name: &str) -> Result<i32> {
        self.value(name)?.as_i32()
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        self.value(name)?.as_i64()
    }

    pub fn get_f32(&self, name: &str) -> Result<f32> {
        self.value(name)?.as_f32()
    }

    pub fn get_f64(&self, name: &str) -> Result<f64> {
        self.value(name)?.as_f64()
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.value(name)?.as_str()
    }

    pub fn get_binary(&self, name: &str) -> Result<Option<Bytes>> {
        self.value(name)?.as_bytes()
    }

    /// Struct accessor.  A null struct yields a view whose fields all
    /// read as null.
    pub fn get_struct(&self, name: &str) -> Result<StructView<'_>> {
        let field = self.top_level_field(name)?;
        let node = &self.shared.schema.root.children[field];
        let SchemaNode::Group(group) = node else {
            return Err(Error::type_mismatch(
                format!("field '{name}' is not a struct"),
                location!(),
            ));
        };
        if group.kind != GroupKind::Struct {
            return Err(Error::type_mismatch(
                format!("field '{name}' is not a struct"),
                location!(),
            ));
        }
        match self.nested_cell(field)? {
            Cell::Struct(view) => Ok(view),
            Cell::Null => {
                let ReaderKind::Nested(state) = &self.kind else {
                    unreachable!("nested_cell succeeded on a flat reader");
                };
                Ok(null_struct(
                    RecordContext {
                        arena: &state.arena,
                        batches: &state.batches,
                    },
                    group,
                ))
            }
            other => Err(Error::type_mismatch(
                format!("field '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    /// List accessor; a null list yields an `is_null` view.
    pub fn get_list(&self, name: &str) -> Result<ListView<'_>> {
        let field = self.top_level_field(name)?;
        let node = &self.shared.schema.root.children[field];
        let element = list_element_of(node).ok_or_else(|| {
            Error::type_mismatch(format!("field '{name}' is not a list"), location!())
        })?;
        match self.nested_cell(field)? {
            Cell::List(view) => Ok(view),
            Cell::Null => {
                let ReaderKind::Nested(state) = &self.kind else {
                    unreachable!("nested_cell succeeded on a flat reader");
                };
                Ok(null_list(
                    RecordContext {
                        arena: &state.arena,
                        batches: &state.batches,
                    },
                    element,
                ))
            }
            other => Err(Error::type_mismatch(
                format!("field '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    /// Map accessor; a null map yields an `is_null` view.
    pub fn get_map(&self, name: &str) -> Result<MapView<'_>> {
        let field = self.top_level_field(name)?;
        let node = &self.shared.schema.root.children[field];
        let SchemaNode::Group(group) = node else {
            return Err(Error::type_mismatch(
                format!("field '{name}' is not a map"),
                location!(),
            ));
        };
        if group.kind != GroupKind::Map {
            return Err(Error::type_mismatch(
                format!("field '{name}' is not a map"),
                location!(),
            ));
        }
        match self.nested_cell(field)? {
            Cell::Map(view) => Ok(view),
            Cell::Null => {
                let ReaderKind::Nested(state) = &self.kind else {
                    unreachable!("nested_cell succeeded on a flat reader");
                };
                Ok(null_map(
                    RecordContext {
                        arena: &state.arena,
                        batches: &state.batches,
                    },
                    group,
                ))
            }
            other => Err(Error::type_mismatch(
                format!("field '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    // ---- logical-type accessors ----

    pub fn get_date(&self, name: &str) -> Result<Option<NaiveDate>> {
        let leaf = self.leaf_checked(name)?;
        if !matches!(leaf.logical, Some(LogicalType::Date)) {
            return Err(Error::type_mismatch(
                format!("column '{name}' is not a DATE column"),
                location!(),
            ));
        }
        match self.value(name)? {
            Cell::Null => Ok(None),
            Cell::Int32(days) => Ok(Some(date_from_days(days)?)),
            other => Err(Error::type_mismatch(
                format!("DATE column '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    pub fn get_time(&self, name: &str) -> Result<Option<NaiveTime>> {
        let leaf = self.leaf_checked(name)?;
        let Some(LogicalType::Time { unit, .. }) = leaf.logical else {
            return Err(Error::type_mismatch(
                format!("column '{name}' is not a TIME column"),
                location!(),
            ));
        };
        match self.value(name)? {
            Cell::Null => Ok(None),
            Cell::Int32(v) => Ok(Some(time_from_value(v as i64, unit)?)),
            Cell::Int64(v) => Ok(Some(time_from_value(v, unit)?)),
            other => Err(Error::type_mismatch(
                format!("TIME column '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    pub fn get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let leaf = self.leaf_checked(name)?;
        if leaf.physical_type == PhysicalType::Int96 {
            return Err(Error::unsupported(
                format!("column '{name}' is an INT96 timestamp; read it as raw bytes instead"),
                location!(),
            ));
        }
        let Some(LogicalType::Timestamp { unit, .. }) = leaf.logical else {
            return Err(Error::type_mismatch(
                format!("column '{name}' is not a TIMESTAMP column"),
                location!(),
            ));
        };
        match self.value(name)? {
            Cell::Null => Ok(None),
            Cell::Int64(v) => Ok(Some(timestamp_from_value(v, unit)?)),
            other => Err(Error::type_mismatch(
                format!(
                    "TIMESTAMP column '{name}' materialized as {}",
                    other.kind_name()
                ),
                location!(),
            )),
        }
    }

    pub fn get_decimal(&self, name: &str) -> Result<Option<Decimal>> {
        let leaf = self.leaf_checked(name)?;
        let Some(LogicalType::Decimal { scale, .. }) = leaf.logical else {
            return Err(Error::type_mismatch(
                format!("column '{name}' is not a DECIMAL column"),
                location!(),
            ));
        };
        match self.value(name)? {
            Cell::Null => Ok(None),
            Cell::Int32(v) => Ok(Some(Decimal::from_i64(v as i64, scale))),
            Cell::Int64(v) => Ok(Some(Decimal::from_i64(v, scale))),
            Cell::Bytes(v) => Ok(Some(Decimal::from_be_bytes(&v, scale)?)),
            other => Err(Error::type_mismatch(
                format!(
                    "DECIMAL column '{name}' materialized as {}",
                    other.kind_name()
                ),
                location!(),
            )),
        }
    }

    pub fn get_uuid(&self, name: &str) -> Result<Option<String>> {
        let leaf = self.leaf_checked(name)?;
        if !matches!(leaf.logical, Some(LogicalType::Uuid)) {
            return Err(Error::type_mismatch(
                format!("column '{name}' is not a UUID column"),
                location!(),
            ));
        }
        match self.value(name)? {
            Cell::Null => Ok(None),
            Cell::Bytes(v) => Ok(Some(uuid_string(&v)?)),
            other => Err(Error::type_mismatch(
                format!("UUID column '{name}' materialized as {}", other.kind_name()),
                location!(),
            )),
        }
    }

    pub fn num_projected_fields(&self) -> usize {
        match &self.kind {
            ReaderKind::Flat(_) => self.projection.columns.len(),
            ReaderKind::Nested(_) => self.projection.fields.len(),
        }
    }
}

enum BatchLoad {
    Loaded(usize),
    RowGroupDrained,
    Exhausted,
}

fn list_element_of(node: &SchemaNode) -> Option<&SchemaNode> {
    match node {
        SchemaNode::Primitive(p) if p.repetition == crate::meta::Repetition::Repeated => Some(node),
        SchemaNode::Group(g) if g.repetition == crate::meta::Repetition::Repeated => Some(node),
        SchemaNode::Group(g) if g.kind == GroupKind::List => Some(g.list_element()),
        _ => None,
    }
}

fn start_flat_row_group(
    state: &mut FlatState,
    shared: &Arc<ReaderShared>,
    projection: &ProjectedSchema,
    row_group_index: usize,
) -> Result<()> {
    let row_group = &shared.metadata.row_groups[row_group_index];
    if row_group.columns.len() != shared.schema.num_columns() {
        return Err(Error::corrupt(
            &shared.file_name,
            format!(
                "row group {row_group_index} holds {} column chunks for {} schema columns",
                row_group.columns.len(),
                shared.schema.num_columns()
            ),
            location!(),
        ));
    }
    debug!(
        "starting flat row group {row_group_index} of '{}' ({} rows)",
        shared.file_name, row_group.num_rows
    );
    state.buffers.clear();
    for &column_index in &projection.columns {
        let chunk = &row_group.columns[column_index];
        let descriptor = Arc::new(
            shared
                .schema
                .descriptor(column_index, &shared.file_name, chunk.codec),
        );
        let pages = scan_pages(chunk, &descriptor, &shared.mapping, &shared.decompressors)?;
        let cursor = PageCursor::new(
            pages,
            descriptor.clone(),
            shared.executor.clone(),
            shared.decompressors.clone(),
        );
        state.buffers.push(ColumnAssemblyBuffer::start(
            cursor,
            descriptor,
            BATCH_RECORDS,
            &shared.executor,
        ));
    }
    state.active = true;
    Ok(())
}

fn start_nested_row_group(
    state: &mut NestedState,
    shared: &Arc<ReaderShared>,
    projection: &ProjectedSchema,
    row_group_index: usize,
) -> Result<()> {
    let row_group = &shared.metadata.row_groups[row_group_index];
    if row_group.columns.len() != shared.schema.num_columns() {
        return Err(Error::corrupt(
            &shared.file_name,
            format!(
                "row group {row_group_index} holds {} column chunks for {} schema columns",
                row_group.columns.len(),
                shared.schema.num_columns()
            ),
            location!(),
        ));
    }
    debug!(
        "starting nested row group {row_group_index} of '{}' ({} rows)",
        shared.file_name, row_group.num_rows
    );
    state.iterators.clear();
    for &column_index in &projection.columns {
        let chunk = &row_group.columns[column_index];
        let leaf = shared.schema.leaf(column_index);
        let descriptor = Arc::new(
            shared
                .schema
                .descriptor(column_index, &shared.file_name, chunk.codec),
        );
        let pages = scan_pages(chunk, &descriptor, &shared.mapping, &shared.decompressors)?;
        let cursor = PageCursor::new(
            pages,
            descriptor,
            shared.executor.clone(),
            shared.decompressors.clone(),
        );
        state.iterators.push(ColumnValueIterator::new(
            cursor,
            column_index,
            leaf.physical_type,
            leaf.max_def,
            leaf.max_rep,
        ));
    }
    state.active = true;
    Ok(())
}
