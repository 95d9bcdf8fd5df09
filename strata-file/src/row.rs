// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Typed views over assembled records.
//!
//! A [`Cell`] is one materialized value: a scalar, or a view over a
//! struct, list or map node in the record arena.  Views resolve leaf
//! slots lazily against the batch value arrays; nothing is copied until
//! an accessor asks for it.

use bytes::Bytes;
use snafu::location;
use strata_core::{Error, Result};
use strata_encoding::Value;

use crate::assemble::{RecordArena, Slot};
use crate::batch::NestedColumnBatch;
use crate::schema::{GroupNode, SchemaNode};

/// Shared lookup context for one assembled row.
#[derive(Clone, Copy)]
pub struct RecordContext<'a> {
    pub arena: &'a RecordArena,
    pub batches: &'a [NestedColumnBatch],
}

impl<'a> RecordContext<'a> {
    fn resolve(&self, node: &'a SchemaNode, slot: Slot) -> Result<Cell<'a>> {
        match slot {
            Slot::Absent => Ok(Cell::Null),
            Slot::Value { column, index } => {
                let value = self.batches[column as usize].value_at(index as usize);
                Ok(match value {
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
            Slot::Node(id) => match node {
                SchemaNode::Primitive(p) => {
                    // A bare repeated primitive materializes as a list
                    // of its values.
                    debug_assert!(p.repetition == crate::meta::Repetition::Repeated);
                    Ok(Cell::List(ListView {
                        ctx: *self,
                        node: Some(id),
                        element: node,
                    }))
                }
                SchemaNode::Group(g) => Ok(self.group_cell(g, node, id)),
            },
        }
    }

    fn group_cell(&self, g: &'a GroupNode, node: &'a SchemaNode, id: u32) -> Cell<'a> {
        use crate::meta::Repetition;
        use crate::schema::GroupKind;
        if g.repetition == Repetition::Repeated {
            // Bare repeated group: a list of structs described by the
            // group itself.
            return Cell::List(ListView {
                ctx: *self,
                node: Some(id),
                element: node,
            });
        }
        match g.kind {
            GroupKind::Struct => Cell::Struct(StructView {
                ctx: *self,
                node: Some(id),
                group: g,
            }),
            GroupKind::List => Cell::List(ListView {
                ctx: *self,
                node: Some(id),
                element: g.list_element(),
            }),
            GroupKind::Map => Cell::Map(MapView {
                ctx: *self,
                node: Some(id),
                group: g,
            }),
        }
    }

    /// The root view of an assembled record.
    pub fn root_view(&self, root: u32, group: &'a GroupNode) -> StructView<'a> {
        StructView {
            ctx: *self,
            node: Some(root),
            group,
        }
    }
}

/// One materialized value.
#[derive(Clone)]
pub enum Cell<'a> {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Int96([u8; 12]),
    Float(f32),
    Double(f64),
    Bytes(Bytes),
    Struct(StructView<'a>),
    List(ListView<'a>),
    Map(MapView<'a>),
}

impl<'a> Cell<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Cell::Bool(v) => Ok(*v),
            Cell::Null => Err(null_access("bool")),
            other => Err(wrong_type("bool", other)),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Cell::Int32(v) => Ok(*v),
            Cell::Null => Err(null_access("i32")),
            other => Err(wrong_type("i32", other)),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Cell::Int64(v) => Ok(*v),
            Cell::Null => Err(null_access("i64")),
            other => Err(wrong_type("i64", other)),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Cell::Float(v) => Ok(*v),
            Cell::Null => Err(null_access("f32")),
            other => Err(wrong_type("f32", other)),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Cell::Double(v) => Ok(*v),
            Cell::Null => Err(null_access("f64")),
            other => Err(wrong_type("f64", other)),
        }
    }

    pub fn as_bytes(&self) -> Result<Option<Bytes>> {
        match self {
            Cell::Bytes(v) => Ok(Some(v.clone())),
            Cell::Null => Ok(None),
            other => Err(wrong_type("bytes", other)),
        }
    }

    pub fn as_str(&self) -> Result<Option<String>> {
        match self {
            Cell::Bytes(v) => {
                let s = std::str::from_utf8(v).map_err(|_| {
                    Error::type_mismatch("byte-array value is not valid UTF-8", location!())
                })?;
                Ok(Some(s.to_string()))
            }
            Cell::Null => Ok(None),
            other => Err(wrong_type("string", other)),
        }
    }

    pub fn as_struct(&self) -> Result<StructView<'a>> {
        match self {
            Cell::Struct(v) => Ok(v.clone()),
            other => Err(wrong_type("struct", other)),
        }
    }

    pub fn as_list(&self) -> Result<ListView<'a>> {
        match self {
            Cell::List(v) => Ok(v.clone()),
            other => Err(wrong_type("list", other)),
        }
    }

    pub fn as_map(&self) -> Result<MapView<'a>> {
        match self {
            Cell::Map(v) => Ok(v.clone()),
            other => Err(wrong_type("map", other)),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int32(_) => "i32",
            Cell::Int64(_) => "i64",
            Cell::Int96(_) => "i96",
            Cell::Float(_) => "f32",
            Cell::Double(_) => "f64",
            Cell::Bytes(_) => "bytes",
            Cell::Struct(_) => "struct",
            Cell::List(_) => "list",
            Cell::Map(_) => "map",
        }
    }
}

fn null_access(expected: &str) -> Error {
    Error::null_access(
        format!("{expected} accessor on a null value; check is_null first"),
        location!(),
    )
}

fn wrong_type(expected: &str, actual: &Cell<'_>) -> Error {
    Error::type_mismatch(
        format!("expected {expected}, found {}", actual.kind_name()),
        location!(),
    )
}

/// A struct value.  A null struct is a view with no node: every field
/// reads as null rather than panicking.
#[derive(Clone)]
pub struct StructView<'a> {
    ctx: RecordContext<'a>,
    node: Option<u32>,
    group: &'a GroupNode,
}

impl<'a> StructView<'a> {
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    pub fn num_fields(&self) -> usize {
        self.group.children.len()
    }

    pub fn field_name(&self, index: usize) -> &str {
        self.group.children[index].name()
    }

    pub fn field(&self, name: &str) -> Result<Cell<'a>> {
        let index = self
            .group
            .children
            .iter()
            .position(|child| child.name() == name)
            .ok_or_else(|| {
                Error::schema(
                    format!("struct '{}' has no field named '{name}'", self.group.name),
                    location!(),
                )
            })?;
        self.field_at(index)
    }

    pub fn field_at(&self, index: usize) -> Result<Cell<'a>> {
        let child = &self.group.children[index];
        match self.node {
            None => Ok(Cell::Null),
            Some(id) => {
                let slot = self.ctx.arena.node(id).slots[index];
                self.ctx.resolve(child, slot)
            }
        }
    }
}

/// A list value.  Distinct from null: an empty list has a node with no
/// elements.
#[derive(Clone)]
pub struct ListView<'a> {
    ctx: RecordContext<'a>,
    node: Option<u32>,
    element: &'a SchemaNode,
}

impl<'a> ListView<'a> {
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    pub fn len(&self) -> usize {
        match self.node {
            None => 0,
            Some(id) => self.ctx.arena.node(id).slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Cell<'a>> {
        let id = self.node.ok_or_else(|| {
            Error::null_access("element accessor on a null list", location!())
        })?;
        let slots = &self.ctx.arena.node(id).slots;
        let slot = slots.get(index).copied().ok_or_else(|| {
            Error::schema(
                format!("list index {index} out of range for {} elements", slots.len()),
                location!(),
            )
        })?;
        self.ctx.resolve(self.element, slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Cell<'a>>> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }
}

/// A map value: ordered key/value pairs.
#[derive(Clone)]
pub struct MapView<'a> {
    ctx: RecordContext<'a>,
    node: Option<u32>,
    group: &'a GroupNode,
}

impl<'a> MapView<'a> {
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    pub fn len(&self) -> usize {
        match self.node {
            None => 0,
            Some(id) => self.ctx.arena.node(id).slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th entry as `(key, value)` cells.
    pub fn entry(&self, index: usize) -> Result<(Cell<'a>, Cell<'a>)> {
        let id = self.node.ok_or_else(|| {
            Error::null_access("entry accessor on a null map", location!())
        })?;
        let slots = &self.ctx.arena.node(id).slots;
        let slot = slots.get(index).copied().ok_or_else(|| {
            Error::schema(
                format!("map index {index} out of range for {} entries", slots.len()),
                location!(),
            )
        })?;
        let (key_node, value_node) = self.group.map_key_value();
        match slot {
            Slot::Node(entry) => {
                let entry_slots = &self.ctx.arena.node(entry).slots;
                let key = self.ctx.resolve(key_node, entry_slots[0])?;
                let value = self.ctx.resolve(value_node, entry_slots[1])?;
                Ok((key, value))
            }
            Slot::Absent => Ok((Cell::Null, Cell::Null)),
            Slot::Value { .. } => Err(Error::corrupt(
                "<record>",
                "map entry slot holds a bare value",
                location!(),
            )),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<(Cell<'a>, Cell<'a>)>> + '_ {
        (0..self.len()).map(|i| self.entry(i))
    }
}

/// A null struct view for absent top-level structs.
pub fn null_struct<'a>(ctx: RecordContext<'a>, group: &'a GroupNode) -> StructView<'a> {
    StructView {
        ctx,
        node: None,
        group,
    }
}

/// A null list view.
pub fn null_list<'a>(ctx: RecordContext<'a>, element: &'a SchemaNode) -> ListView<'a> {
    ListView {
        ctx,
        node: None,
        element,
    }
}

/// A null map view.
pub fn null_map<'a>(ctx: RecordContext<'a>, group: &'a GroupNode) -> MapView<'a> {
    MapView {
        ctx,
        node: None,
        group,
    }
}
