// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Record assembly: turning per-column level streams back into nested
//! records.
//!
//! Each column is processed independently.  The repetition levels alone
//! determine the coordinates (indices) a value lands at; sibling
//! columns are striped with parallel structure by construction, so
//! independent insertion lines up.
//!
//! For each value `(r, d, v)` of a column:
//!
//! 1. reset `idx[k] = 0` for all `k > r`; if `r > 0`, `idx[r] += 1`
//!    (`r == 0` starts a new record);
//! 2. walk the leaf's path, consuming one `idx` slot per repeated step;
//!    a step whose definition threshold exceeds `d` is a structural
//!    null at that depth: stop, leaving the slot unset;
//! 3. at the leaf, write `v` only when `d` equals the leaf's maximum.
//!
//! Records are built into a per-batch arena of index-addressed nodes;
//! leaves store `(column, value index)` pairs into the batch's value
//! arrays rather than copied values.

use snafu::location;
use strata_core::{Error, Result};

use crate::batch::NestedColumnBatch;
use crate::schema::{ContainerKind, FileSchema, LeafColumn, Selector, StepAction};

/// Node kinds of the materialized record tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Struct,
    List,
    Map,
}

/// One slot of a node: unset (null), a child node, or a leaf value
/// addressed as `(projected column, value index)` into the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Absent,
    Node(u32),
    Value { column: u32, index: u32 },
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub slots: Vec<Slot>,
}

/// Arena holding one record's nodes.  Cleared and reused across rows;
/// the backing allocations survive.
#[derive(Debug, Default)]
pub struct RecordArena {
    nodes: Vec<Node>,
}

impl RecordArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn alloc(&mut self, kind: NodeKind, slot_count: usize) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            kind,
            slots: vec![Slot::Absent; slot_count],
        });
        id
    }

    pub fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    fn ensure_slot(&mut self, node: u32, slot: usize) {
        let slots = &mut self.nodes[node as usize].slots;
        if slots.len() <= slot {
            slots.resize(slot + 1, Slot::Absent);
        }
    }

    fn get_or_create_child(&mut self, node: u32, slot: usize, kind: ContainerKind) -> u32 {
        if let Slot::Node(child) = self.nodes[node as usize].slots[slot] {
            return child;
        }
        let (node_kind, slot_count) = match kind {
            ContainerKind::Struct(fields) => (NodeKind::Struct, fields),
            ContainerKind::List => (NodeKind::List, 0),
            ContainerKind::Map => (NodeKind::Map, 0),
        };
        let child = self.alloc(node_kind, slot_count);
        self.nodes[node as usize].slots[slot] = Slot::Node(child);
        child
    }

    fn set_value(&mut self, node: u32, slot: usize, column: u32, index: u32) {
        self.nodes[node as usize].slots[slot] = Slot::Value { column, index };
    }
}

/// Assembles one record at a time from all projected column batches.
pub struct RecordAssembler<'a> {
    schema: &'a FileSchema,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(schema: &'a FileSchema) -> Self {
        Self { schema }
    }

    /// Advance every batch to its next record and materialize the row.
    /// Returns `None` when all batches are exhausted.
    pub fn assemble_record(
        &self,
        arena: &mut RecordArena,
        batches: &mut [NestedColumnBatch],
    ) -> Result<Option<u32>> {
        arena.clear();
        let root = arena.alloc(NodeKind::Struct, self.schema.root.children.len());

        let mut advanced = 0usize;
        for batch in batches.iter_mut() {
            if batch.next_record() {
                advanced += 1;
            }
        }
        if advanced == 0 {
            return Ok(None);
        }
        if advanced != batches.len() {
            return Err(Error::corrupt(
                "<batch>",
                format!(
                    "sibling columns disagree on record count: {advanced} of {} have another record",
                    batches.len()
                ),
                location!(),
            ));
        }

        for (projected, batch) in batches.iter_mut().enumerate() {
            let leaf = self.schema.leaf(batch.column_index());
            insert_column(arena, root, batch, leaf, projected as u32)?;
        }
        Ok(Some(root))
    }
}

fn insert_column(
    arena: &mut RecordArena,
    root: u32,
    batch: &mut NestedColumnBatch,
    leaf: &LeafColumn,
    projected_column: u32,
) -> Result<()> {
    let mut idx = [0u32; 16];
    let depth_limit = leaf.max_rep as usize;
    if depth_limit >= idx.len() {
        return Err(Error::unsupported(
            format!("repetition depth {depth_limit} exceeds the supported maximum of 15"),
            location!(),
        ));
    }

    while batch.has_value() {
        let r = batch.rep();
        let d = batch.def();
        if r > leaf.max_rep || d > leaf.max_def {
            return Err(Error::corrupt(
                "<batch>",
                format!(
                    "levels (rep {r}, def {d}) of column '{}' exceed declared maxima ({}, {})",
                    leaf.dotted_name, leaf.max_rep, leaf.max_def
                ),
                location!(),
            ));
        }
        let value_index = batch.value_index() as u32;
        batch.advance();

        for slot in idx.iter_mut().skip(r as usize + 1) {
            *slot = 0;
        }
        if r > 0 {
            idx[r as usize] += 1;
        }

        insert_value(arena, root, leaf, &idx, d, projected_column, value_index);
    }
    Ok(())
}

fn insert_value(
    arena: &mut RecordArena,
    root: u32,
    leaf: &LeafColumn,
    idx: &[u32; 16],
    d: u16,
    column: u32,
    value_index: u32,
) {
    let mut node = root;
    let mut depth = 0usize;

    for step in &leaf.path.steps {
        let slot = match step.selector {
            Selector::Field(field) => field,
            Selector::Index { def } => {
                depth += 1;
                if d < def {
                    // The entry does not exist: an empty list, or a null
                    // further up already handled by an earlier step.
                    return;
                }
                let slot = idx[depth] as usize;
                arena.ensure_slot(node, slot);
                slot
            }
        };
        match step.action {
            StepAction::Container { kind, def } => {
                if d < def {
                    // Structural null at this depth; the slot stays
                    // unset but was materialized above where needed.
                    return;
                }
                node = arena.get_or_create_child(node, slot, kind);
            }
            StepAction::Leaf { def } => {
                if d == def {
                    arena.set_value(node, slot, column, value_index);
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use strata_encoding::ValueVector;

    use crate::meta::{parse_file_metadata, Repetition};
    use crate::testing::MetadataBuilder;

    fn schema_of(builder: MetadataBuilder) -> FileSchema {
        let bytes = builder.build();
        let metadata = parse_file_metadata(&bytes, "assemble.parquet").unwrap();
        FileSchema::from_metadata(&metadata, "assemble.parquet").unwrap()
    }

    fn string_batch(
        values: &[&str],
        def: Vec<u16>,
        rep: Vec<u16>,
        records: usize,
        column_index: usize,
    ) -> NestedColumnBatch {
        let values = ValueVector::Bytes(
            values
                .iter()
                .map(|s| bytes::Bytes::copy_from_slice(s.as_bytes()))
                .collect(),
        );
        NestedColumnBatch::new(values, def, rep, records, column_index)
    }

    fn int_batch(
        values: &[i32],
        def: Vec<u16>,
        rep: Vec<u16>,
        records: usize,
        column_index: usize,
    ) -> NestedColumnBatch {
        NestedColumnBatch::new(ValueVector::Int32(values.to_vec()), def, rep, records, column_index)
    }

    fn child(arena: &RecordArena, node: u32, slot: usize) -> Slot {
        arena.node(node).slots[slot]
    }

    fn child_node(arena: &RecordArena, node: u32, slot: usize) -> u32 {
        match child(arena, node, slot) {
            Slot::Node(id) => id,
            other => panic!("expected a node at slot {slot}, got {other:?}"),
        }
    }

    #[test]
    fn test_null_struct_vs_present_struct() {
        // address: optional struct { street optional, zip required }
        let schema = schema_of(
            MetadataBuilder::new(2)
                .element("root", None, None, 1, None)
                .element("address", Some(Repetition::Optional), None, 2, None)
                .element("street", Some(Repetition::Optional), Some(6), 0, Some(0))
                .element("zip", Some(Repetition::Required), Some(1), 0, None),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();

        // Row 1: address present; row 2: address null.
        let mut batches = vec![
            string_batch(&["123 Main St", ""], vec![2, 0], vec![], 2, 0),
            int_batch(&[10001, 0], vec![1, 0], vec![], 2, 1),
        ];

        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        let address = child_node(&arena, root, 0);
        assert_eq!(arena.node(address).kind, NodeKind::Struct);
        assert_eq!(child(&arena, address, 0), Slot::Value { column: 0, index: 0 });
        assert_eq!(child(&arena, address, 1), Slot::Value { column: 1, index: 0 });

        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        // Every child stayed below the struct's level: the slot is null,
        // not an empty struct.
        assert_eq!(child(&arena, root, 0), Slot::Absent);

        assert!(assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_address_book_dremel_rows() {
        let schema = schema_of(
            MetadataBuilder::new(2)
                .element("root", None, None, 3, None)
                .element("owner", Some(Repetition::Required), Some(6), 0, Some(0))
                .element(
                    "ownerPhoneNumbers",
                    Some(Repetition::Repeated),
                    Some(6),
                    0,
                    Some(0),
                )
                .element("contacts", Some(Repetition::Repeated), None, 2, None)
                .element("name", Some(Repetition::Required), Some(6), 0, Some(0))
                .element(
                    "phoneNumber",
                    Some(Repetition::Optional),
                    Some(6),
                    0,
                    Some(0),
                ),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();

        let mut batches = vec![
            string_batch(&["Julien Le Dem", "A. Nonymous"], vec![], vec![], 2, 0),
            string_batch(
                &["555 123 4567", "555 666 1337", ""],
                vec![1, 1, 0],
                vec![0, 1, 0],
                2,
                1,
            ),
            string_batch(
                &["Dmitriy Ryaboy", "Chris Aniszczyk", ""],
                vec![1, 1, 0],
                vec![0, 1, 0],
                2,
                2,
            ),
            string_batch(&["555 987 6543", "", ""], vec![2, 1, 0], vec![0, 1, 0], 2, 3),
        ];

        // Row 1.
        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        assert_eq!(child(&arena, root, 0), Slot::Value { column: 0, index: 0 });
        let phones = child_node(&arena, root, 1);
        assert_eq!(arena.node(phones).kind, NodeKind::List);
        assert_eq!(
            arena.node(phones).slots,
            vec![
                Slot::Value { column: 1, index: 0 },
                Slot::Value { column: 1, index: 1 }
            ]
        );
        let contacts = child_node(&arena, root, 2);
        assert_eq!(arena.node(contacts).slots.len(), 2);
        let first = child_node(&arena, contacts, 0);
        assert_eq!(child(&arena, first, 0), Slot::Value { column: 2, index: 0 });
        assert_eq!(child(&arena, first, 1), Slot::Value { column: 3, index: 0 });
        let second = child_node(&arena, contacts, 1);
        assert_eq!(child(&arena, second, 0), Slot::Value { column: 2, index: 1 });
        // Chris Aniszczyk has no phone number.
        assert_eq!(child(&arena, second, 1), Slot::Absent);

        // Row 2: empty lists, not null lists.
        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        assert_eq!(child(&arena, root, 0), Slot::Value { column: 0, index: 1 });
        let phones = child_node(&arena, root, 1);
        assert_eq!(arena.node(phones).slots.len(), 0);
        let contacts = child_node(&arena, root, 2);
        assert_eq!(arena.node(contacts).slots.len(), 0);
    }

    #[test]
    fn test_list_of_list_empty_and_null() {
        // matrix: list<list<i32>>, standard three-level shape.
        let schema = schema_of(
            MetadataBuilder::new(3)
                .element("root", None, None, 1, None)
                .element("matrix", Some(Repetition::Optional), None, 1, Some(3))
                .element("list", Some(Repetition::Repeated), None, 1, None)
                .element("element", Some(Repetition::Optional), None, 1, Some(3))
                .element("list", Some(Repetition::Repeated), None, 1, None)
                .element("element", Some(Repetition::Optional), Some(1), 0, None),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();

        // Row 1: [[1,2],[3,4,5],[6]]
        // Row 2: [[],[100],[]]
        // Row 3: null
        let mut batches = vec![int_batch(
            &[1, 2, 3, 4, 5, 6, 0, 100, 0, 0],
            vec![5, 5, 5, 5, 5, 5, 3, 5, 3, 0],
            vec![0, 2, 1, 2, 2, 1, 0, 1, 1, 0],
            3,
            0,
        )];

        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        let matrix = child_node(&arena, root, 0);
        assert_eq!(arena.node(matrix).slots.len(), 3);
        let row0: Vec<usize> = (0..3)
            .map(|i| arena.node(child_node(&arena, matrix, i)).slots.len())
            .collect();
        assert_eq!(row0, vec![2, 3, 1]);
        let inner = child_node(&arena, matrix, 1);
        assert_eq!(child(&arena, inner, 2), Slot::Value { column: 0, index: 4 });

        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        let matrix = child_node(&arena, root, 0);
        assert_eq!(arena.node(matrix).slots.len(), 3);
        // Empty inner lists are empty nodes, not null slots.
        let first = child_node(&arena, matrix, 0);
        assert_eq!(arena.node(first).slots.len(), 0);
        let middle = child_node(&arena, matrix, 1);
        assert_eq!(
            arena.node(middle).slots,
            vec![Slot::Value { column: 0, index: 7 }]
        );
        let last = child_node(&arena, matrix, 2);
        assert_eq!(arena.node(last).slots.len(), 0);

        // Row 3: the matrix itself is null.
        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        assert_eq!(child(&arena, root, 0), Slot::Absent);
    }

    #[test]
    fn test_map_entries() {
        let schema = schema_of(
            MetadataBuilder::new(1)
                .element("root", None, None, 1, None)
                .element("attrs", Some(Repetition::Optional), None, 1, Some(1))
                .element("key_value", Some(Repetition::Repeated), None, 2, None)
                .element("key", Some(Repetition::Required), Some(6), 0, Some(0))
                .element("value", Some(Repetition::Optional), Some(1), 0, None),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();

        // {"a": 1, "b": null}
        let mut batches = vec![
            string_batch(&["a", "b"], vec![2, 2], vec![0, 1], 1, 0),
            int_batch(&[1, 0], vec![3, 2], vec![0, 1], 1, 1),
        ];
        let root = assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .unwrap();
        let map = child_node(&arena, root, 0);
        assert_eq!(arena.node(map).kind, NodeKind::Map);
        assert_eq!(arena.node(map).slots.len(), 2);
        let entry0 = child_node(&arena, map, 0);
        assert_eq!(child(&arena, entry0, 0), Slot::Value { column: 0, index: 0 });
        assert_eq!(child(&arena, entry0, 1), Slot::Value { column: 1, index: 0 });
        let entry1 = child_node(&arena, map, 1);
        assert_eq!(child(&arena, entry1, 0), Slot::Value { column: 0, index: 1 });
        assert_eq!(child(&arena, entry1, 1), Slot::Absent);
    }

    #[test]
    fn test_record_count_disagreement_is_corrupt() {
        let schema = schema_of(
            MetadataBuilder::new(2)
                .element("root", None, None, 2, None)
                .element("a", Some(Repetition::Required), Some(1), 0, None)
                .element("b", Some(Repetition::Required), Some(1), 0, None),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();
        let mut batches = vec![
            int_batch(&[1, 2], vec![], vec![], 2, 0),
            int_batch(&[3], vec![], vec![], 1, 1),
        ];
        assert!(assembler
            .assemble_record(&mut arena, &mut batches)
            .unwrap()
            .is_some());
        assert!(matches!(
            assembler.assemble_record(&mut arena, &mut batches),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_levels_above_maxima_are_corrupt() {
        let schema = schema_of(
            MetadataBuilder::new(1)
                .element("root", None, None, 1, None)
                .element("a", Some(Repetition::Optional), Some(1), 0, None),
        );
        let assembler = RecordAssembler::new(&schema);
        let mut arena = RecordArena::new();
        let mut batches = vec![int_batch(&[1], vec![4], vec![], 1, 0)];
        assert!(matches!(
            assembler.assemble_record(&mut arena, &mut batches),
            Err(Error::Corrupt { .. })
        ));
    }
}
