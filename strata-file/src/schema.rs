// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The schema tree and the per-leaf field paths.
//!
//! The footer stores the schema as a flattened pre-order list; this
//! module rebuilds the tree, computes definition/repetition maxima, and
//! derives for every leaf the path the record assembler walks: a
//! sequence of slot selectors with per-step definition thresholds.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::location;
use strata_core::{Error, Result};
use strata_encoding::format::Codec;
use strata_encoding::{ColumnDescriptor, PhysicalType};

use crate::meta::{FileMetadata, LogicalType, Repetition, SchemaElement};

/// What a group node means for materialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Struct,
    List,
    Map,
}

#[derive(Debug)]
pub struct GroupNode {
    pub name: String,
    pub repetition: Repetition,
    pub kind: GroupKind,
    pub children: Vec<SchemaNode>,
    /// Definition level of this node (optional/repeated ancestors
    /// inclusive).
    pub def_level: u16,
    pub rep_level: u16,
}

#[derive(Debug)]
pub struct PrimitiveNode {
    pub name: String,
    pub repetition: Repetition,
    pub physical_type: PhysicalType,
    pub logical: Option<LogicalType>,
    pub column_index: usize,
    pub def_level: u16,
    pub rep_level: u16,
}

#[derive(Debug)]
pub enum SchemaNode {
    Group(GroupNode),
    Primitive(PrimitiveNode),
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Group(g) => &g.name,
            Self::Primitive(p) => &p.name,
        }
    }

    pub fn repetition(&self) -> Repetition {
        match self {
            Self::Group(g) => g.repetition,
            Self::Primitive(p) => p.repetition,
        }
    }
}

impl GroupNode {
    /// The element node of a list wrapper (`kind == List`), resolved
    /// across the two-level, three-level and legacy shapes.
    pub fn list_element(&self) -> &SchemaNode {
        match &self.children[0] {
            primitive @ SchemaNode::Primitive(_) => primitive,
            group @ SchemaNode::Group(repeated) => {
                if repeated_group_is_element(repeated, &self.name) {
                    group
                } else {
                    &repeated.children[0]
                }
            }
        }
    }

    /// Key and value nodes of a map wrapper (`kind == Map`).
    pub fn map_key_value(&self) -> (&SchemaNode, &SchemaNode) {
        match &self.children[0] {
            SchemaNode::Group(kv) => (&kv.children[0], &kv.children[1]),
            SchemaNode::Primitive(_) => unreachable!("map wrappers hold a key_value group"),
        }
    }
}

/// Selects the slot the current path step addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Fixed slot of the current struct node.
    Field(usize),
    /// Element slot of the current list/map node, addressed by the
    /// assembler's index vector.  The entry exists once the value's
    /// definition level reaches `def`.
    Index { def: u16 },
}

/// What happens at the selected slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAction {
    /// Get-or-create a container node, provided the value's definition
    /// level reaches `def`; otherwise the slot stays null.
    Container { kind: ContainerKind, def: u16 },
    /// Write the leaf value when the value's definition level equals
    /// `def` (the leaf's maximum).
    Leaf { def: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    /// Struct with a fixed slot count.
    Struct(usize),
    List,
    Map,
}

#[derive(Clone, Copy, Debug)]
pub struct PathStep {
    pub selector: Selector,
    pub action: StepAction,
}

/// The assembler's walk for one leaf column.
#[derive(Clone, Debug)]
pub struct FieldPath {
    pub steps: Vec<PathStep>,
}

/// Per-leaf summary, indexed by `column_index`.
#[derive(Clone, Debug)]
pub struct LeafColumn {
    pub column_index: usize,
    /// Dotted path of the leaf, e.g. `address.street`.
    pub dotted_name: String,
    /// Root child this leaf belongs to.
    pub top_level_field: usize,
    pub physical_type: PhysicalType,
    pub logical: Option<LogicalType>,
    pub max_def: u16,
    pub max_rep: u16,
    pub path: FieldPath,
}

/// The reconstructed schema tree plus leaf lookup tables.
#[derive(Debug)]
pub struct FileSchema {
    pub root: GroupNode,
    leaves: Vec<LeafColumn>,
    by_dotted_name: HashMap<String, usize>,
}

impl FileSchema {
    /// Rebuild the tree from the footer's flattened element list.
    pub fn from_metadata(metadata: &FileMetadata, path: &str) -> Result<Self> {
        let elements = &metadata.schema;
        let root_element = elements.first().ok_or_else(|| {
            Error::corrupt(path, "metadata holds no schema elements", location!())
        })?;
        let mut pos = 1usize;
        let mut next_column = 0usize;
        let mut children = Vec::with_capacity(root_element.num_children);
        for _ in 0..root_element.num_children {
            children.push(build_node(elements, &mut pos, 0, 0, &mut next_column, path)?);
        }
        if pos != elements.len() {
            return Err(Error::corrupt(
                path,
                format!(
                    "schema list holds {} elements but the tree consumed {pos}",
                    elements.len()
                ),
                location!(),
            ));
        }
        let root = GroupNode {
            name: root_element.name.clone(),
            repetition: Repetition::Required,
            kind: GroupKind::Struct,
            children,
            def_level: 0,
            rep_level: 0,
        };

        let mut leaves = Vec::new();
        for (field_index, child) in root.children.iter().enumerate() {
            let mut prefix = Vec::new();
            let mut names = Vec::new();
            collect_paths(
                child,
                Selector::Field(field_index),
                0,
                field_index,
                &mut prefix,
                &mut names,
                &mut leaves,
            );
        }
        // Leaves were visited in schema order, which matches the
        // column-index assignment order.
        leaves.sort_by_key(|leaf| leaf.column_index);
        let by_dotted_name = leaves
            .iter()
            .map(|leaf| (leaf.dotted_name.clone(), leaf.column_index))
            .collect();

        Ok(Self {
            root,
            leaves,
            by_dotted_name,
        })
    }

    pub fn num_columns(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, column_index: usize) -> &LeafColumn {
        &self.leaves[column_index]
    }

    pub fn leaf_by_name(&self, dotted_name: &str) -> Option<&LeafColumn> {
        self.by_dotted_name
            .get(dotted_name)
            .map(|index| &self.leaves[*index])
    }

    /// True when no group or repeated field exists: rows are plain
    /// tuples of the leaf values.
    pub fn is_flat(&self) -> bool {
        self.root.children.iter().all(|child| {
            matches!(child, SchemaNode::Primitive(p) if p.repetition != Repetition::Repeated)
        })
    }

    pub fn top_level_field_index(&self, name: &str) -> Option<usize> {
        self.root
            .children
            .iter()
            .position(|child| child.name() == name)
    }

    pub fn descriptor(&self, column_index: usize, file: &str, codec: Codec) -> ColumnDescriptor {
        let leaf = &self.leaves[column_index];
        ColumnDescriptor {
            file: file.to_string(),
            name: leaf.dotted_name.clone(),
            physical_type: leaf.physical_type,
            max_def_level: leaf.max_def,
            max_rep_level: leaf.max_rep,
            codec,
        }
    }

    /// Resolve a projection given as top-level field names.  `None`
    /// selects everything.
    pub fn project(&self, fields: Option<&[&str]>) -> Result<ProjectedSchema> {
        let field_indices: Vec<usize> = match fields {
            None => (0..self.root.children.len()).collect(),
            Some(names) => {
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    let index = self.top_level_field_index(name).ok_or_else(|| {
                        Error::schema(format!("no top-level field named '{name}'"), location!())
                    })?;
                    indices.push(index);
                }
                indices.sort_unstable();
                indices.dedup();
                indices
            }
        };
        let mut columns = Vec::new();
        for leaf in &self.leaves {
            if field_indices.contains(&leaf.top_level_field) {
                columns.push(leaf.column_index);
            }
        }
        let mut column_to_projected = vec![None; self.leaves.len()];
        for (projected, column_index) in columns.iter().enumerate() {
            column_to_projected[*column_index] = Some(projected);
        }
        let mut field_to_projected = vec![None; self.root.children.len()];
        for (projected, field_index) in field_indices.iter().enumerate() {
            field_to_projected[*field_index] = Some(projected);
        }
        Ok(ProjectedSchema {
            columns,
            fields: field_indices,
            column_to_projected,
            field_to_projected,
        })
    }
}

/// A projection: the selected top-level fields and their leaf columns,
/// with maps between original and projected indices.
#[derive(Debug, Clone)]
pub struct ProjectedSchema {
    /// Projected leaf column indices, ascending.
    pub columns: Vec<usize>,
    /// Projected top-level field indices, ascending.
    pub fields: Vec<usize>,
    column_to_projected: Vec<Option<usize>>,
    field_to_projected: Vec<Option<usize>>,
}

impl ProjectedSchema {
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn projected_column(&self, column_index: usize) -> Option<usize> {
        self.column_to_projected.get(column_index).copied().flatten()
    }

    pub fn projected_field(&self, field_index: usize) -> Option<usize> {
        self.field_to_projected.get(field_index).copied().flatten()
    }
}

fn build_node(
    elements: &[SchemaElement],
    pos: &mut usize,
    parent_def: u16,
    parent_rep: u16,
    next_column: &mut usize,
    path: &str,
) -> Result<SchemaNode> {
    let element = elements.get(*pos).ok_or_else(|| {
        Error::corrupt(
            path,
            "schema list ended before the tree was complete",
            location!(),
        )
    })?;
    *pos += 1;

    let repetition = element.repetition.unwrap_or(Repetition::Required);
    let def_level = parent_def + u16::from(repetition != Repetition::Required);
    let rep_level = parent_rep + u16::from(repetition == Repetition::Repeated);

    if element.num_children == 0 {
        let physical_type = element.physical_type.ok_or_else(|| {
            Error::corrupt(
                path,
                format!("leaf element '{}' without a physical type", element.name),
                location!(),
            )
        })?;
        let column_index = *next_column;
        *next_column += 1;
        return Ok(SchemaNode::Primitive(PrimitiveNode {
            name: element.name.clone(),
            repetition,
            physical_type,
            logical: element.logical,
            column_index,
            def_level,
            rep_level,
        }));
    }

    let mut children = Vec::with_capacity(element.num_children);
    for _ in 0..element.num_children {
        children.push(build_node(
            elements,
            pos,
            def_level,
            rep_level,
            next_column,
            path,
        )?);
    }

    let kind = match element.logical {
        Some(LogicalType::List) => {
            if is_list_shaped(&children) {
                GroupKind::List
            } else {
                GroupKind::Struct
            }
        }
        Some(LogicalType::Map) => {
            if is_map_shaped(&children) {
                GroupKind::Map
            } else {
                GroupKind::Struct
            }
        }
        _ => GroupKind::Struct,
    };

    Ok(SchemaNode::Group(GroupNode {
        name: element.name.clone(),
        repetition,
        kind,
        children,
        def_level,
        rep_level,
    }))
}

/// A list wrapper holds a single repeated child.
fn is_list_shaped(children: &[SchemaNode]) -> bool {
    children.len() == 1 && children[0].repetition() == Repetition::Repeated
}

/// A map wrapper holds a single repeated group of key/value fields.
fn is_map_shaped(children: &[SchemaNode]) -> bool {
    match children {
        [SchemaNode::Group(kv)] => kv.repetition == Repetition::Repeated && kv.children.len() == 2,
        _ => false,
    }
}

/// True when the repeated middle group of a list wrapper is itself the
/// element (legacy two-level shape) rather than a wrapper around one.
fn repeated_group_is_element(group: &GroupNode, wrapper_name: &str) -> bool {
    if group.children.len() != 1 {
        return true;
    }
    group.name == "array" || group.name == format!("{wrapper_name}_tuple")
}

fn collect_paths(
    node: &SchemaNode,
    selector: Selector,
    parent_def: u16,
    top_level_field: usize,
    prefix: &mut Vec<PathStep>,
    names: &mut Vec<String>,
    leaves: &mut Vec<LeafColumn>,
) {
    match node {
        SchemaNode::Primitive(p) => {
            names.push(p.name.clone());
            if p.repetition == Repetition::Repeated {
                // A bare repeated primitive reads as a list of values.
                prefix.push(PathStep {
                    selector,
                    action: StepAction::Container {
                        kind: ContainerKind::List,
                        def: parent_def,
                    },
                });
                prefix.push(PathStep {
                    selector: Selector::Index { def: p.def_level },
                    action: StepAction::Leaf { def: p.def_level },
                });
                emit_leaf(p, top_level_field, prefix, names, leaves);
                prefix.pop();
                prefix.pop();
            } else {
                prefix.push(PathStep {
                    selector,
                    action: StepAction::Leaf { def: p.def_level },
                });
                emit_leaf(p, top_level_field, prefix, names, leaves);
                prefix.pop();
            }
            names.pop();
        }
        SchemaNode::Group(g) => {
            names.push(g.name.clone());
            if g.repetition == Repetition::Repeated {
                // A bare repeated group reads as a list of structs.
                prefix.push(PathStep {
                    selector,
                    action: StepAction::Container {
                        kind: ContainerKind::List,
                        def: parent_def,
                    },
                });
                prefix.push(PathStep {
                    selector: Selector::Index { def: g.def_level },
                    action: StepAction::Container {
                        kind: ContainerKind::Struct(g.children.len()),
                        def: g.def_level,
                    },
                });
                descend_struct(g, top_level_field, prefix, names, leaves);
                prefix.pop();
                prefix.pop();
            } else {
                let kind = match g.kind {
                    GroupKind::Struct => ContainerKind::Struct(g.children.len()),
                    GroupKind::List => ContainerKind::List,
                    GroupKind::Map => ContainerKind::Map,
                };
                prefix.push(PathStep {
                    selector,
                    action: StepAction::Container {
                        kind,
                        def: g.def_level,
                    },
                });
                descend_group(g, top_level_field, prefix, names, leaves);
                prefix.pop();
            }
            names.pop();
        }
    }
}

/// Continue below a group whose container step is already on the path.
fn descend_group(
    g: &GroupNode,
    top_level_field: usize,
    prefix: &mut Vec<PathStep>,
    names: &mut Vec<String>,
    leaves: &mut Vec<LeafColumn>,
) {
    match g.kind {
        GroupKind::Struct => descend_struct(g, top_level_field, prefix, names, leaves),
        GroupKind::List => {
            match &g.children[0] {
                SchemaNode::Primitive(p) => {
                    // Two-level shape: repeated primitive element.
                    names.push(p.name.clone());
                    prefix.push(PathStep {
                        selector: Selector::Index { def: p.def_level },
                        action: StepAction::Leaf { def: p.def_level },
                    });
                    emit_leaf(p, top_level_field, prefix, names, leaves);
                    prefix.pop();
                    names.pop();
                }
                SchemaNode::Group(repeated) => {
                    if repeated_group_is_element(repeated, &g.name) {
                        // Legacy shape: the repeated group is the element.
                        names.push(repeated.name.clone());
                        prefix.push(PathStep {
                            selector: Selector::Index {
                                def: repeated.def_level,
                            },
                            action: StepAction::Container {
                                kind: ContainerKind::Struct(repeated.children.len()),
                                def: repeated.def_level,
                            },
                        });
                        descend_struct(repeated, top_level_field, prefix, names, leaves);
                        prefix.pop();
                        names.pop();
                    } else {
                        // Standard three-level shape.
                        let element = &repeated.children[0];
                        names.push(repeated.name.clone());
                        match element {
                            SchemaNode::Primitive(p) => {
                                names.push(p.name.clone());
                                prefix.push(PathStep {
                                    selector: Selector::Index {
                                        def: repeated.def_level,
                                    },
                                    action: StepAction::Leaf { def: p.def_level },
                                });
                                emit_leaf(p, top_level_field, prefix, names, leaves);
                                prefix.pop();
                                names.pop();
                            }
                            SchemaNode::Group(e) => {
                                names.push(e.name.clone());
                                let kind = match e.kind {
                                    GroupKind::Struct => ContainerKind::Struct(e.children.len()),
                                    GroupKind::List => ContainerKind::List,
                                    GroupKind::Map => ContainerKind::Map,
                                };
                                prefix.push(PathStep {
                                    selector: Selector::Index {
                                        def: repeated.def_level,
                                    },
                                    action: StepAction::Container {
                                        kind,
                                        def: e.def_level,
                                    },
                                });
                                descend_group(e, top_level_field, prefix, names, leaves);
                                prefix.pop();
                                names.pop();
                            }
                        }
                        names.pop();
                    }
                }
            }
        }
        GroupKind::Map => {
            // The repeated key_value group materializes as entry structs.
            if let SchemaNode::Group(kv) = &g.children[0] {
                names.push(kv.name.clone());
                prefix.push(PathStep {
                    selector: Selector::Index { def: kv.def_level },
                    action: StepAction::Container {
                        kind: ContainerKind::Struct(kv.children.len()),
                        def: kv.def_level,
                    },
                });
                descend_struct(kv, top_level_field, prefix, names, leaves);
                prefix.pop();
                names.pop();
            }
        }
    }
}

fn descend_struct(
    g: &GroupNode,
    top_level_field: usize,
    prefix: &mut Vec<PathStep>,
    names: &mut Vec<String>,
    leaves: &mut Vec<LeafColumn>,
) {
    for (field_index, child) in g.children.iter().enumerate() {
        collect_paths(
            child,
            Selector::Field(field_index),
            g.def_level,
            top_level_field,
            prefix,
            names,
            leaves,
        );
    }
}

fn emit_leaf(
    p: &PrimitiveNode,
    top_level_field: usize,
    prefix: &[PathStep],
    names: &[String],
    leaves: &mut Vec<LeafColumn>,
) {
    leaves.push(LeafColumn {
        column_index: p.column_index,
        dotted_name: names.join("."),
        top_level_field,
        physical_type: p.physical_type,
        logical: p.logical,
        max_def: p.def_level,
        max_rep: p.rep_level,
        path: FieldPath {
            steps: prefix.to_vec(),
        },
    });
}

/// Shared schema handle used across readers.
pub type SchemaRef = Arc<FileSchema>;
