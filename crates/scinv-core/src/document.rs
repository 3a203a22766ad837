use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use scinv_xml::{Document, Element, FormatHints};
use tracing::{debug, info, warn};

use crate::schema::{
    self, Access, FieldSpec, Storage, SAMPLE_RATE, SAMPLE_RATE_DENOMINATOR, SAMPLE_RATE_NUMERATOR,
};
use crate::validate::{self, FieldKind, FieldValue, Rule, ValidationError};
use crate::{FieldEdit, InventoryError, NodeId, NodeKind, ParseError};

/// Every load draws a fresh generation so handles from older loads are refused.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

const SCHEMA_NAMESPACES: [&str; 2] = [
    "http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/",
    "http://geofon.gfz-potsdam.de/ns/seiscomp-schema/",
];

/// Leaf element that tells epochs with the same code apart.
const EPOCH_START: &str = "start";

const BINDINGS: [(&str, NodeKind); 2] = [
    ("sensor", NodeKind::Sensor),
    ("datalogger", NodeKind::Datalogger),
];

#[derive(Debug, Clone)]
struct NodeEntry {
    kind: NodeKind,
    /// Child indices leading from the `seiscomp` root to the node element.
    location: Vec<usize>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Current value of one field of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
    pub storage: Storage,
    pub access: Access,
    /// False for attributes and elements outside the schema table.
    pub known: bool,
}

/// A stream `sensor`/`datalogger` attribute with no matching `publicID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedBinding {
    pub stream: NodeId,
    pub path: String,
    pub field: &'static str,
    pub reference: String,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: FieldKind,
    storage: Storage,
    access: Access,
    target: Option<NodeKind>,
    known: bool,
}

impl Slot {
    fn extra(storage: Storage) -> Self {
        Self {
            kind: FieldKind::Text,
            storage,
            access: Access::Optional,
            target: None,
            known: false,
        }
    }
}

impl From<&FieldSpec> for Slot {
    fn from(spec: &FieldSpec) -> Self {
        Self {
            kind: spec.kind,
            storage: spec.storage,
            access: spec.access,
            target: spec.target,
            known: true,
        }
    }
}

/// A loaded inventory: the XML tree plus a typed index over its nodes.
///
/// The tree is the only copy of the data. Edits write straight into it so
/// [`InventoryDocument::serialize`] reproduces everything that was not touched.
#[derive(Debug, Clone)]
pub struct InventoryDocument {
    xml: Document,
    nodes: Vec<NodeEntry>,
    generation: u64,
    schema_version: Option<String>,
    revision: u64,
    saved_revision: u64,
}

impl InventoryDocument {
    /// Read and parse the inventory stored at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Self::parse(&text)?;
        info!(
            path = %path.display(),
            nodes = document.nodes.len(),
            generation = document.generation,
            "loaded inventory"
        );
        Ok(document)
    }

    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let xml = scinv_xml::parse(xml)?;
        let root = xml.root();
        if root.local_name() != "seiscomp" {
            return Err(ParseError::NotSeiscomp(root.name().to_string()));
        }
        let schema_version = schema_version(root);
        if schema_version.is_none() {
            warn!(root = root.name(), "unrecognised SeisComP schema namespace");
        }
        let nodes = index(root)?;
        let document = Self {
            xml,
            nodes,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            schema_version,
            revision: 0,
            saved_revision: 0,
        };
        for binding in document.unresolved_bindings() {
            warn!(
                stream = %binding.path,
                field = binding.field,
                reference = %binding.reference,
                "unresolved binding reference"
            );
        }
        debug!(
            nodes = document.nodes.len(),
            version = ?document.schema_version,
            "indexed inventory"
        );
        Ok(document)
    }

    pub fn root(&self) -> NodeId {
        self.id(0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Schema version taken from the namespace URI, e.g. `0.12`.
    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in document order.
    pub fn walk(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|idx| self.id(idx))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(idx, _)| self.id(idx))
            .collect()
    }

    pub fn kind(&self, node: NodeId) -> Result<NodeKind, InventoryError> {
        Ok(self.entry(node)?.kind)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, InventoryError> {
        Ok(self.entry(node)?.parent.map(|idx| self.id(idx)))
    }

    /// Child nodes in source order.
    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>, InventoryError> {
        let entry = self.entry(node)?;
        Ok(entry.children.iter().map(|&idx| self.id(idx)).collect())
    }

    /// Identifying value: the code, or the name of sensors and dataloggers.
    pub fn key(&self, node: NodeId) -> Result<String, InventoryError> {
        self.entry(node)?;
        Ok(self.key_of(node.index()))
    }

    /// Tree label such as `Station: APE`.
    pub fn label(&self, node: NodeId) -> Result<String, InventoryError> {
        let kind = self.entry(node)?.kind;
        if kind == NodeKind::Inventory {
            return Ok(kind.title().to_string());
        }
        Ok(format!(
            "{}: {}{}",
            kind.title(),
            self.key_of(node.index()),
            self.epoch_of(node.index()).unwrap_or_default()
        ))
    }

    /// Slash-separated address such as `network=GE/station=APE`.
    ///
    /// Siblings of one kind that share a code are epochs of the same object.
    /// Their segments carry the start time, `stream=BHZ@2015-01-01T00:00:00Z`,
    /// or the 1-based position among them, `stream=BHZ[2]`, when start times
    /// are missing or repeated.
    pub fn path(&self, node: NodeId) -> Result<String, InventoryError> {
        self.entry(node)?;
        Ok(self.path_of(node.index()))
    }

    /// Look a node up by the address returned from [`InventoryDocument::path`].
    ///
    /// An address without the epoch qualifiers is accepted when it names a
    /// single node, and rejected as ambiguous when it names several.
    pub fn find(&self, path: &str) -> Result<NodeId, InventoryError> {
        let wanted = path.trim_matches('/');
        if let Some(idx) = (0..self.nodes.len()).find(|&idx| self.path_of(idx) == wanted) {
            return Ok(self.id(idx));
        }
        let matches: Vec<usize> = (0..self.nodes.len())
            .filter(|&idx| self.plain_path_of(idx) == wanted)
            .collect();
        match matches.as_slice() {
            [] => Err(InventoryError::NodeNotFound(path.to_string())),
            [idx] => Ok(self.id(*idx)),
            _ => Err(InventoryError::Ambiguous {
                path: path.to_string(),
                candidates: matches.iter().map(|&idx| self.path_of(idx)).collect(),
            }),
        }
    }

    /// Attributes, then leaf elements, then derived fields.
    pub fn fields(&self, node: NodeId) -> Result<Vec<Field>, InventoryError> {
        let entry = self.entry(node)?;
        let element = self.element(entry)?;
        let kind = entry.kind;
        let mut fields: Vec<Field> = element
            .attributes()
            .iter()
            .map(|attr| field(kind, attr.name(), attr.value(), Storage::Attribute))
            .collect();
        for child in element.child_elements() {
            if is_field_element(child) {
                let value = child.text().unwrap_or_default();
                fields.push(field(kind, child.local_name(), value.trim(), Storage::Element));
            }
        }
        if kind == NodeKind::Stream {
            if let Some(rate) = sample_rate(element) {
                fields.push(field(kind, SAMPLE_RATE, &rate, Storage::Derived));
            }
        }
        Ok(fields)
    }

    pub fn get(&self, node: NodeId, name: &str) -> Result<Option<String>, InventoryError> {
        let entry = self.entry(node)?;
        Ok(read_field(entry.kind, self.element(entry)?, name))
    }

    /// Validate a new value for `name` without touching the document.
    pub fn prepare_edit(
        &self,
        node: NodeId,
        name: &str,
        raw: &str,
    ) -> Result<FieldEdit, InventoryError> {
        let entry = self.entry(node)?;
        let element = self.element(entry)?;
        let slot = self.writable_slot(node, entry.kind, element, name)?;

        let value =
            validate::validate(slot.kind, raw).map_err(|source| InventoryError::Validation {
                node: self.path_of(node.index()),
                field: name.to_string(),
                source,
            })?;
        let new = match value {
            FieldValue::Rate {
                numerator,
                denominator,
            } => validate::format_rate(numerator, denominator)
                .unwrap_or_else(|| raw.trim().to_string()),
            _ => raw.trim().to_string(),
        };
        if let Some(target) = slot.target {
            if self.find_public_id(target, &new).is_none() {
                return Err(InventoryError::UnresolvedReference {
                    node: self.path_of(node.index()),
                    field: name.to_string(),
                    reference: new,
                    target,
                });
            }
        }

        Ok(FieldEdit {
            node,
            path: self.path_of(node.index()),
            field: name.to_string(),
            kind: slot.kind,
            storage: slot.storage,
            old: read_field(entry.kind, element, name),
            new: Some(new),
        })
    }

    /// Prepare the removal of an optional field.
    pub fn prepare_clear(&self, node: NodeId, name: &str) -> Result<FieldEdit, InventoryError> {
        let entry = self.entry(node)?;
        let element = self.element(entry)?;
        let slot = self.writable_slot(node, entry.kind, element, name)?;
        if slot.access == Access::Required {
            return Err(InventoryError::Required {
                node: self.path_of(node.index()),
                field: name.to_string(),
            });
        }
        Ok(FieldEdit {
            node,
            path: self.path_of(node.index()),
            field: name.to_string(),
            kind: slot.kind,
            storage: slot.storage,
            old: read_field(entry.kind, element, name),
            new: None,
        })
    }

    /// Write a prepared edit into the tree. Returns whether anything changed;
    /// only changes advance the revision.
    pub fn apply_edit(&mut self, edit: &FieldEdit) -> Result<bool, InventoryError> {
        let entry = self.entry(edit.node)?;
        let kind = entry.kind;
        let location = entry.location.clone();
        let element = self.element(entry)?;
        if has_nested_field(element, edit.storage, &edit.field) {
            return Err(InventoryError::NestedField {
                node: edit.path.clone(),
                field: edit.field.clone(),
            });
        }
        let current = read_field(kind, element, &edit.field);
        if current != edit.old {
            return Err(InventoryError::Conflict {
                node: edit.path.clone(),
                field: edit.field.clone(),
                expected: edit.old.clone(),
                found: current,
            });
        }
        if !edit.is_change() {
            return Ok(false);
        }

        let rate = match (edit.storage, edit.new.as_deref()) {
            (Storage::Derived, Some(value)) => {
                Some(rate_parts(value).map_err(|source| InventoryError::Validation {
                    node: edit.path.clone(),
                    field: edit.field.clone(),
                    source,
                })?)
            }
            _ => None,
        };

        let hints = self.xml.hints().clone();
        let depth = location.len();
        let element = element_at_mut(self.xml.root_mut(), &location)
            .ok_or_else(|| InventoryError::NodeNotFound(edit.path.clone()))?;
        let restructured = match edit.storage {
            Storage::Attribute => {
                match edit.new.as_deref() {
                    Some(value) => element.set_attribute(&edit.field, value),
                    None => {
                        element.remove_attribute(&edit.field);
                    }
                }
                false
            }
            Storage::Element => {
                write_leaf(element, &edit.field, edit.new.as_deref(), &hints, depth)
            }
            Storage::Derived => {
                let (numerator, denominator) = match rate {
                    Some((n, d)) => (Some(n.to_string()), Some(d.to_string())),
                    None => (None, None),
                };
                let a = write_leaf(
                    element,
                    SAMPLE_RATE_NUMERATOR,
                    numerator.as_deref(),
                    &hints,
                    depth,
                );
                let b = write_leaf(
                    element,
                    SAMPLE_RATE_DENOMINATOR,
                    denominator.as_deref(),
                    &hints,
                    depth,
                );
                a || b
            }
        };
        if restructured {
            // Leaf elements are never nodes, so the same nodes come back in
            // the same order; only their locations shift.
            self.nodes = index(self.xml.root())?;
        }

        self.revision += 1;
        debug!(
            node = %edit.path,
            field = %edit.field,
            old = ?edit.old,
            new = ?edit.new,
            revision = self.revision,
            "applied edit"
        );
        Ok(true)
    }

    /// Validate and apply in one step.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        raw: &str,
    ) -> Result<FieldEdit, InventoryError> {
        let edit = self.prepare_edit(node, name, raw)?;
        self.apply_edit(&edit)?;
        Ok(edit)
    }

    /// Remove an optional attribute or element.
    pub fn clear_attribute(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<FieldEdit, InventoryError> {
        let edit = self.prepare_clear(node, name)?;
        self.apply_edit(&edit)?;
        Ok(edit)
    }

    /// Render the tree, reusing the formatting recorded at load.
    pub fn serialize(&self) -> String {
        self.xml.to_xml()
    }

    pub fn xml(&self) -> &Document {
        &self.xml
    }

    /// Number of applied changes since load.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Record that the content as of `revision` reached disk. Edits applied
    /// after that revision keep the document dirty.
    pub fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = revision.min(self.revision);
    }

    /// Sensor or datalogger a stream is bound to.
    pub fn binding(
        &self,
        stream: NodeId,
        target: NodeKind,
    ) -> Result<Option<NodeId>, InventoryError> {
        let entry = self.entry(stream)?;
        let element = self.element(entry)?;
        Ok(element
            .attribute(target.element_name())
            .and_then(|reference| self.find_public_id(target, reference))
            .map(|idx| self.id(idx)))
    }

    /// Stream bindings whose `publicID` is not defined in this document.
    pub fn unresolved_bindings(&self) -> Vec<UnresolvedBinding> {
        let mut unresolved = Vec::new();
        for (idx, entry) in self.nodes.iter().enumerate() {
            if entry.kind != NodeKind::Stream {
                continue;
            }
            let Some(element) = element_at(self.xml.root(), &entry.location) else {
                continue;
            };
            for (field, target) in BINDINGS {
                let Some(reference) = element.attribute(field) else {
                    continue;
                };
                if !reference.is_empty() && self.find_public_id(target, reference).is_none() {
                    unresolved.push(UnresolvedBinding {
                        stream: self.id(idx),
                        path: self.path_of(idx),
                        field,
                        reference: reference.to_string(),
                    });
                }
            }
        }
        unresolved
    }

    fn id(&self, index: usize) -> NodeId {
        NodeId::new(index, self.generation)
    }

    fn entry(&self, node: NodeId) -> Result<&NodeEntry, InventoryError> {
        if node.generation() != self.generation {
            return Err(InventoryError::StaleNode(node));
        }
        self.nodes
            .get(node.index())
            .ok_or_else(|| InventoryError::NodeNotFound(node.to_string()))
    }

    fn element(&self, entry: &NodeEntry) -> Result<&Element, InventoryError> {
        element_at(self.xml.root(), &entry.location)
            .ok_or_else(|| InventoryError::NodeNotFound(format!("{:?}", entry.location)))
    }

    fn writable_slot(
        &self,
        node: NodeId,
        kind: NodeKind,
        element: &Element,
        name: &str,
    ) -> Result<Slot, InventoryError> {
        let slot = slot(kind, element, name).ok_or_else(|| InventoryError::UnknownField {
            node: self.path_of(node.index()),
            field: name.to_string(),
        })?;
        if slot.access == Access::ReadOnly {
            return Err(InventoryError::ReadOnly {
                node: self.path_of(node.index()),
                field: name.to_string(),
            });
        }
        if has_nested_field(element, slot.storage, name) {
            return Err(InventoryError::NestedField {
                node: self.path_of(node.index()),
                field: name.to_string(),
            });
        }
        Ok(slot)
    }

    fn key_of(&self, idx: usize) -> String {
        let entry = &self.nodes[idx];
        let Some(element) = element_at(self.xml.root(), &entry.location) else {
            return String::new();
        };
        let key = match entry.kind {
            NodeKind::Inventory => None,
            NodeKind::Sensor | NodeKind::Datalogger => element
                .attribute("name")
                .or_else(|| element.attribute("publicID")),
            _ => element.attribute("code"),
        };
        key.unwrap_or_default().to_string()
    }

    fn path_of(&self, idx: usize) -> String {
        self.join_segments(idx, |current| self.segment_of(current))
    }

    /// Path built from codes alone.
    fn plain_path_of(&self, idx: usize) -> String {
        self.join_segments(idx, |current| {
            format!(
                "{}={}",
                self.nodes[current].kind.element_name(),
                self.key_of(current)
            )
        })
    }

    fn join_segments(&self, idx: usize, segment: impl Fn(usize) -> String) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(idx);
        while let Some(current) = cursor {
            let entry = &self.nodes[current];
            if entry.kind != NodeKind::Inventory {
                segments.push(segment(current));
            }
            cursor = entry.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    fn segment_of(&self, idx: usize) -> String {
        format!(
            "{}={}{}",
            self.nodes[idx].kind.element_name(),
            self.key_of(idx),
            self.epoch_of(idx).unwrap_or_default()
        )
    }

    /// `@start` or `[position]` when siblings share this node's code.
    fn epoch_of(&self, idx: usize) -> Option<String> {
        let entry = &self.nodes[idx];
        let key = self.key_of(idx);
        let epochs: Vec<usize> = self.nodes[entry.parent?]
            .children
            .iter()
            .copied()
            .filter(|&sibling| self.nodes[sibling].kind == entry.kind && self.key_of(sibling) == key)
            .collect();
        if epochs.len() < 2 {
            return None;
        }
        let start = self.start_of(idx);
        let shared = epochs
            .iter()
            .filter(|&&sibling| self.start_of(sibling) == start)
            .count();
        match start {
            Some(start) if shared == 1 => Some(format!("@{start}")),
            _ => {
                let position = epochs.iter().position(|&sibling| sibling == idx)?;
                Some(format!("[{}]", position + 1))
            }
        }
    }

    fn start_of(&self, idx: usize) -> Option<String> {
        element_at(self.xml.root(), &self.nodes[idx].location)
            .and_then(|element| leaf_text(element, EPOCH_START))
            .filter(|start| !start.is_empty())
    }

    fn find_public_id(&self, kind: NodeKind, public_id: &str) -> Option<usize> {
        self.nodes.iter().position(|entry| {
            entry.kind == kind
                && element_at(self.xml.root(), &entry.location)
                    .and_then(|element| element.attribute("publicID"))
                    == Some(public_id)
        })
    }
}

fn schema_version(root: &Element) -> Option<String> {
    root.attributes()
        .iter()
        .filter(|attr| attr.name() == "xmlns" || attr.name().starts_with("xmlns:"))
        .find_map(|attr| {
            SCHEMA_NAMESPACES
                .iter()
                .find_map(|prefix| attr.value().strip_prefix(prefix))
        })
        .map(str::to_string)
}

fn index(root: &Element) -> Result<Vec<NodeEntry>, ParseError> {
    let mut inventory = None;
    for (idx, child) in root.indexed_child_elements() {
        match child.local_name() {
            "Inventory" if inventory.is_none() => inventory = Some((idx, child)),
            name if NodeKind::from_element_name(name).is_some() => {
                return Err(ParseError::Misplaced {
                    element: name.to_string(),
                    parent: root.local_name().to_string(),
                })
            }
            _ => {}
        }
    }
    let (idx, element) = inventory.ok_or(ParseError::MissingInventory)?;
    let mut nodes = vec![NodeEntry {
        kind: NodeKind::Inventory,
        location: vec![idx],
        parent: None,
        children: Vec::new(),
    }];
    index_children(&mut nodes, 0, element)?;
    Ok(nodes)
}

fn index_children(
    nodes: &mut Vec<NodeEntry>,
    parent: usize,
    element: &Element,
) -> Result<(), ParseError> {
    let kind = nodes[parent].kind;
    for (idx, child) in element.indexed_child_elements() {
        let name = child.local_name();
        match kind.child_kind(name) {
            Some(child_kind) => {
                let mut location = nodes[parent].location.clone();
                location.push(idx);
                let id = nodes.len();
                nodes.push(NodeEntry {
                    kind: child_kind,
                    location,
                    parent: Some(parent),
                    children: Vec::new(),
                });
                nodes[parent].children.push(id);
                index_children(nodes, id, child)?;
            }
            None if NodeKind::from_element_name(name).is_some() => {
                return Err(ParseError::Misplaced {
                    element: name.to_string(),
                    parent: element.local_name().to_string(),
                });
            }
            None => {}
        }
    }
    Ok(())
}

fn element_at<'a>(root: &'a Element, location: &[usize]) -> Option<&'a Element> {
    location
        .iter()
        .try_fold(root, |element, &idx| element.child_element(idx))
}

fn element_at_mut<'a>(root: &'a mut Element, location: &[usize]) -> Option<&'a mut Element> {
    let mut element = root;
    for &idx in location {
        element = element.child_element_mut(idx)?;
    }
    Some(element)
}

fn is_field_element(element: &Element) -> bool {
    element.is_leaf() && NodeKind::from_element_name(element.local_name()).is_none()
}

/// An element named like the field exists but is not a plain text leaf.
fn has_nested_field(element: &Element, storage: Storage, name: &str) -> bool {
    let names: &[&str] = match storage {
        Storage::Attribute => return false,
        Storage::Element => &[name],
        Storage::Derived => &[SAMPLE_RATE_NUMERATOR, SAMPLE_RATE_DENOMINATOR],
    };
    element.child_elements().any(|child| {
        names.contains(&child.local_name())
            && NodeKind::from_element_name(child.local_name()).is_none()
            && !child.is_leaf()
    })
}

fn leaf_index(element: &Element, name: &str) -> Option<usize> {
    element
        .indexed_child_elements()
        .find(|(_, child)| child.local_name() == name && is_field_element(child))
        .map(|(idx, _)| idx)
}

fn leaf_text(element: &Element, name: &str) -> Option<String> {
    let idx = leaf_index(element, name)?;
    element
        .child_element(idx)
        .and_then(Element::text)
        .map(|text| text.trim().to_string())
}

fn sample_rate(element: &Element) -> Option<String> {
    let numerator: i64 = leaf_text(element, SAMPLE_RATE_NUMERATOR)?.parse().ok()?;
    let denominator: i64 = leaf_text(element, SAMPLE_RATE_DENOMINATOR)?.parse().ok()?;
    validate::format_rate(numerator, denominator)
}

fn rate_parts(value: &str) -> Result<(i64, i64), ValidationError> {
    match validate::validate(FieldKind::SampleRate, value)? {
        FieldValue::Rate {
            numerator,
            denominator,
        } => Ok((numerator, denominator)),
        _ => Err(ValidationError {
            kind: FieldKind::SampleRate,
            value: value.to_string(),
            rule: Rule::NotRational,
        }),
    }
}

fn slot(kind: NodeKind, element: &Element, name: &str) -> Option<Slot> {
    let has_attribute = element.attribute(name).is_some();
    match schema::lookup(kind, name) {
        // An attribute spelled like a known element field stays an extra.
        Some(spec) if !(has_attribute && spec.storage == Storage::Element) => {
            Some(Slot::from(spec))
        }
        _ if has_attribute => Some(Slot::extra(Storage::Attribute)),
        _ => leaf_index(element, name).map(|_| Slot::extra(Storage::Element)),
    }
}

fn field(kind: NodeKind, name: &str, value: &str, storage: Storage) -> Field {
    let slot = schema::lookup(kind, name)
        .filter(|spec| spec.storage == storage)
        .map(Slot::from)
        .unwrap_or_else(|| Slot::extra(storage));
    Field {
        name: name.to_string(),
        value: value.to_string(),
        kind: slot.kind,
        storage,
        access: slot.access,
        known: slot.known,
    }
}

fn read_field(kind: NodeKind, element: &Element, name: &str) -> Option<String> {
    match slot(kind, element, name)?.storage {
        Storage::Derived => sample_rate(element),
        Storage::Attribute => element.attribute(name).map(str::to_string),
        Storage::Element => leaf_text(element, name),
    }
}

/// Set, create or remove the leaf element `name`. Returns true when an
/// element was added or removed.
fn write_leaf(
    element: &mut Element,
    name: &str,
    value: Option<&str>,
    hints: &FormatHints,
    depth: usize,
) -> bool {
    match (leaf_index(element, name), value) {
        (Some(idx), Some(value)) => {
            if let Some(child) = element.child_element_mut(idx) {
                child.set_text(value);
            }
            false
        }
        (Some(idx), None) => {
            element.remove_child(idx);
            true
        }
        (None, Some(value)) => {
            let child = Element::with_text(qualified(element, name), value);
            // Fields go ahead of nested nodes so they stay readable.
            let first_node = element
                .indexed_child_elements()
                .find(|(_, existing)| NodeKind::from_element_name(existing.local_name()).is_some())
                .map(|(idx, _)| idx);
            match first_node {
                Some(idx) => element.insert_element_before(idx, child),
                None => element.insert_element(child, hints, depth),
            };
            true
        }
        (None, None) => false,
    }
}

/// Reuse the namespace prefix of `parent` for a new child.
fn qualified(parent: &Element, name: &str) -> String {
    match parent.name().split_once(':') {
        Some((prefix, _)) => format!("{prefix}:{name}"),
        None => name.to_string(),
    }
}
