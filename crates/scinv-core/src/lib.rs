//! SeisComP inventory document model: typed nodes over a formatting-preserving
//! XML tree, field validation and revision-based dirty tracking.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

mod document;
mod edit;
pub mod schema;
pub mod validate;

pub use document::{Field, InventoryDocument, UnresolvedBinding};
pub use edit::FieldEdit;
pub use schema::{Access, FieldSpec, Storage};
pub use scinv_xml::XmlError;
pub use validate::{validate, FieldKind, FieldValue, Rule, UnknownFieldKind, ValidationError};

/// Reasons a document is rejected at load time.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("not a SeisComP document: root element is <{0}>")]
    NotSeiscomp(String),
    #[error("no <Inventory> element below <seiscomp>")]
    MissingInventory,
    #[error("<{element}> is not allowed inside <{parent}>")]
    Misplaced { element: String, parent: String },
}

/// Error type produced by document operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The handle was issued for a document that has since been replaced.
    #[error("stale node handle {0}: the document was reloaded")]
    StaleNode(NodeId),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    /// Several sibling epochs share the code; the path needs their start time.
    #[error("{path:?} matches {} nodes: {}", .candidates.len(), .candidates.join(", "))]
    Ambiguous {
        path: String,
        candidates: Vec<String>,
    },
    #[error("unknown field {field:?} on {node}")]
    UnknownField { node: String, field: String },
    #[error("field {field:?} on {node} is read-only")]
    ReadOnly { node: String, field: String },
    /// The field element holds attributes or child elements, not plain text.
    #[error("field {field:?} on {node} contains nested markup and cannot be edited as text")]
    NestedField { node: String, field: String },
    #[error("field {field:?} on {node} is required and cannot be cleared")]
    Required { node: String, field: String },
    #[error("invalid {field:?} on {node}: {source}")]
    Validation {
        node: String,
        field: String,
        #[source]
        source: ValidationError,
    },
    #[error("{field:?} on {node} references {reference:?}, which is not a known {target}")]
    UnresolvedReference {
        node: String,
        field: String,
        reference: String,
        target: NodeKind,
    },
    /// The field changed between preparing and applying an edit.
    #[error("conflicting edit of {field:?} on {node}: expected {expected:?}, found {found:?}")]
    Conflict {
        node: String,
        field: String,
        expected: Option<String>,
        found: Option<String>,
    },
}

impl InventoryError {
    /// The validation failure behind this error, if it is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            InventoryError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Typed inventory objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Inventory,
    Network,
    Station,
    SensorLocation,
    Stream,
    Sensor,
    Datalogger,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Inventory,
        NodeKind::Network,
        NodeKind::Station,
        NodeKind::SensorLocation,
        NodeKind::Stream,
        NodeKind::Sensor,
        NodeKind::Datalogger,
    ];

    /// Local element name used by SeisComP.
    pub fn element_name(&self) -> &'static str {
        match self {
            NodeKind::Inventory => "Inventory",
            NodeKind::Network => "network",
            NodeKind::Station => "station",
            NodeKind::SensorLocation => "sensorLocation",
            NodeKind::Stream => "stream",
            NodeKind::Sensor => "sensor",
            NodeKind::Datalogger => "datalogger",
        }
    }

    pub fn from_element_name(name: &str) -> Option<NodeKind> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.element_name() == name)
    }

    /// Kind of a child element named `name` directly below this kind.
    pub fn child_kind(&self, name: &str) -> Option<NodeKind> {
        let allowed: &[NodeKind] = match self {
            NodeKind::Inventory => &[NodeKind::Sensor, NodeKind::Datalogger, NodeKind::Network],
            NodeKind::Network => &[NodeKind::Station],
            NodeKind::Station => &[NodeKind::SensorLocation],
            NodeKind::SensorLocation => &[NodeKind::Stream],
            NodeKind::Stream | NodeKind::Sensor | NodeKind::Datalogger => &[],
        };
        allowed
            .iter()
            .copied()
            .find(|kind| kind.element_name() == name)
    }

    /// Heading used in tree labels.
    pub fn title(&self) -> &'static str {
        match self {
            NodeKind::Inventory => "Inventory",
            NodeKind::Network => "Network",
            NodeKind::Station => "Station",
            NodeKind::SensorLocation => "Location",
            NodeKind::Stream => "Stream",
            NodeKind::Sensor => "Sensor",
            NodeKind::Datalogger => "Datalogger",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Handle to a node of one particular load of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

impl NodeId {
    pub(crate) fn new(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Load generation the handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}
