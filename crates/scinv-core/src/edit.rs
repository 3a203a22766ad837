use std::fmt;

use crate::schema::Storage;
use crate::validate::FieldKind;
use crate::NodeId;

/// One validated change to a single field, ready to be applied.
///
/// `old` records the value the edit was prepared against; applying fails with
/// a conflict when the document no longer holds it. `new` of `None` removes
/// the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub node: NodeId,
    /// Node path at the time the edit was prepared.
    pub path: String,
    pub field: String,
    pub kind: FieldKind,
    pub storage: Storage,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl FieldEdit {
    /// False when applying the edit would leave the document unchanged.
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

impl fmt::Display for FieldEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: &Option<String>| match value {
            Some(value) => format!("{value:?}"),
            None => "<unset>".to_string(),
        };
        write!(
            f,
            "{} {}: {} -> {}",
            self.path,
            self.field,
            show(&self.old),
            show(&self.new)
        )
    }
}
