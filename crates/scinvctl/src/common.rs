use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use scinv::core::{Field, FieldValue, InventoryDocument, NodeId};
use scinv::{BackupPolicy, SessionConfig};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

/// Read session settings from a JSON file, or use the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

pub fn parse_backup(value: &str) -> Result<BackupPolicy, String> {
    match value {
        "suffix" => Ok(BackupPolicy::Suffix),
        "timestamped" => Ok(BackupPolicy::Timestamped),
        other => Err(format!("unknown backup policy {other:?} (suffix, timestamped)")),
    }
}

pub fn open_document(path: &Path) -> Result<InventoryDocument> {
    let doc = InventoryDocument::load(path)
        .with_context(|| format!("load inventory {}", path.display()))?;
    info!(
        path = %path.display(),
        nodes = doc.node_count(),
        schema = doc.schema_version().unwrap_or("-"),
        "opened inventory"
    );
    Ok(doc)
}

/// Resolve a node path; an empty path is the inventory itself.
pub fn resolve(doc: &InventoryDocument, path: &str) -> Result<NodeId> {
    if path.trim_matches('/').is_empty() {
        return Ok(doc.root());
    }
    doc.find(path).with_context(|| format!("find node {path:?}"))
}

#[derive(Debug, Serialize)]
pub struct FieldEntry {
    pub name: String,
    pub value: String,
    pub kind: String,
    pub access: String,
    pub known: bool,
}

impl From<Field> for FieldEntry {
    fn from(field: Field) -> Self {
        Self {
            name: field.name,
            value: field.value,
            kind: field.kind.to_string(),
            access: format!("{:?}", field.access).to_ascii_lowercase(),
            known: field.known,
        }
    }
}

pub fn print_fields(fields: Vec<Field>, json: bool) -> Result<()> {
    let entries: Vec<FieldEntry> = fields.into_iter().map(FieldEntry::from).collect();
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No fields.");
        return Ok(());
    }
    println!("{:<24} {:<12} {:<10} {}", "FIELD", "KIND", "ACCESS", "VALUE");
    for entry in &entries {
        let name = if entry.known {
            entry.name.clone()
        } else {
            format!("{}*", entry.name)
        };
        println!(
            "{name:<24} {:<12} {:<10} {}",
            entry.kind, entry.access, entry.value
        );
    }
    Ok(())
}

/// Canonical text of an accepted value.
pub fn describe_value(value: &FieldValue) -> Result<String> {
    Ok(match value {
        FieldValue::Float(value) => value.to_string(),
        FieldValue::Integer(value) => value.to_string(),
        FieldValue::Bool(value) => value.to_string(),
        FieldValue::Time(value) => value.format(&Rfc3339).context("format timestamp")?,
        FieldValue::Date(value) => value.to_string(),
        FieldValue::Text(value) => value.clone(),
        FieldValue::Rate {
            numerator,
            denominator,
        } => format!("{numerator}/{denominator}"),
    })
}
