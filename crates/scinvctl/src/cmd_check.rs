use std::path::Path;

use anyhow::{bail, Result};
use scinv::core::{InventoryDocument, NodeKind};
use scinv::xml::structurally_equal;
use serde::Serialize;
use tracing::{info, warn};

use crate::common;

#[derive(Debug, Serialize)]
struct KindCount {
    kind: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct Unresolved {
    stream: String,
    field: &'static str,
    reference: String,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    schema_version: Option<String>,
    nodes: Vec<KindCount>,
    unresolved: Vec<Unresolved>,
    /// Reparsing the serialised document gives the same tree.
    round_trip: bool,
    /// Serialising without edits reproduces the input bytes.
    byte_identical: bool,
}

impl CheckReport {
    fn is_ok(&self) -> bool {
        self.unresolved.is_empty() && self.round_trip
    }
}

fn check(doc: &InventoryDocument, original: &str) -> CheckReport {
    let nodes = NodeKind::ALL
        .iter()
        .map(|&kind| KindCount {
            kind: kind.to_string(),
            count: doc.nodes_of_kind(kind).len(),
        })
        .filter(|count| count.count > 0)
        .collect();
    let unresolved = doc
        .unresolved_bindings()
        .into_iter()
        .map(|binding| Unresolved {
            stream: binding.path,
            field: binding.field,
            reference: binding.reference,
        })
        .collect();
    let text = doc.serialize();
    let round_trip = match InventoryDocument::parse(&text) {
        Ok(reloaded) => structurally_equal(doc.xml().root(), reloaded.xml().root()),
        Err(err) => {
            warn!(error = %err, "serialised document does not parse");
            false
        }
    };
    CheckReport {
        schema_version: doc.schema_version().map(str::to_string),
        nodes,
        unresolved,
        round_trip,
        byte_identical: text == original,
    }
}

pub fn run(file: &Path, json: bool) -> Result<()> {
    let doc = common::open_document(file)?;
    let original = std::fs::read_to_string(file)?;
    let report = check(&doc, &original);
    info!(
        unresolved = report.unresolved.len(),
        round_trip = report.round_trip,
        "checked inventory"
    );

    if json {
        common::print_json(&report)?;
    } else {
        println!(
            "schema:         {}",
            report.schema_version.as_deref().unwrap_or("unknown")
        );
        for count in &report.nodes {
            println!("{:<16}{}", format!("{}:", count.kind), count.count);
        }
        println!("round trip:     {}", if report.round_trip { "ok" } else { "FAILED" });
        println!(
            "byte identical: {}",
            if report.byte_identical { "yes" } else { "no" }
        );
        for binding in &report.unresolved {
            println!(
                "unresolved:     {} {} -> {}",
                binding.stream, binding.field, binding.reference
            );
        }
    }

    if !report.is_ok() {
        bail!("{} has problems", file.display());
    }
    Ok(())
}
