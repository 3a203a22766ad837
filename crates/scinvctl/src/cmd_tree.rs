use std::path::Path;

use anyhow::Result;
use scinv::core::{InventoryDocument, NodeId};
use serde::Serialize;

use crate::common;

#[derive(Debug, Serialize)]
struct TreeEntry {
    path: String,
    label: String,
    kind: String,
    children: Vec<TreeEntry>,
}

fn entry(doc: &InventoryDocument, node: NodeId) -> Result<TreeEntry> {
    let children = doc
        .children(node)?
        .into_iter()
        .map(|child| entry(doc, child))
        .collect::<Result<Vec<_>>>()?;
    Ok(TreeEntry {
        path: doc.path(node)?,
        label: doc.label(node)?,
        kind: doc.kind(node)?.to_string(),
        children,
    })
}

fn render(entry: &TreeEntry, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&entry.label);
    out.push('\n');
    for child in &entry.children {
        render(child, depth + 1, out);
    }
}

pub fn run(file: &Path, path: &str, json: bool) -> Result<()> {
    let doc = common::open_document(file)?;
    let node = common::resolve(&doc, path)?;
    print_tree(&doc, node, json)
}

/// Print the subtree below `node`.
pub fn print_tree(doc: &InventoryDocument, node: NodeId, json: bool) -> Result<()> {
    let tree = entry(doc, node)?;
    if json {
        return common::print_json(&tree);
    }
    let mut out = String::new();
    render(&tree, 0, &mut out);
    print!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"<seiscomp xmlns="http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/0.12">
  <Inventory>
    <network publicID="Network/GE" code="GE">
      <station publicID="Station/GE/APE" code="APE">
        <sensorLocation publicID="SensorLocation/GE/APE/" code="">
          <stream code="BHZ"/>
        </sensorLocation>
      </station>
    </network>
  </Inventory>
</seiscomp>"#;

    #[test]
    fn renders_nested_labels() {
        let doc = InventoryDocument::parse(SMALL).expect("parse");
        let tree = entry(&doc, doc.root()).expect("tree");
        let mut out = String::new();
        render(&tree, 0, &mut out);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Inventory");
        assert_eq!(lines[1], "  Network: GE");
        assert_eq!(lines[2], "    Station: APE");
        assert!(lines[4].starts_with("        Stream: BHZ"));
        assert_eq!(tree.children[0].children[0].path, "network=GE/station=APE");
    }
}
