use std::path::Path;

use anyhow::{Context, Result};

use crate::common;

pub fn run(file: &Path, path: &str, json: bool) -> Result<()> {
    let doc = common::open_document(file)?;
    let node = common::resolve(&doc, path)?;
    let fields = doc
        .fields(node)
        .with_context(|| format!("read fields of {path:?}"))?;
    if !json {
        println!("{}", doc.label(node)?);
    }
    common::print_fields(fields, json)
}
