use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scinv::{PersistenceManager, SaveReport, SessionConfig};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct SetResponse<'a> {
    path: &'a str,
    field: &'a str,
    old: Option<String>,
    new: Option<String>,
    saved: Option<SaveReport>,
}

pub struct SetArgs {
    pub file: PathBuf,
    pub path: String,
    pub field: String,
    /// `None` removes the field.
    pub value: Option<String>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

pub fn run(args: SetArgs, config: &SessionConfig, json: bool) -> Result<()> {
    let mut doc = common::open_document(&args.file)?;
    let node = common::resolve(&doc, &args.path)?;
    let edit = match &args.value {
        Some(value) => doc.set_attribute(node, &args.field, value),
        None => doc.clear_attribute(node, &args.field),
    }
    .with_context(|| format!("update {} of {:?}", args.field, args.path))?;

    let target: &Path = args.output.as_deref().unwrap_or(&args.file);
    let saved = if args.dry_run || (!edit.is_change() && args.output.is_none()) {
        None
    } else {
        let mut persistence = PersistenceManager::local(config.backup);
        let report = persistence
            .save(&mut doc, target)
            .with_context(|| format!("save {}", target.display()))?;
        Some(report)
    };
    info!(edit = %edit, saved = saved.is_some(), "set field");

    if json {
        let payload = SetResponse {
            path: &args.path,
            field: &args.field,
            old: edit.old,
            new: edit.new,
            saved,
        };
        return common::print_json(&payload);
    }

    println!("{edit}");
    match saved {
        Some(report) => {
            println!("wrote {} bytes to {}", report.bytes, report.path.display());
            if let Some(backup) = report.backup {
                println!("backup at {}", backup.display());
            }
        }
        None if args.dry_run => println!("dry run, nothing written"),
        None => println!("unchanged, nothing written"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SMALL: &str = r#"<seiscomp xmlns="http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/0.12">
  <Inventory>
    <network publicID="Network/GE" code="GE">
      <station publicID="Station/GE/APE" code="APE">
        <latitude>37.0689</latitude>
      </station>
    </network>
  </Inventory>
</seiscomp>
"#;

    fn args(file: PathBuf, value: &str) -> SetArgs {
        SetArgs {
            file,
            path: "network=GE/station=APE".into(),
            field: "latitude".into(),
            value: Some(value.into()),
            output: None,
            dry_run: false,
        }
    }

    #[test]
    fn set_writes_the_file_and_a_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("inventory.xml");
        fs::write(&file, SMALL).expect("seed");
        run(args(file.clone(), "45.0"), &SessionConfig::default(), true).expect("set");
        let written = fs::read_to_string(&file).expect("read");
        assert_eq!(written, SMALL.replace("37.0689", "45.0"));
        assert_eq!(
            fs::read_to_string(dir.path().join("inventory.xml.bak")).expect("backup"),
            SMALL
        );
    }

    #[test]
    fn rejected_value_leaves_the_file_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("inventory.xml");
        fs::write(&file, SMALL).expect("seed");
        let err = run(args(file.clone(), "91"), &SessionConfig::default(), true)
            .expect_err("out of range");
        assert!(format!("{err:#}").contains("91"));
        assert_eq!(fs::read_to_string(&file).expect("read"), SMALL);
        assert!(!dir.path().join("inventory.xml.bak").exists());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("inventory.xml");
        fs::write(&file, SMALL).expect("seed");
        let mut set = args(file.clone(), "45.0");
        set.dry_run = true;
        run(set, &SessionConfig::default(), true).expect("dry run");
        assert_eq!(fs::read_to_string(&file).expect("read"), SMALL);
    }
}
