//! Line-oriented editing session on stdin.
//!
//! Commands go through a [`SessionHandle`], so edits, saves and the autosave
//! timer behave exactly as they would behind a GUI.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use scinv::core::{InventoryDocument, NodeId};
use scinv::{EditorSession, SessionConfig, SessionEvent, SessionHandle, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{cmd_tree, common};

const HELP: &str = "\
commands:
  tree [PATH]            print the node tree
  ls [PATH]              list child nodes
  select PATH            select a node (empty path selects the inventory)
  show [PATH]            print the fields of a node, default the selection
  set FIELD VALUE        change a field of the selection (\"\" for empty)
  clear FIELD            remove an optional field of the selection
  save [FILE]            save now, or save as FILE
  load FILE              load another inventory, dropping unsaved edits
  state                  print the session state
  quit                   save pending edits and leave
  quit!                  leave without saving";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Tree(Option<String>),
    Ls(Option<String>),
    Select(String),
    Show(Option<String>),
    Set { field: String, value: String },
    Clear(String),
    Save(Option<PathBuf>),
    Load(PathBuf),
    State,
    Quit { save: bool },
}

impl ShellCommand {
    /// Parse one input line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let optional = |rest: &str| (!rest.is_empty()).then(|| rest.to_string());
        let command = match word {
            "help" | "?" => ShellCommand::Help,
            "tree" => ShellCommand::Tree(optional(rest)),
            "ls" => ShellCommand::Ls(optional(rest)),
            "select" | "cd" => ShellCommand::Select(rest.to_string()),
            "show" => ShellCommand::Show(optional(rest)),
            "set" => {
                let (field, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: set FIELD VALUE"))?;
                let value = match value.trim() {
                    "\"\"" => "",
                    value => value,
                };
                ShellCommand::Set {
                    field: field.to_string(),
                    value: value.to_string(),
                }
            }
            "clear" if !rest.is_empty() => ShellCommand::Clear(rest.to_string()),
            "clear" => bail!("usage: clear FIELD"),
            "save" => ShellCommand::Save(optional(rest).map(PathBuf::from)),
            "load" if !rest.is_empty() => ShellCommand::Load(PathBuf::from(rest)),
            "load" => bail!("usage: load FILE"),
            "state" => ShellCommand::State,
            "quit" | "exit" => ShellCommand::Quit { save: true },
            "quit!" => ShellCommand::Quit { save: false },
            other => bail!("unknown command {other:?}, try help"),
        };
        Ok(Some(command))
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Drives one session from commands.
struct Shell {
    session: SessionHandle,
    json: bool,
}

impl Shell {
    async fn document(&self) -> Result<InventoryDocument> {
        self.session
            .snapshot()
            .await?
            .ok_or_else(|| anyhow!("no inventory loaded"))
    }

    async fn target(&self, doc: &InventoryDocument, path: Option<&str>) -> Result<NodeId> {
        if let Some(path) = path {
            return common::resolve(doc, path);
        }
        Ok(self.session.selection().await?.unwrap_or_else(|| doc.root()))
    }

    async fn selection(&self) -> Result<NodeId> {
        self.session
            .selection()
            .await?
            .ok_or_else(|| anyhow!("select a node first"))
    }

    async fn execute(&mut self, command: ShellCommand) -> Result<Flow> {
        debug!(?command, "shell command");
        match command {
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Tree(path) => {
                let doc = self.document().await?;
                let node = match path {
                    Some(path) => common::resolve(&doc, &path)?,
                    None => doc.root(),
                };
                cmd_tree::print_tree(&doc, node, self.json)?;
            }
            ShellCommand::Ls(path) => {
                let doc = self.document().await?;
                let node = self.target(&doc, path.as_deref()).await?;
                for child in doc.children(node)? {
                    println!("{:<24} {}", doc.label(child)?, doc.path(child)?);
                }
            }
            ShellCommand::Select(path) => {
                let doc = self.document().await?;
                let node = common::resolve(&doc, &path)?;
                self.session.select(Some(node)).await?;
                println!("{}", doc.label(node)?);
            }
            ShellCommand::Show(path) => {
                let doc = self.document().await?;
                let node = self.target(&doc, path.as_deref()).await?;
                common::print_fields(doc.fields(node)?, self.json)?;
            }
            ShellCommand::Set { field, value } => {
                let edit = self.session.edit(self.selection().await?, &field, &value).await?;
                println!("{edit}");
            }
            ShellCommand::Clear(field) => {
                let edit = self.session.clear(self.selection().await?, &field).await?;
                println!("{edit}");
            }
            ShellCommand::Save(target) => {
                let report = self.session.save(target).await?;
                if self.json {
                    common::print_json(&report)?;
                }
            }
            ShellCommand::Load(path) => {
                self.session
                    .load(&path)
                    .await
                    .with_context(|| format!("load {}", path.display()))?;
            }
            ShellCommand::State => {
                let state = self.session.state().await?;
                if self.json {
                    common::print_json(&state)?;
                } else {
                    println!("{state:?}");
                }
            }
            ShellCommand::Quit { save } => {
                if save {
                    self.flush().await?;
                }
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Save if there are unsaved edits.
    async fn flush(&self) -> Result<()> {
        if self.session.state().await? == SessionState::Dirty {
            self.session.save(None).await.context("save pending edits")?;
        }
        Ok(())
    }
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Saved { report, autosave } => {
            let how = if *autosave { "autosaved" } else { "saved" };
            eprintln!("{how} {} ({} bytes)", report.path.display(), report.bytes);
            if let Some(backup) = &report.backup {
                eprintln!("backup at {}", backup.display());
            }
        }
        SessionEvent::SaveFailed {
            path,
            message,
            autosave,
        } => {
            let what = if *autosave { "autosave" } else { "save" };
            eprintln!("{what} of {} failed: {message}", path.display());
        }
        SessionEvent::Loaded { path, .. } => eprintln!("loaded {}", path.display()),
        SessionEvent::StateChanged(state) => debug!(?state, "state changed"),
        _ => {}
    }
}

pub async fn run(file: PathBuf, config: SessionConfig, json: bool) -> Result<()> {
    let (session, task) = EditorSession::spawn(config);
    let mut events = session.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    session
        .load(&file)
        .await
        .with_context(|| format!("load inventory {}", file.display()))?;

    let mut shell = Shell { session, json };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    while let Some(line) = lines.next_line().await.context("read command")? {
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };
        match shell.execute(command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                quit = true;
                break;
            }
            Err(err) => eprintln!("error: {err:#}"),
        }
    }
    if !quit {
        shell.flush().await?;
    }

    // Dropping the last handle stops the session task, which closes the
    // event channel and ends the reporter.
    drop(shell);
    task.await.context("session task")?;
    reporter.await.context("event reporter")?;
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
        <description>Apirathos</description>
        <latitude>37.0689</latitude>
      </station>
    </network>
  </Inventory>
</seiscomp>
"#;

    #[test]
    fn parse_commands() {
        assert_eq!(ShellCommand::parse("  ").expect("blank"), None);
        assert_eq!(ShellCommand::parse("# note").expect("comment"), None);
        assert_eq!(
            ShellCommand::parse("set description GEOFON Station Apirathos").expect("set"),
            Some(ShellCommand::Set {
                field: "description".into(),
                value: "GEOFON Station Apirathos".into(),
            })
        );
        assert_eq!(
            ShellCommand::parse("set description \"\"").expect("empty value"),
            Some(ShellCommand::Set {
                field: "description".into(),
                value: String::new(),
            })
        );
        assert_eq!(
            ShellCommand::parse("save out.xml").expect("save as"),
            Some(ShellCommand::Save(Some(PathBuf::from("out.xml"))))
        );
        assert_eq!(
            ShellCommand::parse("select").expect("select root"),
            Some(ShellCommand::Select(String::new()))
        );
        assert_eq!(
            ShellCommand::parse("quit!").expect("quit"),
            Some(ShellCommand::Quit { save: false })
        );
        assert!(ShellCommand::parse("set latitude").is_err());
        assert!(ShellCommand::parse("clear").is_err());
        assert!(ShellCommand::parse("frobnicate").is_err());
    }

    #[tokio::test]
    async fn select_set_and_quit_saves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("inventory.xml");
        fs::write(&file, SMALL).expect("seed");
        let config = SessionConfig {
            autosave_delay_ms: None,
            ..SessionConfig::default()
        };
        let (session, _task) = EditorSession::spawn(config);
        session.load(&file).await.expect("load");
        let mut shell = Shell {
            session,
            json: true,
        };

        let set = ShellCommand::Set {
            field: "latitude".into(),
            value: "45.0".into(),
        };
        assert!(shell.execute(set.clone()).await.is_err(), "nothing selected");

        shell
            .execute(ShellCommand::Select("network=GE/station=APE".into()))
            .await
            .expect("select");
        shell.execute(set).await.expect("set");
        let bad = ShellCommand::Set {
            field: "latitude".into(),
            value: "91".into(),
        };
        assert!(shell.execute(bad).await.is_err());
        assert_eq!(
            shell.session.state().await.expect("state"),
            SessionState::Dirty
        );

        let station = shell.session.selection().await.expect("selection");
        assert!(station.is_some());

        let flow = shell
            .execute(ShellCommand::Quit { save: true })
            .await
            .expect("quit");
        assert!(matches!(flow, Flow::Quit));
        let written = fs::read_to_string(&file).expect("read");
        assert_eq!(written, SMALL.replace("37.0689", "45.0"));

        // Loading through the shell drops the selection held by the session.
        shell
            .execute(ShellCommand::Load(file.clone()))
            .await
            .expect("load");
        assert_eq!(shell.session.selection().await.expect("selection"), None);
        let set = ShellCommand::Set {
            field: "latitude".into(),
            value: "46.0".into(),
        };
        assert!(shell.execute(set).await.is_err(), "selection was cleared");
    }
}
