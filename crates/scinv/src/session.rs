//! Editing session: owns the loaded document, the current selection and the
//! autosave timer, and serialises every change through one dispatcher.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), scinv::SessionError> {
//! use scinv::{EditorSession, SessionConfig};
//!
//! let (session, _task) = EditorSession::spawn(SessionConfig::default());
//! session.load("inventory.xml").await?;
//! let doc = session.snapshot().await?.expect("loaded");
//! let station = doc.find("network=GE/station=APE")?;
//! session.edit(station, "latitude", "37.07").await?;
//! session.save(None).await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use scinv_core::{FieldEdit, InventoryDocument, NodeId};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autosave::AutosaveTimer;
use crate::persist::{BackupPolicy, FileStore, LocalFs, PersistenceManager, SaveReport};
use crate::SessionError;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 64;

/// Session settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period after the last edit before an automatic save; `None`
    /// turns autosave off.
    pub autosave_delay_ms: Option<u64>,
    pub backup: BackupPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_delay_ms: Some(1000),
            backup: BackupPolicy::Suffix,
        }
    }
}

impl SessionConfig {
    pub fn autosave_delay(&self) -> Option<Duration> {
        self.autosave_delay_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Unloaded,
    Clean,
    Dirty,
}

/// Notifications for observers such as a GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Loaded { path: PathBuf, generation: u64 },
    StateChanged(SessionState),
    Edited(FieldEdit),
    Selected(Option<NodeId>),
    Saved { report: SaveReport, autosave: bool },
    SaveFailed {
        path: PathBuf,
        message: String,
        autosave: bool,
    },
    Closed,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests handled by [`EditorSession::run`].
#[derive(Debug)]
pub enum SessionCommand {
    Load {
        path: PathBuf,
        reply: Reply<u64>,
    },
    Edit {
        node: NodeId,
        field: String,
        value: String,
        reply: Reply<FieldEdit>,
    },
    Clear {
        node: NodeId,
        field: String,
        reply: Reply<FieldEdit>,
    },
    Select {
        node: Option<NodeId>,
        reply: Reply<()>,
    },
    /// Save to the loaded path, or to `target` which then becomes the path.
    Save {
        target: Option<PathBuf>,
        reply: Reply<SaveReport>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<InventoryDocument>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Selection {
        reply: oneshot::Sender<Option<NodeId>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Owner of the loaded document.
///
/// Use the methods directly from synchronous code, or hand the session to
/// [`EditorSession::run`] and talk to it through a [`SessionHandle`].
#[derive(Debug)]
pub struct EditorSession {
    config: SessionConfig,
    persistence: PersistenceManager,
    document: Option<InventoryDocument>,
    path: Option<PathBuf>,
    selection: Option<NodeId>,
    timer: AutosaveTimer,
    state: SessionState,
    events: broadcast::Sender<SessionEvent>,
}

impl EditorSession {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_store(config, LocalFs)
    }

    pub fn with_store(
        config: SessionConfig,
        store: impl FileStore + Send + Sync + 'static,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            persistence: PersistenceManager::new(store, config.backup),
            timer: AutosaveTimer::new(config.autosave_delay().unwrap_or_default()),
            config,
            document: None,
            path: None,
            selection: None,
            state: SessionState::Unloaded,
            events,
        }
    }

    /// Run a session with the local filesystem on its own task.
    pub fn spawn(config: SessionConfig) -> (SessionHandle, JoinHandle<()>) {
        Self::new(config).into_task()
    }

    /// Move the session onto a tokio task and return a handle to it.
    pub fn into_task(self) -> (SessionHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let handle = SessionHandle {
            commands,
            events: self.events.clone(),
        };
        (handle, tokio::spawn(self.run(receiver)))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> Option<&InventoryDocument> {
        self.document.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    pub fn autosave_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    /// Replace the current document with the one at `path`. On failure the
    /// previous document and state are kept.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<u64, SessionError> {
        let path = path.as_ref();
        let document = InventoryDocument::load(path)?;
        if self.document.as_ref().is_some_and(InventoryDocument::is_dirty) {
            warn!(path = ?self.path, "discarding unsaved edits");
        }
        self.timer.cancel();
        self.persistence.begin_session();
        let generation = document.generation();
        self.document = Some(document);
        self.path = Some(path.to_path_buf());
        if self.selection.take().is_some() {
            self.emit(SessionEvent::Selected(None));
        }
        self.emit(SessionEvent::Loaded {
            path: path.to_path_buf(),
            generation,
        });
        self.refresh_state();
        Ok(generation)
    }

    pub fn edit(
        &mut self,
        node: NodeId,
        field: &str,
        value: &str,
    ) -> Result<FieldEdit, SessionError> {
        let document = self.document.as_mut().ok_or(SessionError::NoDocument)?;
        let edit = document.set_attribute(node, field, value)?;
        self.after_edit(&edit);
        Ok(edit)
    }

    pub fn clear(&mut self, node: NodeId, field: &str) -> Result<FieldEdit, SessionError> {
        let document = self.document.as_mut().ok_or(SessionError::NoDocument)?;
        let edit = document.clear_attribute(node, field)?;
        self.after_edit(&edit);
        Ok(edit)
    }

    /// Select a node, or clear the selection with `None`.
    pub fn select(&mut self, node: Option<NodeId>) -> Result<(), SessionError> {
        if let Some(node) = node {
            let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
            document.kind(node)?;
        }
        if self.selection != node {
            self.selection = node;
            self.emit(SessionEvent::Selected(node));
        }
        Ok(())
    }

    /// Save now. Cancels any pending autosave.
    pub fn save(&mut self, target: Option<&Path>) -> Result<SaveReport, SessionError> {
        self.save_as(target, false)
    }

    /// Drop the document without saving.
    pub fn close(&mut self) {
        if self.document.as_ref().is_some_and(InventoryDocument::is_dirty) {
            warn!(path = ?self.path, "closing with unsaved edits");
        }
        self.timer.cancel();
        self.document = None;
        self.path = None;
        self.selection = None;
        self.emit(SessionEvent::Closed);
        self.refresh_state();
    }

    /// Dispatch commands and autosave deadlines until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = self.timer.expired() => self.autosave(),
            }
        }
        if self.document.as_ref().is_some_and(InventoryDocument::is_dirty) {
            warn!(path = ?self.path, "session ended with unsaved edits");
        }
        debug!("session stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        // A requester that went away does not care about the reply.
        match command {
            SessionCommand::Load { path, reply } => {
                let _ = reply.send(self.load(&path));
            }
            SessionCommand::Edit {
                node,
                field,
                value,
                reply,
            } => {
                let _ = reply.send(self.edit(node, &field, &value));
            }
            SessionCommand::Clear { node, field, reply } => {
                let _ = reply.send(self.clear(node, &field));
            }
            SessionCommand::Select { node, reply } => {
                let _ = reply.send(self.select(node));
            }
            SessionCommand::Save { target, reply } => {
                let _ = reply.send(self.save(target.as_deref()));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.document.clone());
            }
            SessionCommand::State { reply } => {
                let _ = reply.send(self.state);
            }
            SessionCommand::Selection { reply } => {
                let _ = reply.send(self.selection);
            }
            SessionCommand::Close { reply } => {
                self.close();
                let _ = reply.send(());
            }
        }
    }

    fn autosave(&mut self) {
        self.timer.cancel();
        if !self.document.as_ref().is_some_and(InventoryDocument::is_dirty) {
            return;
        }
        // Failures are reported once; the next edit arms the timer again.
        if let Err(err) = self.save_as(None, true) {
            warn!(error = %err, "autosave failed");
        }
    }

    fn save_as(
        &mut self,
        target: Option<&Path>,
        autosave: bool,
    ) -> Result<SaveReport, SessionError> {
        self.timer.cancel();
        let document = self.document.as_mut().ok_or(SessionError::NoDocument)?;
        let path = match target {
            Some(target) => target.to_path_buf(),
            None => self.path.clone().ok_or(SessionError::NoDocument)?,
        };
        match self.persistence.save(document, &path) {
            Ok(report) => {
                if target.is_some() {
                    self.path = Some(path);
                }
                self.emit(SessionEvent::Saved {
                    report: report.clone(),
                    autosave,
                });
                self.refresh_state();
                Ok(report)
            }
            Err(err) => {
                self.emit(SessionEvent::SaveFailed {
                    path,
                    message: err.to_string(),
                    autosave,
                });
                Err(err.into())
            }
        }
    }

    fn after_edit(&mut self, edit: &FieldEdit) {
        if !edit.is_change() {
            return;
        }
        if self.config.autosave_delay_ms.is_some() {
            self.timer.arm();
        }
        self.emit(SessionEvent::Edited(edit.clone()));
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        let state = match &self.document {
            None => SessionState::Unloaded,
            Some(document) if document.is_dirty() => SessionState::Dirty,
            Some(_) => SessionState::Clean,
        };
        if state != self.state {
            info!(from = ?self.state, to = ?state, "session state changed");
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cloneable client for a session running on a task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn load(&self, path: impl Into<PathBuf>) -> Result<u64, SessionError> {
        let path = path.into();
        self.request(|reply| SessionCommand::Load { path, reply })
            .await?
    }

    pub async fn edit(
        &self,
        node: NodeId,
        field: &str,
        value: &str,
    ) -> Result<FieldEdit, SessionError> {
        let (field, value) = (field.to_string(), value.to_string());
        self.request(|reply| SessionCommand::Edit {
            node,
            field,
            value,
            reply,
        })
        .await?
    }

    pub async fn clear(&self, node: NodeId, field: &str) -> Result<FieldEdit, SessionError> {
        let field = field.to_string();
        self.request(|reply| SessionCommand::Clear { node, field, reply })
            .await?
    }

    pub async fn select(&self, node: Option<NodeId>) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Select { node, reply })
            .await?
    }

    pub async fn save(&self, target: Option<PathBuf>) -> Result<SaveReport, SessionError> {
        self.request(|reply| SessionCommand::Save { target, reply })
            .await?
    }

    /// Copy of the current document for read-only inspection.
    pub async fn snapshot(&self) -> Result<Option<InventoryDocument>, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionCommand::State { reply }).await
    }

    /// Currently selected node; cleared whenever a document is loaded.
    pub async fn selection(&self) -> Result<Option<NodeId>, SessionError> {
        self.request(|reply| SessionCommand::Selection { reply }).await
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Close { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = SessionConfig::default();
        assert_eq!(config.autosave_delay(), Some(Duration::from_secs(1)));
        assert_eq!(config.backup, BackupPolicy::Suffix);

        let parsed: SessionConfig =
            serde_json::from_str(r#"{"backup": "timestamped"}"#).expect("parse config");
        assert_eq!(parsed.autosave_delay_ms, Some(1000));
        assert_eq!(parsed.backup, BackupPolicy::Timestamped);

        let disabled: SessionConfig =
            serde_json::from_str(r#"{"autosave_delay_ms": null}"#).expect("parse config");
        assert_eq!(disabled.autosave_delay(), None);
    }

    #[test]
    fn edits_without_a_document_are_refused() {
        let mut session = EditorSession::new(SessionConfig::default());
        assert_eq!(session.state(), SessionState::Unloaded);
        assert!(matches!(session.save(None), Err(SessionError::NoDocument)));
        assert!(matches!(
            session.load("/nonexistent/inventory.xml"),
            Err(SessionError::Inventory(_))
        ));
        assert_eq!(session.state(), SessionState::Unloaded);
    }
}
