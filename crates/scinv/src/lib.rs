#![cfg_attr(docsrs, feature(doc_cfg))]
//! SeisComP inventory editing facade: re-exports the document model and the
//! XML layer, and adds persistence, autosave and the editing session.
//!
//! ```rust,no_run
//! use scinv::{core::InventoryDocument, persist::PersistenceManager, BackupPolicy};
//!
//! # fn run() -> Result<(), scinv::SessionError> {
//! let mut doc = InventoryDocument::load("inventory.xml")?;
//! let stream = doc.find("network=GE/station=APE/sensorLocation=/stream=BHZ")?;
//! doc.set_attribute(stream, "sampleRate", "40")?;
//!
//! let mut persistence = PersistenceManager::local(BackupPolicy::Suffix);
//! let report = persistence.save(&mut doc, "inventory.xml".as_ref())?;
//! println!("wrote {} bytes, backup {:?}", report.bytes, report.backup);
//! # Ok(())
//! # }
//! ```

pub use scinv_core as core;
pub use scinv_xml as xml;

pub mod autosave;
pub mod persist;
pub mod session;

use thiserror::Error;

pub use autosave::AutosaveTimer;
pub use persist::{BackupPolicy, FileStore, LocalFs, PersistError, PersistenceManager, SaveReport};
pub use scinv_core::{FieldEdit, InventoryDocument, InventoryError, NodeId, NodeKind};
pub use session::{
    EditorSession, SessionCommand, SessionConfig, SessionEvent, SessionHandle, SessionState,
};

/// Error type produced by the editing session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Loading, reading or editing the document failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// Writing the document failed; the edits are kept.
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("no document is loaded")]
    NoDocument,
    /// The session task is gone.
    #[error("session stopped")]
    Stopped,
}
