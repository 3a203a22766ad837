//! Saving documents to disk.
//!
//! A save takes a lock next to the target, copies the current file to a
//! backup the first time the target is written in a session, then stages the
//! new content in the target directory and renames it into place. The target
//! is never left half written.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use scinv_core::InventoryDocument;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(
        "{} is locked by another save; remove {} if no save is running",
        .target.display(),
        .lock.display()
    )]
    Locked { target: PathBuf, lock: PathBuf },
    #[error("failed to create lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to back up to {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filesystem operations used by [`PersistenceManager`].
pub trait FileStore {
    fn exists(&self, path: &Path) -> bool;
    /// Create `path`, failing with `AlreadyExists` if it is already there.
    fn create_exclusive(&self, path: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    /// Replace `path` with `contents` so readers see either the old or the
    /// new bytes.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// [`FileStore`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileStore for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_exclusive(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(contents)?;
        staged.as_file().sync_all()?;
        if let Ok(metadata) = fs::metadata(path) {
            staged.as_file().set_permissions(metadata.permissions())?;
        }
        staged.persist(path).map_err(|err| err.error)?;
        debug!(path = %path.display(), bytes = contents.len(), "replaced file");
        Ok(())
    }
}

/// Where the pre-save copy of a target goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupPolicy {
    /// `<target>.bak`
    #[default]
    Suffix,
    /// `<target>.<UTC timestamp>.bak`
    Timestamped,
}

impl BackupPolicy {
    pub fn backup_path(&self, target: &Path, now: OffsetDateTime) -> PathBuf {
        match self {
            BackupPolicy::Suffix => with_suffix(target, ".bak"),
            BackupPolicy::Timestamped => {
                let stamp = now
                    .to_offset(time::UtcOffset::UTC)
                    .format(format_description!(
                        "[year][month][day]T[hour][minute][second]Z"
                    ))
                    .unwrap_or_else(|_| now.unix_timestamp().to_string());
                with_suffix(target, &format!(".{stamp}.bak"))
            }
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn lock_path(target: &Path) -> PathBuf {
    with_suffix(target, ".lock")
}

/// Exclusive lock on a target, released when dropped.
pub struct PathLock<'a> {
    store: &'a dyn FileStore,
    path: PathBuf,
}

impl<'a> PathLock<'a> {
    pub fn acquire(store: &'a dyn FileStore, target: &Path) -> Result<Self, PersistError> {
        let path = lock_path(target);
        match store.create_exclusive(&path) {
            Ok(()) => Ok(Self { store, path }),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(PersistError::Locked {
                target: target.to_path_buf(),
                lock: path,
            }),
            Err(source) => Err(PersistError::Lock { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.store.remove(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub path: PathBuf,
    /// Backup taken by this save; `None` when the session already had one or
    /// the target did not exist.
    pub backup: Option<PathBuf>,
    pub bytes: usize,
    /// Document revision that reached disk.
    pub revision: u64,
}

/// Writes documents and remembers which targets were backed up this session.
pub struct PersistenceManager {
    store: Box<dyn FileStore + Send + Sync>,
    policy: BackupPolicy,
    backed_up: HashMap<PathBuf, PathBuf>,
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("policy", &self.policy)
            .field("backed_up", &self.backed_up)
            .finish_non_exhaustive()
    }
}

impl PersistenceManager {
    pub fn new(store: impl FileStore + Send + Sync + 'static, policy: BackupPolicy) -> Self {
        Self {
            store: Box::new(store),
            policy,
            backed_up: HashMap::new(),
        }
    }

    pub fn local(policy: BackupPolicy) -> Self {
        Self::new(LocalFs, policy)
    }

    pub fn policy(&self) -> BackupPolicy {
        self.policy
    }

    /// Start a new session: the next save of any target takes a fresh backup.
    pub fn begin_session(&mut self) {
        self.backed_up.clear();
    }

    /// Backup taken for `target` during this session.
    pub fn backup_for(&self, target: &Path) -> Option<&Path> {
        self.backed_up.get(target).map(PathBuf::as_path)
    }

    /// Serialise `document` to `target` and mark the written revision saved.
    pub fn save(
        &mut self,
        document: &mut InventoryDocument,
        target: &Path,
    ) -> Result<SaveReport, PersistError> {
        let revision = document.revision();
        let contents = document.serialize();
        let report = self.write(target, contents.as_bytes(), revision)?;
        document.mark_saved(revision);
        Ok(report)
    }

    fn write(
        &mut self,
        target: &Path,
        contents: &[u8],
        revision: u64,
    ) -> Result<SaveReport, PersistError> {
        let Self {
            store,
            policy,
            backed_up,
        } = self;
        let store: &dyn FileStore = &**store;
        let lock = PathLock::acquire(store, target)?;

        let backup = if backed_up.contains_key(target) || !store.exists(target) {
            None
        } else {
            let path = policy.backup_path(target, OffsetDateTime::now_utc());
            store
                .copy(target, &path)
                .map_err(|source| PersistError::Backup {
                    path: path.clone(),
                    source,
                })?;
            info!(target = %target.display(), backup = %path.display(), "backed up original");
            backed_up.insert(target.to_path_buf(), path.clone());
            Some(path)
        };

        store
            .write_atomic(target, contents)
            .map_err(|source| PersistError::Write {
                path: target.to_path_buf(),
                source,
            })?;
        drop(lock);

        info!(
            path = %target.display(),
            bytes = contents.len(),
            revision,
            "saved inventory"
        );
        Ok(SaveReport {
            path: target.to_path_buf(),
            backup,
            bytes: contents.len(),
            revision,
        })
    }
}
