//! Durable, ordered changelist of staged mutations.
//!
//! One JSON file per entry under `{base}/tuf/{gun}/changelist/`, named by a
//! zero-padded monotonic sequence number. Entries are written to a temp
//! sibling and renamed into place, so a crash mid-append never leaves a
//! torn entry visible to iteration. A successful publish drains the log;
//! an exclusive lock on the directory keeps concurrent publishers out.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const ENTRY_FILE_EXT: &str = "change";
const LOCK_FILE_NAME: &str = ".lock";

/// What a changelist entry does to its keyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Insert the record, overwriting any existing one.
    Create,
    /// Same effect as [`ChangeAction::Create`].
    Update,
    /// Remove the record; removing a missing record is not an error.
    Delete,
}

/// A staged mutation, durable until the next successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// What to do with the record.
    pub action: ChangeAction,
    /// The role the mutation applies to (see [`Change::SCOPE_TARGETS`]).
    pub scope: String,
    /// The kind of record (see [`Change::TYPE_TARGET`]).
    pub content_type: String,
    /// The record's key, e.g. a target name.
    pub name: String,
    /// Base64 of the record payload; empty for deletions.
    payload: String,
}

impl Change {
    /// Scope tag for mutations of the targets role.
    pub const SCOPE_TARGETS: &'static str = "targets";
    /// Content tag for target records.
    pub const TYPE_TARGET: &'static str = "target";

    /// Stage a create (or overwrite) carrying `payload`.
    pub fn create(scope: &str, content_type: &str, name: &str, payload: &[u8]) -> Self {
        Self {
            action: ChangeAction::Create,
            scope: scope.to_owned(),
            content_type: content_type.to_owned(),
            name: name.to_owned(),
            payload: base64::engine::general_purpose::STANDARD.encode(payload),
        }
    }

    /// Stage a deletion.
    pub fn delete(scope: &str, content_type: &str, name: &str) -> Self {
        Self {
            action: ChangeAction::Delete,
            scope: scope.to_owned(),
            content_type: content_type.to_owned(),
            name: name.to_owned(),
            payload: String::new(),
        }
    }

    /// Decode the record payload.
    pub fn payload(&self) -> Result<Vec<u8>, ClientError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|e| ClientError::Changelist(format!("corrupt payload for `{}`: {e}", self.name)))
    }
}

/// The on-disk changelist for one collection.
pub struct Changelist {
    dir: PathBuf,
    next_seq: u64,
}

impl Changelist {
    /// Open (creating if needed) the changelist at `dir`.
    pub fn open(dir: &Path) -> Result<Self, ClientError> {
        fs::create_dir_all(dir)?;
        let next_seq = entry_paths(dir)?
            .last()
            .and_then(|p| p.file_stem()?.to_str()?.parse::<u64>().ok())
            .map_or(0, |seq| seq + 1);
        Ok(Self {
            dir: dir.to_owned(),
            next_seq,
        })
    }

    /// Durably append an entry. Returns once the entry is on disk.
    pub fn add(&mut self, change: &Change) -> Result<(), ClientError> {
        let name = format!("{:020}.{ENTRY_FILE_EXT}", self.next_seq);
        let tmp = self.dir.join(format!("{:020}.tmp", self.next_seq));
        let data = serde_json::to_vec_pretty(change)?;

        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, self.dir.join(&name))?;

        tracing::debug!(entry = %name, action = ?change.action, key = %change.name, "staged change");
        self.next_seq += 1;
        Ok(())
    }

    /// All entries, in insertion order.
    pub fn list(&self) -> Result<Vec<Change>, ClientError> {
        let mut changes = Vec::new();
        for path in entry_paths(&self.dir)? {
            let data = fs::read(&path)?;
            let change = serde_json::from_slice(&data).map_err(|e| {
                ClientError::Changelist(format!(
                    "corrupt changelist entry {}: {e}",
                    path.display()
                ))
            })?;
            changes.push(change);
        }
        Ok(changes)
    }

    /// Whether the changelist has no entries.
    pub fn is_empty(&self) -> Result<bool, ClientError> {
        Ok(entry_paths(&self.dir)?.is_empty())
    }

    /// Drain every entry. Called only after a fully successful publish.
    pub fn clear(&mut self) -> Result<(), ClientError> {
        for path in entry_paths(&self.dir)? {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Entry files in sequence order. Temp files and the lock file never match
/// the entry extension, so torn appends are invisible here.
fn entry_paths(dir: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == ENTRY_FILE_EXT))
        .collect();
    paths.sort_unstable();
    Ok(paths)
}

/// Exclusive lock over a changelist directory, held for the duration of a
/// publish. Released on drop.
#[derive(Debug)]
pub struct ChangelistLock {
    file: File,
}

impl ChangelistLock {
    /// Acquire the lock, failing immediately if another publisher holds it.
    pub fn acquire(dir: &Path) -> Result<Self, ClientError> {
        fs::create_dir_all(dir)?;
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE_NAME))?;
        match file.try_lock() {
            Ok(()) => Ok(Self { file }),
            Err(fs::TryLockError::WouldBlock) => Err(ClientError::Changelist(
                "another publish holds the changelist lock".to_owned(),
            )),
            Err(fs::TryLockError::Error(e)) => Err(ClientError::Io(e)),
        }
    }
}

impl Drop for ChangelistLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
