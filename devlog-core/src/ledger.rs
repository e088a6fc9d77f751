//! Persisted set of commit ids that were published successfully.
//!
//! The file is a JSON array of full commit SHAs. It is rewritten after every
//! newly confirmed publish, never batched, so a crash loses at most the event
//! that was in flight. Entries are only ever added.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StateError;

#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl ProcessedLedger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let ids = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeSet::new(),
            Ok(raw) => {
                let ids: Vec<String> =
                    serde_json::from_str(&raw).map_err(|source| StateError::Json {
                        path: path.clone(),
                        source,
                    })?;
                ids.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(StateError::io(&path, e)),
        };
        info!(path = %path.display(), entries = ids.len(), "Loaded processed ledger");
        Ok(Self { path, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Adds `id` and persists the ledger immediately.
    ///
    /// Returns `Ok(false)` without touching the file when `id` was already present.
    /// On a write failure the in-memory entry is rolled back.
    pub fn record(&mut self, id: &str) -> Result<bool, StateError> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.persist() {
            self.ids.remove(id);
            return Err(e);
        }
        debug!(id, entries = self.ids.len(), "Recorded processed id");
        Ok(true)
    }

    fn persist(&self) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(&self.ids).map_err(|source| StateError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json)
    }
}

/// Writes `bytes` to a temp file next to `path`, then renames it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StateError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}
