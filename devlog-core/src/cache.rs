//! On-disk store of generated text, one file per short commit id.
//!
//! The primary-content cache (`<short_id>.md`) is written only after a post is
//! published, so an entry means the commit's post already exists. The same
//! store type keeps secondary summaries (`<short_id>.txt`) in their own
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StateError;
use crate::ledger::write_atomic;

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    extension: String,
}

impl ContentCache {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, StateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, short_id: &str) -> PathBuf {
        self.dir.join(format!("{short_id}.{}", self.extension))
    }

    pub fn contains(&self, short_id: &str) -> bool {
        self.path_for(short_id).is_file()
    }

    /// Cached text for `short_id`, or `None` when there is no entry.
    pub fn get(&self, short_id: &str) -> Result<Option<String>, StateError> {
        let path = self.path_for(short_id);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(short_id, path = %path.display(), "Cache hit");
                Ok(Some(text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(path, e)),
        }
    }

    pub fn put(&self, short_id: &str, text: &str) -> Result<PathBuf, StateError> {
        let path = self.path_for(short_id);
        write_atomic(&path, text.as_bytes())?;
        debug!(short_id, path = %path.display(), bytes = text.len(), "Cache entry written");
        Ok(path)
    }
}
