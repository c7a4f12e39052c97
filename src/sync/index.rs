/// Persisted record of what is in a set's cache
///
/// Stored as `cacheIndex.json` next to the set's directories, keyed by remote
/// file name. Deleting the file is safe: the next refresh treats every
/// remote image as new and rebuilds the cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct IndexEntry {
    /// `Last-Modified` header seen when the file was downloaded
    #[serde(rename = "Last-Modified", default)]
    pub last_modified: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct CacheIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index, treating a missing or unreadable file as empty
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache index, starting fresh");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to read cache index");
                return Self::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cache index");
                Self::new()
            }
        }
    }

    /// Write the index next to its final location, then move it into place
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            Error::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    pub fn get(&self, file_name: &str) -> Option<&IndexEntry> {
        self.entries.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    pub fn insert(&mut self, file_name: String, last_modified: Option<String>) {
        self.entries.insert(file_name, IndexEntry { last_modified });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
