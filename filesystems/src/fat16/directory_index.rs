// Tracking records linking directory entries to the real files they mirror

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Location of a directory entry: directory cluster (0 = root) and byte offset
/// inside that cluster's buffer.
pub type EntryKey = (u16, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    pub path: PathBuf,
    pub short_name: String,
    pub start_cluster: u16,
    pub file_size: u32,
    pub is_directory: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    entries: BTreeMap<EntryKey, TrackedEntry>,
}

impl DirectoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: EntryKey) -> Option<&TrackedEntry> {
        self.entries.get(&key)
    }

    /// Replaces any record previously held for `key`.
    pub fn insert(&mut self, key: EntryKey, entry: TrackedEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: EntryKey) -> Option<TrackedEntry> {
        self.entries.remove(&key)
    }

    /// Remove every record for `path` and anything below it.
    pub fn remove_under(&mut self, path: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.path.starts_with(path));
        before - self.entries.len()
    }

    /// Move every record under `old` to `new`.
    pub fn rename_prefix(&mut self, old: &Path, new: &Path) {
        for entry in self.entries.values_mut() {
            if let Ok(rest) = entry.path.strip_prefix(old) {
                entry.path = new.join(rest);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryKey, &TrackedEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
