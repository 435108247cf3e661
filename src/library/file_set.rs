//! The set of images currently known to the host.
//!
//! `FileSet` maps identifiers to `FileEntry` values and remembers the order in
//! which entries were discovered, which is the order the view presents them
//! in. It is owned by the reconciler and mutated only through the methods
//! below.

use crate::library::entry::FileEntry;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Identifier-keyed image set with stable discovery order.
#[derive(Debug, Default, Clone)]
pub struct FileSet {
    entries: HashMap<String, FileEntry>,
    order: Vec<String>,
}

impl FileSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update an entry.
    ///
    /// An existing identifier keeps its position. Returns `true` when the
    /// entry was not present before.
    pub fn insert(&mut self, entry: FileEntry) -> bool {
        let identifier = entry.identifier.clone();
        let is_new = self.entries.insert(identifier.clone(), entry).is_none();
        if is_new {
            self.order.push(identifier);
        }
        is_new
    }

    /// Remove an entry by identifier.
    pub fn remove(&mut self, identifier: &str) -> Option<FileEntry> {
        let removed = self.entries.remove(identifier)?;
        self.order.retain(|id| id != identifier);
        Some(removed)
    }

    /// Look up an entry by identifier.
    pub fn get(&self, identifier: &str) -> Option<&FileEntry> {
        self.entries.get(identifier)
    }

    /// Check if an identifier is present.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Identifiers in discovery order.
    pub fn identifiers(&self) -> &[String] {
        &self.order
    }

    /// Paths of all entries.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.iter().map(|entry| entry.path.as_path())
    }

    /// Distinct parent directories of all entries.
    pub fn directories(&self) -> BTreeSet<PathBuf> {
        self.iter()
            .filter_map(|entry| entry.directory())
            .map(Path::to_path_buf)
            .collect()
    }

    /// The identifier → metadata mapping handed to the view.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.iter()
            .map(|entry| (entry.identifier.clone(), entry.to_json()))
            .collect()
    }
}

impl PartialEq for FileSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.entries == other.entries
    }
}

impl FromIterator<FileEntry> for FileSet {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}
