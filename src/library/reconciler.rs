//! Keeps the in-memory image set consistent with the live filesystem.
//!
//! The reconciler owns the `FileSet`, the watched directory set and the two
//! pending-change buffers. Watch events only enqueue paths and restart a
//! debounce timer; the actual work happens when a timer fires, so a burst of
//! events collapses into a single pass. Everything here runs on the event
//! loop, so there is no locking.

use crate::library::discovery::{self, entries_for, files_from_dir};
use crate::library::entry::{absolute_path, is_readable, path_to_identifier, FileEntry};
use crate::library::file_set::FileSet;
use crate::library::watcher::{Debounce, PathWatcher, WatchEvent, WatchRegistry};
use std::collections::{BTreeSet, HashSet};
use std::mem;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What the view needs to hear after a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileOutcome {
    /// Entries whose metadata was re-read.
    pub updated: Vec<FileEntry>,
    /// Whether the whole file set should be pushed again.
    pub refresh: bool,
}

impl ReconcileOutcome {
    /// Whether the pass produced nothing for the view.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && !self.refresh
    }
}

/// Reconciler over a `PathWatcher`.
pub struct Reconciler<W: PathWatcher> {
    files: FileSet,
    directories: BTreeSet<PathBuf>,
    explicit_files: Vec<PathBuf>,
    explicit_dirs: Vec<PathBuf>,
    changed_files: HashSet<PathBuf>,
    changed_dirs: HashSet<PathBuf>,
    file_debounce: Debounce,
    dir_debounce: Debounce,
    registry: WatchRegistry,
    watcher: W,
}

impl<W: PathWatcher> Reconciler<W> {
    /// Creates a new reconciler from a discovery result and registers the
    /// initial watches.
    ///
    /// # Arguments
    /// * `collected` - The initial discovery result
    /// * `watcher` - Where watches are registered
    /// * `debounce` - Window for both debounce timers
    pub fn new(collected: discovery::Collected, watcher: W, debounce: Duration) -> Self {
        let mut reconciler = Self {
            files: FileSet::new(),
            directories: BTreeSet::new(),
            explicit_files: collected.explicit_files,
            explicit_dirs: collected.explicit_dirs,
            changed_files: HashSet::new(),
            changed_dirs: HashSet::new(),
            file_debounce: Debounce::new(debounce),
            dir_debounce: Debounce::new(debounce),
            registry: WatchRegistry::new(),
            watcher,
        };
        reconciler.replace_files(collected.files);
        reconciler
    }

    /// The current image set.
    pub fn files(&self) -> &FileSet {
        &self.files
    }

    /// The watched directory set.
    pub fn directories(&self) -> &BTreeSet<PathBuf> {
        &self.directories
    }

    /// The watch registration table.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// The underlying watcher.
    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    /// Paths waiting for the file debounce.
    pub fn pending_files(&self) -> &HashSet<PathBuf> {
        &self.changed_files
    }

    /// Directories waiting for the directory debounce.
    pub fn pending_dirs(&self) -> &HashSet<PathBuf> {
        &self.changed_dirs
    }

    /// Dispatch a classified watch event.
    pub fn handle_event(&mut self, event: WatchEvent, now: Instant) {
        match event {
            WatchEvent::FileChanged(path) => self.file_changed(path, now),
            WatchEvent::DirectoryChanged(path) => self.directory_changed(path, now),
        }
    }

    /// A watched file changed. An unreadable file is dropped right away.
    pub fn file_changed(&mut self, path: PathBuf, now: Instant) {
        if !is_readable(&path) {
            self.drop_file(&path);
        }
        self.changed_files.insert(path);
        self.file_debounce.restart(now);
    }

    /// The entries of a watched directory changed.
    pub fn directory_changed(&mut self, path: PathBuf, now: Instant) {
        self.changed_dirs.insert(path);
        self.dir_debounce.restart(now);
    }

    /// The earliest instant at which a debounce timer fires.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.file_debounce.deadline(), self.dir_debounce.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whichever flushes are due at `now`.
    pub fn poll_timers(&mut self, now: Instant) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        if self.file_debounce.fire_if_due(now) {
            outcome.updated = self.flush_files();
        }
        if self.dir_debounce.fire_if_due(now) {
            self.flush_directories();
            outcome.refresh = true;
        }
        outcome
    }

    /// Drain the file buffer and re-read metadata of the entries still known.
    ///
    /// Entries whose metadata can no longer be read are dropped.
    pub fn flush_files(&mut self) -> Vec<FileEntry> {
        let paths = mem::take(&mut self.changed_files);
        let mut updated = Vec::new();

        for path in paths {
            let identifier = path_to_identifier(&path);
            if !self.files.contains(&identifier) {
                continue;
            }
            match FileEntry::from_path(&path) {
                Ok(entry) => {
                    self.files.insert(entry.clone());
                    updated.push(entry);
                }
                Err(e) => {
                    tracing::debug!("Dropping {}: {}", path.display(), e);
                    self.drop_file(&path);
                }
            }
        }

        if !updated.is_empty() {
            tracing::debug!("Updated metadata of {} images", updated.len());
        }
        updated
    }

    /// Drain the directory buffer and pick up files that appeared.
    ///
    /// Returns the entries that were added. The caller should push the
    /// whole file set afterwards, even when nothing was added.
    pub fn flush_directories(&mut self) -> Vec<FileEntry> {
        let dirs = mem::take(&mut self.changed_dirs);
        let known: HashSet<PathBuf> = self.files.paths().map(Path::to_path_buf).collect();

        let candidates: BTreeSet<PathBuf> = dirs
            .iter()
            .flat_map(|dir| files_from_dir(dir))
            .filter(|path| !known.contains(path))
            .collect();

        let mut added = Vec::new();
        for entry in entries_for(candidates) {
            if let Some(dir) = entry.directory().map(Path::to_path_buf) {
                self.registry.add_dir(&mut self.watcher, &dir);
                self.directories.insert(dir);
            }
            self.registry.add_file(&mut self.watcher, &entry.path);
            self.files.insert(entry.clone());
            added.push(entry);
        }

        if !added.is_empty() {
            tracing::info!("Picked up {} new images", added.len());
        }
        added
    }

    /// Rebuild the file set from scratch.
    ///
    /// Rediscovers the explicitly requested files and directories plus the
    /// minimal set of watched directory roots, then replaces the file set,
    /// the watched directory set and the OS registrations wholesale.
    pub fn refresh_all(&mut self) {
        let roots = self.refresh_roots();

        let mut files = FileSet::new();
        for entry in entries_for(self.explicit_files.iter().cloned()) {
            files.insert(entry);
        }
        for root in &roots {
            for entry in entries_for(files_from_dir(root)) {
                files.insert(entry);
            }
        }

        tracing::info!(
            "Full refresh over {} roots found {} images",
            roots.len(),
            files.len()
        );
        self.replace_files(files);
    }

    /// Directories a full refresh walks: the watched directories and the
    /// explicitly requested ones, with nested entries removed.
    pub fn refresh_roots(&self) -> BTreeSet<PathBuf> {
        minimal_roots(self.directories.iter().chain(&self.explicit_dirs))
    }

    fn replace_files(&mut self, files: FileSet) {
        let mut directories = files.directories();
        directories.extend(self.explicit_dirs.iter().filter(|d| d.is_dir()).cloned());

        let watched_files: HashSet<PathBuf> = files.paths().map(Path::to_path_buf).collect();
        let watched_dirs: HashSet<PathBuf> = directories.iter().cloned().collect();
        self.registry
            .sync(&mut self.watcher, &watched_files, &watched_dirs);

        self.files = files;
        self.directories = directories;
    }

    fn drop_file(&mut self, path: &Path) {
        let path = absolute_path(path);
        if self.files.remove(&path_to_identifier(&path)).is_some() {
            self.registry.remove_file(&mut self.watcher, &path);
        }
    }
}

/// Reduce `dirs` to the directories not nested inside another one.
///
/// Nesting is decided component-wise, so `/ab` is not inside `/a`.
pub fn minimal_roots<'a, I>(dirs: I) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let sorted: BTreeSet<&PathBuf> = dirs.into_iter().collect();
    let mut roots: BTreeSet<PathBuf> = BTreeSet::new();

    for dir in sorted {
        if !roots.iter().any(|root| dir.starts_with(root)) {
            roots.insert(dir.clone());
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::discovery::discover;
    use crate::library::watcher::tests::RecordingWatcher;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const WINDOW: Duration = Duration::from_secs(1);

    fn fixture() -> (TempDir, Reconciler<RecordingWatcher>) {
        let temp = tempdir().unwrap();
        let sub = temp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(temp.path().join("a.png"), b"a").unwrap();
        fs::write(sub.join("b.jpg"), b"b").unwrap();

        let collected = discover(&[temp.path().to_path_buf()]).unwrap();
        let reconciler = Reconciler::new(collected, RecordingWatcher::default(), WINDOW);
        (temp, reconciler)
    }

    #[test]
    fn test_minimal_roots_drop_nested_dirs() {
        let dirs = [
            PathBuf::from("/a"),
            PathBuf::from("/a/b"),
            PathBuf::from("/c"),
        ];
        let roots: Vec<_> = minimal_roots(&dirs).into_iter().collect();
        assert_eq!(roots, [PathBuf::from("/a"), PathBuf::from("/c")]);
    }

    #[test]
    fn test_minimal_roots_is_component_wise() {
        let dirs = [PathBuf::from("/a"), PathBuf::from("/ab")];
        assert_eq!(minimal_roots(&dirs).len(), 2);
    }

    #[test]
    fn test_initial_watches_cover_files_and_dirs() {
        let (temp, reconciler) = fixture();
        let root = absolute_path(temp.path());

        assert_eq!(reconciler.files().len(), 2);
        assert!(reconciler.directories().contains(&root));
        assert!(reconciler.directories().contains(&root.join("sub")));
        assert!(reconciler.registry().has_file(&root.join("a.png")));
        assert!(reconciler.registry().has_dir(&root.join("sub")));
        assert_eq!(reconciler.watcher().watched.len(), 4);
    }

    #[test]
    fn test_rapid_file_changes_coalesce_into_one_pass() {
        let (temp, mut reconciler) = fixture();
        let path = absolute_path(&temp.path().join("a.png"));
        let start = Instant::now();

        for i in 0..5 {
            reconciler.file_changed(path.clone(), start + Duration::from_millis(i * 100));
        }
        assert_eq!(reconciler.pending_files().len(), 1);
        assert!(reconciler.poll_timers(start + Duration::from_millis(1200)).is_empty());

        fs::write(&path, b"longer contents").unwrap();
        let outcome = reconciler.poll_timers(start + Duration::from_millis(1400));
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.updated[0].size, 15);
        assert!(!outcome.refresh);

        assert!(reconciler.poll_timers(start + Duration::from_secs(10)).is_empty());
        assert_eq!(reconciler.next_deadline(), None);
    }

    #[test]
    fn test_unreadable_file_is_dropped_immediately() {
        let (temp, mut reconciler) = fixture();
        let path = absolute_path(&temp.path().join("a.png"));
        fs::remove_file(&path).unwrap();

        reconciler.file_changed(path.clone(), Instant::now());

        assert_eq!(reconciler.files().len(), 1);
        assert!(!reconciler.registry().has_file(&path));
        assert!(reconciler.pending_files().contains(&path));
        assert!(reconciler.flush_files().is_empty());
    }

    #[test]
    fn test_vanished_file_is_dropped_on_flush() {
        let (temp, mut reconciler) = fixture();
        let path = absolute_path(&temp.path().join("sub/b.jpg"));

        reconciler.file_changed(path.clone(), Instant::now());
        fs::remove_file(&path).unwrap();

        assert!(reconciler.flush_files().is_empty());
        assert!(!reconciler.files().contains(&path_to_identifier(&path)));
    }

    #[test]
    fn test_deleted_then_recreated_file_returns() {
        let (temp, mut reconciler) = fixture();
        let path = absolute_path(&temp.path().join("a.png"));
        let identifier = path_to_identifier(&path);
        let now = Instant::now();

        fs::remove_file(&path).unwrap();
        reconciler.file_changed(path.clone(), now);
        reconciler.flush_files();
        assert!(!reconciler.files().contains(&identifier));

        fs::write(&path, b"recreated!").unwrap();
        reconciler.directory_changed(absolute_path(temp.path()), now);
        let outcome = reconciler.poll_timers(now + WINDOW);

        assert!(outcome.refresh);
        let entry = reconciler.files().get(&identifier).unwrap();
        assert_eq!(entry.size, 10);
        assert!(reconciler.registry().has_file(&path));
    }

    #[test]
    fn test_directory_flush_watches_new_subdirectory() {
        let (temp, mut reconciler) = fixture();
        let fresh_dir = absolute_path(&temp.path().join("fresh"));
        fs::create_dir(&fresh_dir).unwrap();
        fs::write(fresh_dir.join("c.gif"), b"c").unwrap();
        fs::write(fresh_dir.join("notes.txt"), b"n").unwrap();

        reconciler.directory_changed(absolute_path(temp.path()), Instant::now());
        let added = reconciler.flush_directories();

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "c.gif");
        assert!(reconciler.directories().contains(&fresh_dir));
        assert!(reconciler.registry().has_dir(&fresh_dir));
        assert!(reconciler.pending_dirs().is_empty());
    }

    #[test]
    fn test_directory_flush_ignores_known_files() {
        let (temp, mut reconciler) = fixture();
        reconciler.directory_changed(absolute_path(temp.path()), Instant::now());
        assert!(reconciler.flush_directories().is_empty());
        assert_eq!(reconciler.files().len(), 2);
    }

    #[test]
    fn test_refresh_all_is_idempotent() {
        let (temp, mut reconciler) = fixture();
        fs::write(temp.path().join("sub/late.png"), b"l").unwrap();

        reconciler.refresh_all();
        let first = reconciler.files().clone();
        reconciler.refresh_all();

        assert_eq!(first.len(), 3);
        assert_eq!(reconciler.files(), &first);
    }

    #[test]
    fn test_refresh_walks_each_root_once() {
        let (temp, reconciler) = fixture();
        let root = absolute_path(temp.path());

        assert!(reconciler.directories().contains(&root));
        assert_eq!(reconciler.refresh_roots(), BTreeSet::from([root]));
    }

    #[test]
    fn test_refresh_all_keeps_explicit_files() {
        let temp = tempdir().unwrap();
        let lone = temp.path().join("lone.png");
        fs::write(&lone, b"l").unwrap();
        fs::write(temp.path().join("sibling.png"), b"s").unwrap();

        let collected = discover(&[lone.clone()]).unwrap();
        let mut reconciler = Reconciler::new(collected, RecordingWatcher::default(), WINDOW);
        assert_eq!(reconciler.files().len(), 1);

        // The explicit file's directory is watched, so a refresh walks it.
        reconciler.refresh_all();
        assert_eq!(reconciler.files().len(), 2);
        assert!(reconciler.files().contains(&path_to_identifier(&lone)));
    }

    #[test]
    fn test_refresh_all_drops_stale_watches() {
        let (temp, mut reconciler) = fixture();
        let sub = absolute_path(&temp.path().join("sub"));
        fs::remove_dir_all(&sub).unwrap();

        reconciler.refresh_all();

        assert_eq!(reconciler.files().len(), 1);
        assert!(!reconciler.directories().contains(&sub));
        assert!(reconciler.watcher().unwatched.contains(&sub));
    }

    #[test]
    fn test_next_deadline_is_earliest_timer() {
        let (temp, mut reconciler) = fixture();
        let start = Instant::now();
        reconciler.directory_changed(absolute_path(temp.path()), start);
        reconciler.file_changed(absolute_path(&temp.path().join("a.png")), start + WINDOW / 2);

        assert_eq!(reconciler.next_deadline(), Some(start + WINDOW));
    }
}
