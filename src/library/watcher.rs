//! Filesystem watching and debouncing.
//!
//! Individual files and their parent directories are registered with the OS
//! notification facility non-recursively. The notify callback runs on a
//! background thread, so it does nothing but forward raw events into a
//! channel; classification into `WatchEvent`s happens on the event loop
//! against the `WatchRegistry`, which is the only place that knows what is
//! being watched.

use notify::{event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default debounce window for both file and directory changes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Longest accepted debounce window.
pub const MAX_DEBOUNCE: Duration = Duration::from_secs(60 * 60);

/// Errors that can occur in the file watcher system.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The platform watcher could not be set up.
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    /// A path could not be watched or unwatched.
    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        /// The path in question.
        path: PathBuf,
        /// Error reported by notify.
        source: notify::Error,
    },
}

/// A change the reconciler cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchEvent {
    /// A watched file was modified, replaced or removed.
    FileChanged(PathBuf),
    /// The entries of a watched directory changed.
    DirectoryChanged(PathBuf),
}

/// Registration seam between the reconciler and the OS watch facility.
pub trait PathWatcher {
    /// Start watching a single file or directory (non-recursive).
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Stop watching a path.
    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError>;
}

/// `PathWatcher` backed by the platform's recommended notify watcher.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
}

impl NotifyWatcher {
    /// Creates a new watcher.
    ///
    /// # Returns
    /// A tuple of (watcher, receiver) where receiver gets the raw events.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<Event>), WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!("File watcher error: {}", e),
            },
            notify::Config::default(),
        )?;

        Ok((Self { watcher }, rx))
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::WatchPath {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .unwatch(path)
            .map_err(|e| WatcherError::WatchPath {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

/// Bookkeeping of what is registered with a `PathWatcher`.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; a no-op if it is already registered.
    pub fn add_file<W: PathWatcher + ?Sized>(&mut self, watcher: &mut W, path: &Path) {
        if self.files.insert(path.to_path_buf()) {
            register(watcher, path);
        }
    }

    /// Register a directory; a no-op if it is already registered.
    pub fn add_dir<W: PathWatcher + ?Sized>(&mut self, watcher: &mut W, path: &Path) {
        if self.dirs.insert(path.to_path_buf()) {
            register(watcher, path);
        }
    }

    /// Forget a file, so a later `add_file` registers it again.
    pub fn remove_file<W: PathWatcher + ?Sized>(&mut self, watcher: &mut W, path: &Path) {
        if self.files.remove(path) {
            // The OS drops the watch of a deleted file on its own.
            let _ = watcher.unwatch(path);
        }
    }

    /// Make the registrations match exactly `files` and `dirs`.
    pub fn sync<W: PathWatcher + ?Sized>(
        &mut self,
        watcher: &mut W,
        files: &HashSet<PathBuf>,
        dirs: &HashSet<PathBuf>,
    ) {
        for stale in self.files.difference(files) {
            let _ = watcher.unwatch(stale);
        }
        for stale in self.dirs.difference(dirs) {
            let _ = watcher.unwatch(stale);
        }
        for fresh in files.difference(&self.files) {
            register(watcher, fresh);
        }
        for fresh in dirs.difference(&self.dirs) {
            register(watcher, fresh);
        }
        self.files = files.clone();
        self.dirs = dirs.clone();
    }

    /// Whether `path` is a registered file.
    pub fn has_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Whether `path` is a registered directory.
    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    /// Translate a raw notify event into the changes it implies.
    ///
    /// A registered file yields `FileChanged`. A registered directory yields
    /// `DirectoryChanged` when it is itself the subject of the event, or when
    /// one of its children was created, removed or renamed.
    pub fn classify(&self, event: &Event) -> Vec<WatchEvent> {
        if matches!(event.kind, EventKind::Access(_)) {
            return Vec::new();
        }

        let structural = matches!(
            event.kind,
            EventKind::Create(_)
                | EventKind::Remove(_)
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Any
                | EventKind::Other
        );

        let mut changes = Vec::new();
        for path in &event.paths {
            if self.files.contains(path) {
                changes.push(WatchEvent::FileChanged(path.clone()));
            }
            if self.dirs.contains(path) {
                changes.push(WatchEvent::DirectoryChanged(path.clone()));
            } else if structural {
                if let Some(parent) = path.parent().filter(|p| self.dirs.contains(*p)) {
                    changes.push(WatchEvent::DirectoryChanged(parent.to_path_buf()));
                }
            }
        }
        changes.dedup();
        changes
    }
}

fn register<W: PathWatcher + ?Sized>(watcher: &mut W, path: &Path) {
    if let Err(e) = watcher.watch(path) {
        tracing::warn!("{}", e);
    }
}

/// Single-shot debounce timer.
///
/// Every `restart` pushes the deadline a full window past the latest event,
/// so a continuous stream of events keeps postponing the flush.
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    /// Create a stopped timer with the given window, capped at `MAX_DEBOUNCE`.
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.min(MAX_DEBOUNCE),
            deadline: None,
        }
    }

    /// The debounce window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the timer relative to `now`, discarding any pending fire.
    pub fn restart(&mut self, now: Instant) {
        self.deadline = now.checked_add(self.window);
        if self.deadline.is_none() {
            tracing::warn!("Debounce deadline out of range, change dropped");
        }
    }

    /// When the timer will fire, if it is running.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the timer is running.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire the timer if its deadline has passed. Returns `true` when fired.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Stop the timer without firing.
    pub fn stop(&mut self) {
        self.deadline = None;
    }
}
