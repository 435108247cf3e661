//! Image library management.
//!
//! This module provides:
//! - `entry`: per-file metadata and path identifiers
//! - `discovery`: finding supported images below a set of roots
//! - `file_set`: the ordered identifier → metadata set
//! - `watcher`: OS watch registration, event classification, debouncing
//! - `reconciler`: keeps the file set in sync with the filesystem

pub mod discovery;
pub mod entry;
pub mod file_set;
pub mod reconciler;
pub mod watcher;

pub use discovery::{collect, discover, Collected, DiscoveryError};
pub use entry::{path_to_identifier, FileEntry};
pub use file_set::FileSet;
pub use reconciler::{minimal_roots, ReconcileOutcome, Reconciler};
pub use watcher::{
    Debounce, NotifyWatcher, PathWatcher, WatchEvent, WatchRegistry, WatcherError,
    DEFAULT_DEBOUNCE, MAX_DEBOUNCE,
};
