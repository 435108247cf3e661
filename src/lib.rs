//! iv: a minimal image viewer host
//!
//! This crate discovers image files, keeps the set of images in sync with the
//! filesystem, and drives an embedded scriptable view that renders them.
//! The view itself runs out of process and talks to the host over JSON lines
//! on stdio.
//!
//! ## Flow
//!
//! ```text
//! command-line paths
//!        ↓
//! discover() [MIME type image/*]
//!        ↓
//! Reconciler ◄── notify events (files + directories, non-recursive)
//!        │        debounced 1s, buffered paths
//!        ↓
//! View.image_changed() / View.refresh_files()
//!        ↓
//! JsonLinesView ──► stdout ──► page
//!                                │
//! MainWindow ◄── stdin frames ◄──┘ (messages, replies, title changes)
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use iv::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let collected = discover(&[PathBuf::from("/path/to/pictures")])?;
//!     let config = Config::default();
//!
//!     let mut profile = Profile::private();
//!     profile.insert_scripts([files_data(&collected.files, config.values())?]);
//!
//!     let (watcher, fs_events) = NotifyWatcher::new()?;
//!     let reconciler = Reconciler::new(collected, watcher, DEFAULT_DEBOUNCE);
//!     let (view, view_events) = View::new(JsonLinesView::new(std::io::stdout()), profile, None);
//!
//!     let (frame_tx, frames) = tokio::sync::mpsc::unbounded_channel();
//!     spawn_stdin_reader(frame_tx);
//!
//!     MainWindow::new(reconciler, view, config)
//!         .run(fs_events, frames, view_events, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`library`]: discovery, the file set, watching and reconciliation
//! - [`bridge`]: scripts, page messages and the stdio view transport
//! - [`config`]: application directories and persisted settings
//! - [`client`]: the compiled front-end script bundle
//! - [`window`]: the top-level controller and event loop

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bridge;
pub mod client;
pub mod config;
pub mod library;
pub mod window;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::bridge::transport::spawn_stdin_reader;
    pub use crate::bridge::{
        files_data, InboundFrame, JsonLinesView, Profile, UserScript, View, ViewEvent,
        ViewSurface,
    };
    pub use crate::client::ClientBundle;
    pub use crate::config::{AppDirs, Config};
    pub use crate::library::{
        discover, Collected, DiscoveryError, FileEntry, FileSet, NotifyWatcher, PathWatcher,
        Reconciler, DEFAULT_DEBOUNCE,
    };
    pub use crate::window::MainWindow;
}
