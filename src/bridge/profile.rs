//! Per-view profile: storage locations and injected scripts.

use crate::bridge::script::{UserScript, UserScripts};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where the view keeps its state, and what it runs on every page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Profile {
    /// HTTP/resource cache directory; `None` for a private profile.
    pub cache_path: Option<PathBuf>,
    /// Persistent storage directory; `None` for a private profile.
    pub storage_path: Option<PathBuf>,
    #[serde(skip)]
    scripts: UserScripts,
}

impl Profile {
    /// Profile whose cache and storage live under `cache_dir`.
    ///
    /// Both directories are created if missing.
    pub fn persistent(cache_dir: &Path) -> io::Result<Self> {
        let cache_path = cache_dir.join("cache");
        let storage_path = cache_dir.join("storage");
        fs::create_dir_all(&cache_path)?;
        fs::create_dir_all(&storage_path)?;
        Ok(Self {
            cache_path: Some(cache_path),
            storage_path: Some(storage_path),
            scripts: UserScripts::new(),
        })
    }

    /// Profile that keeps nothing on disk.
    pub fn private() -> Self {
        Self::default()
    }

    /// Whether the profile keeps nothing on disk.
    pub fn is_private(&self) -> bool {
        self.cache_path.is_none() && self.storage_path.is_none()
    }

    /// Add scripts, replacing earlier ones of the same name.
    pub fn insert_scripts(&mut self, scripts: impl IntoIterator<Item = UserScript>) {
        self.scripts.insert(scripts);
    }

    /// Scripts in injection order.
    pub fn scripts(&self) -> &[UserScript] {
        self.scripts.as_slice()
    }
}
