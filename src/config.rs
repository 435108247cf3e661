//! Application directories and persisted user settings.
//!
//! Settings are a small JSON object (`settings.json` in the config
//! directory). Defaults are applied first and the on-disk document is laid
//! over them key by key; keys the host does not know about are preserved.

use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Application name, used for directory names and the window title.
pub const APP_NAME: &str = "iv";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "IV_CACHE_DIRECTORY";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "IV_CONFIG_DIRECTORY";

/// Name of the settings document inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Errors from directory resolution and settings persistence.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither the override nor the platform provides the directory.
    #[error("Failed to find path for application {0} directory")]
    NoDirectory(&'static str),

    /// Reading, writing or creating a path failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The settings document is not a JSON object.
    #[error("Invalid settings document {path}: {source}")]
    Json {
        /// Settings file.
        path: PathBuf,
        /// Parse or encode error.
        source: serde_json::Error,
    },
}

/// Resolved cache and config directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// Cache directory, home of the view profile.
    pub cache_dir: PathBuf,
    /// Config directory, home of the settings file.
    pub config_dir: PathBuf,
}

impl AppDirs {
    /// Resolve both directories from the environment and platform defaults,
    /// creating them if needed.
    pub fn resolve() -> Result<Self, ConfigError> {
        let cache_dir = resolve_dir(CACHE_DIR_ENV, dirs::cache_dir(), "cache")?;
        let config_dir = resolve_dir(CONFIG_DIR_ENV, dirs::config_dir(), "config")?;
        Self::at(cache_dir, config_dir)
    }

    /// Use the given directories, creating them if needed.
    pub fn at(cache_dir: PathBuf, config_dir: PathBuf) -> Result<Self, ConfigError> {
        for dir in [&cache_dir, &config_dir] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self {
            cache_dir,
            config_dir,
        })
    }

    /// Location of the settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }
}

fn resolve_dir(
    env_var: &str,
    platform: Option<PathBuf>,
    kind: &'static str,
) -> Result<PathBuf, ConfigError> {
    if let Some(value) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        let path = expand_home(Path::new(&value));
        return Ok(crate::library::entry::absolute_path(&path));
    }
    platform
        .map(|base| base.join(APP_NAME))
        .ok_or(ConfigError::NoDirectory(kind))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Default settings.
pub fn defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("thumbnail_size".into(), json!(128));
    map.insert("show_captions".into(), json!(true));
    map.insert("show_single_caption".into(), json!(true));
    map
}

/// User settings with defaults and an optional backing file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    values: Map<String, Value>,
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: defaults(),
            path: None,
        }
    }
}

impl Config {
    /// Load settings from `path`, laid over the defaults.
    ///
    /// A missing file is not an error. A document that is not a JSON object
    /// is rejected.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self {
            values: defaults(),
            path: Some(path.to_path_buf()),
        };

        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let overrides: Map<String, Value> =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.merge(overrides);
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Load settings, logging and falling back to the defaults on failure.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("{}; using default settings", e);
            Self {
                values: defaults(),
                path: Some(path.to_path_buf()),
            }
        })
    }

    /// Settings file backing this config, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All settings.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// A single setting.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Thumbnail edge length in pixels.
    pub fn thumbnail_size(&self) -> u64 {
        self.get("thumbnail_size")
            .and_then(Value::as_u64)
            .unwrap_or(128)
    }

    /// Whether captions are shown in the grid.
    pub fn show_captions(&self) -> bool {
        self.get("show_captions")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Whether a caption is shown in single-image mode.
    pub fn show_single_caption(&self) -> bool {
        self.get("show_single_caption")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Overlay `changes` key by key.
    pub fn merge(&mut self, changes: Map<String, Value>) {
        for (key, value) in changes {
            self.values.insert(key, value);
        }
    }

    /// Merge a partial update and persist the result.
    pub fn update(&mut self, changes: Map<String, Value>) -> Result<(), ConfigError> {
        self.merge(changes);
        self.save()
    }

    /// Write all settings to the backing file. A config without one is kept
    /// in memory only.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(&self.values).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;

        // Write to a sibling and rename so a crash never leaves half a file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.thumbnail_size(), 128);
        assert!(config.show_captions());
        assert!(config.show_single_caption());
        assert_eq!(config.path(), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = tempdir().unwrap();
        let config = Config::load(&temp.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(config.values(), &defaults());
    }

    #[test]
    fn test_partial_update_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);

        let mut config = Config::load(&path).unwrap();
        let mut changes = Map::new();
        changes.insert("thumbnail_size".into(), json!(256));
        config.update(changes).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.thumbnail_size(), 256);
        assert!(reloaded.show_captions());
        assert!(reloaded.show_single_caption());
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"show_captions": false, "sort_order": "mtime"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.show_captions());
        assert_eq!(config.get("sort_order"), Some(&json!("mtime")));
        assert_eq!(config.thumbnail_size(), 128);

        config.save().unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.get("sort_order"), Some(&json!("mtime")));
    }

    #[test]
    fn test_corrupt_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Json { .. })));
        assert_eq!(Config::load_or_default(&path).values(), &defaults());
    }

    #[test]
    fn test_app_dirs_are_created() {
        let temp = tempdir().unwrap();
        let dirs = AppDirs::at(temp.path().join("c/iv"), temp.path().join("k/iv")).unwrap();

        assert!(dirs.cache_dir.is_dir());
        assert!(dirs.config_dir.is_dir());
        assert_eq!(dirs.settings_path(), temp.path().join("k/iv/settings.json"));
    }

    #[test]
    fn test_env_override() {
        let temp = tempdir().unwrap();
        let var = "IV_TEST_ONLY_DIRECTORY";
        std::env::set_var(var, temp.path());

        let dir = resolve_dir(var, None, "cache").unwrap();
        assert_eq!(dir, temp.path());

        std::env::remove_var(var);
        assert!(matches!(
            resolve_dir(var, None, "cache"),
            Err(ConfigError::NoDirectory("cache"))
        ));
        assert_eq!(
            resolve_dir(var, Some(PathBuf::from("/base")), "cache").unwrap(),
            PathBuf::from("/base/iv")
        );
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/pics")), home.join("pics"));
        }
        assert_eq!(expand_home(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
