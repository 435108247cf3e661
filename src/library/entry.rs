//! Per-file metadata and the canonical path identifier.
//!
//! Every image known to the host is keyed by an identifier derived from its
//! absolute path: the percent-encoded `file://` URL of the lexically
//! normalized path. The same path always yields the same identifier, which is
//! what lets watcher events find their entry again.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Metadata for a single image file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    /// Canonical identifier; the key of the entry in a `FileSet`.
    #[serde(skip)]
    pub identifier: String,
    /// Absolute path of the file.
    #[serde(serialize_with = "serialize_lossy")]
    pub path: PathBuf,
    /// File name without the directory part.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub mtime: f64,
    /// Status change (Unix) or creation time in seconds since the epoch.
    pub ctime: f64,
}

impl FileEntry {
    /// Read the metadata for `path`.
    ///
    /// Fails when the file is gone or cannot be stat'ed; callers treat that
    /// as "the entry no longer exists".
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let path = absolute_path(path);
        let metadata = fs::metadata(&path)?;
        let mtime = epoch_seconds(metadata.modified()?);

        Ok(Self {
            identifier: path_to_identifier(&path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            mtime,
            ctime: change_time(&metadata).unwrap_or(mtime),
            path,
        })
    }

    /// Directory containing this file.
    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Metadata as handed to the view. Never fails, whatever the path bytes.
    pub fn to_json(&self) -> Value {
        json!({
            "path": self.path.to_string_lossy(),
            "name": self.name,
            "size": self.size,
            "mtime": self.mtime,
            "ctime": self.ctime,
        })
    }
}

fn serialize_lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

/// Make `path` absolute and drop `.`/`..` components without touching the
/// filesystem (symlinks are not resolved).
pub fn absolute_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonical identifier for `path`.
pub fn path_to_identifier(path: &Path) -> String {
    let absolute = absolute_path(path);
    Url::from_file_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|()| absolute.to_string_lossy().into_owned())
}

/// Local filesystem path behind an identifier or any other `file://` URL.
pub fn identifier_to_path(identifier: &str) -> Option<PathBuf> {
    Url::parse(identifier).ok()?.to_file_path().ok()
}

/// Whether the current process can open `path` for reading.
pub fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}

#[cfg(unix)]
fn change_time(metadata: &fs::Metadata) -> Option<f64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1e9)
}

#[cfg(not(unix))]
fn change_time(metadata: &fs::Metadata) -> Option<f64> {
    metadata.created().ok().map(epoch_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_identifier_is_deterministic() {
        let path = Path::new("/photos/holiday/beach.png");
        assert_eq!(path_to_identifier(path), path_to_identifier(path));
        assert_eq!(path_to_identifier(path), "file:///photos/holiday/beach.png");
    }

    #[test]
    fn test_identifier_normalizes_dot_components() {
        assert_eq!(
            path_to_identifier(Path::new("/photos/./raw/../beach.png")),
            path_to_identifier(Path::new("/photos/beach.png"))
        );
    }

    #[test]
    fn test_identifier_percent_encodes() {
        let id = path_to_identifier(Path::new("/photos/my beach.png"));
        assert_eq!(id, "file:///photos/my%20beach.png");
        assert_eq!(
            identifier_to_path(&id),
            Some(PathBuf::from("/photos/my beach.png"))
        );
    }

    #[test]
    fn test_relative_path_becomes_absolute() {
        let absolute = absolute_path(Path::new("some/image.png"));
        assert!(absolute.is_absolute());
        assert!(absolute.ends_with("some/image.png"));
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("cat.jpg");
        fs::write(&file_path, b"12345").unwrap();

        let entry = FileEntry::from_path(&file_path).unwrap();

        assert_eq!(entry.name, "cat.jpg");
        assert_eq!(entry.size, 5);
        assert!(entry.mtime > 0.0);
        assert!(entry.ctime > 0.0);
        assert_eq!(entry.identifier, path_to_identifier(&file_path));
        assert_eq!(entry.directory(), Some(absolute_path(temp.path()).as_path()));
    }

    #[test]
    fn test_from_path_missing_file() {
        let temp = tempdir().unwrap();
        assert!(FileEntry::from_path(&temp.path().join("gone.png")).is_err());
        assert!(!is_readable(&temp.path().join("gone.png")));
    }

    #[test]
    fn test_serialized_form_omits_identifier() {
        let entry = FileEntry {
            identifier: "file:///a.png".into(),
            path: PathBuf::from("/a.png"),
            name: "a.png".into(),
            size: 3,
            mtime: 1.5,
            ctime: 1.0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "/a.png", "name": "a.png", "size": 3, "mtime": 1.5, "ctime": 1.0})
        );
        assert_eq!(entry.to_json(), json);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_still_serializes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = tempdir().unwrap();
        let file_path = temp.path().join(OsStr::from_bytes(b"caf\xe9.png"));
        fs::write(&file_path, b"c").unwrap();

        let entry = FileEntry::from_path(&file_path).unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json["path"].as_str().unwrap().ends_with("caf\u{fffd}.png"));
        assert_eq!(entry.to_json(), json);
        assert!(entry.identifier.ends_with("caf%E9.png"));
    }
}
