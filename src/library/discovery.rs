//! Image discovery.
//!
//! Turns the paths given on the command line (or a directory the watcher
//! reported) into `FileEntry` values. Only files whose guessed MIME type is
//! `image/*` are accepted. Files that vanish between enumeration and the
//! metadata read are skipped without complaint.

use crate::library::entry::{absolute_path, FileEntry};
use crate::library::file_set::FileSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that end discovery.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiscoveryError {
    /// None of the inputs yielded a supported, readable image.
    #[error("No files to display were found")]
    NoFilesFound,
}

/// Result of scanning a set of input roots.
#[derive(Debug, Default)]
pub struct Collected {
    /// Every supported image that could be read.
    pub files: FileSet,
    /// Supported files named directly (not found by walking a directory).
    pub explicit_files: Vec<PathBuf>,
    /// Directories named directly.
    pub explicit_dirs: Vec<PathBuf>,
}

/// Whether the MIME type guessed from the file name is an image type.
pub fn is_supported_file_type(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE)
}

/// Supported image files below `dir`, recursively.
///
/// Symlinks to regular files count as files; dangling links and links to
/// directories are not followed. Subtrees that cannot be read are skipped.
pub fn files_from_dir(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_file_like(entry) && is_supported_file_type(entry.path()))
        .map(|entry| absolute_path(entry.path()))
}

fn is_file_like(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

/// Read metadata for every path, skipping the ones that fail.
pub fn entries_for<I>(paths: I) -> impl Iterator<Item = FileEntry>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths.into_iter().filter_map(|path| match FileEntry::from_path(&path) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::trace!("Skipping {}: {}", path.display(), e);
            None
        }
    })
}

/// Scan `roots` without failing on an empty result.
///
/// A directory root is walked recursively. A file root is taken only if it
/// is a supported type; otherwise a warning is written to the operator log.
pub fn collect(roots: &[PathBuf]) -> Collected {
    let mut collected = Collected::default();

    for root in roots {
        if root.is_dir() {
            collected.explicit_dirs.push(absolute_path(root));
            for entry in entries_for(files_from_dir(root)) {
                collected.files.insert(entry);
            }
        } else if is_supported_file_type(root) {
            match FileEntry::from_path(root) {
                Ok(entry) => {
                    collected.explicit_files.push(entry.path.clone());
                    collected.files.insert(entry);
                }
                Err(e) => tracing::warn!("Cannot read {}: {}", root.display(), e),
            }
        } else {
            tracing::warn!("{} is not a supported file type", root.display());
        }
    }

    collected
}

/// Scan `roots`, failing when nothing displayable was found.
pub fn discover(roots: &[PathBuf]) -> Result<Collected, DiscoveryError> {
    let collected = collect(roots);
    if collected.files.is_empty() {
        return Err(DiscoveryError::NoFilesFound);
    }
    tracing::info!(
        "Discovered {} images in {} roots",
        collected.files.len(),
        roots.len()
    );
    Ok(collected)
}
