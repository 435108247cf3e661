//! The front-end script bundle.
//!
//! The page script is written in a compile-to-JS language and compiled by an
//! external tool. The host recompiles only when a source file is newer than
//! the compiled output, and refuses to start if the compiler fails.

use crate::bridge::script::UserScript;
use crate::library::entry::{absolute_path, path_to_identifier};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use thiserror::Error;

/// Default compiler executable.
pub const DEFAULT_COMPILER: &str = "rapydscript";

/// Name of the compiled script, inside the client directory.
pub const COMPILED_NAME: &str = "main.js";

const SOURCE_GLOB: &str = "*.pyj";
const ENTRY_NAME: &str = "main.pyj";
const PAGE_NAME: &str = "index.html";

/// Errors that prevent the client script from being used.
#[derive(Error, Debug)]
pub enum ClientScriptError {
    /// The source glob could not be built.
    #[error("Invalid client source pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A source or the compiled output could not be read.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The compiler could not be started.
    #[error("Failed to run the script compiler {compiler}: {source}")]
    Spawn {
        /// Compiler executable.
        compiler: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The compiler exited unsuccessfully.
    #[error("Failed to compile the client side script, aborting")]
    CompileFailed,
}

/// A client directory holding page sources and their compiled output.
#[derive(Debug, Clone)]
pub struct ClientBundle {
    base: PathBuf,
    compiler: String,
}

impl ClientBundle {
    /// Bundle rooted at `base`, compiled with the `compiler` executable.
    pub fn new(base: &Path, compiler: impl Into<String>) -> Self {
        Self {
            base: absolute_path(base),
            compiler: compiler.into(),
        }
    }

    /// Path of the compiled script.
    pub fn compiled_path(&self) -> PathBuf {
        self.base.join(COMPILED_NAME)
    }

    /// URL of the page to load.
    pub fn index_url(&self) -> String {
        path_to_identifier(&self.base.join(PAGE_NAME))
    }

    /// Newest modification time among the sources, if there are any.
    pub fn newest_source(&self) -> Result<Option<SystemTime>, ClientScriptError> {
        let base = glob::Pattern::escape(&self.base.to_string_lossy());
        let pattern = Path::new(&base).join(SOURCE_GLOB);
        let mut newest = None;
        for path in glob::glob(&pattern.to_string_lossy())?.filter_map(Result::ok) {
            let mtime = modified(&path)?;
            newest = newest.max(Some(mtime));
        }
        Ok(newest)
    }

    /// Whether the compiled script is missing or older than a source.
    pub fn is_stale(&self) -> Result<bool, ClientScriptError> {
        let compiled = self.compiled_path();
        if !compiled.exists() {
            return Ok(true);
        }
        let compiled_mtime = modified(&compiled)?;
        Ok(self
            .newest_source()?
            .is_some_and(|source| source > compiled_mtime))
    }

    /// Run the compiler if the output is stale.
    pub fn ensure_compiled(&self) -> Result<(), ClientScriptError> {
        if !self.is_stale()? {
            return Ok(());
        }

        let build_cache = self
            .base
            .parent()
            .unwrap_or(&self.base)
            .join(".build-cache");
        tracing::info!("Compiling client script with {}...", self.compiler);

        let status = Command::new(&self.compiler)
            .arg("compile")
            .arg("-C")
            .arg(&build_cache)
            .args(["--js-version", "6"])
            .arg(self.base.join(ENTRY_NAME))
            .arg("-o")
            .arg(self.compiled_path())
            .status()
            .map_err(|source| ClientScriptError::Spawn {
                compiler: self.compiler.clone(),
                source,
            })?;

        if !status.success() {
            tracing::error!("Script compiler exited with {}", status);
            return Err(ClientScriptError::CompileFailed);
        }
        Ok(())
    }

    /// Compile if needed and load the compiled script.
    pub fn load_script(&self) -> Result<UserScript, ClientScriptError> {
        self.ensure_compiled()?;
        let compiled = self.compiled_path();
        let source = fs::read_to_string(&compiled).map_err(|source| ClientScriptError::Io {
            path: compiled.clone(),
            source,
        })?;
        Ok(UserScript::new(COMPILED_NAME, source))
    }
}

fn modified(path: &Path) -> Result<SystemTime, ClientScriptError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| ClientScriptError::Io {
            path: path.to_path_buf(),
            source,
        })
}
