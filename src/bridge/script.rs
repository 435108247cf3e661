//! Scripts the host hands to the embedded view.
//!
//! Two kinds of script exist: user scripts, injected into every page before
//! any page script runs, and one-off evaluations built by `call_js`.

use crate::bridge::profile::Profile;
use crate::library::file_set::FileSet;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;

/// Name of the data-injection script.
pub const FILES_DATA_SCRIPT: &str = "files-data.js";

/// Errors raised while building scripts for the view.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Arguments could not be encoded as JSON.
    #[error("Failed to encode script arguments: {0}")]
    Encode(#[from] serde_json::Error),

    /// The function name is not a plain identifier.
    #[error("Invalid function name {0:?}")]
    InvalidFunction(String),
}

/// Script injected at document creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserScript {
    /// Unique name; inserting a script with the same name replaces it.
    pub name: String,
    /// JavaScript source.
    pub source: String,
}

impl UserScript {
    /// Script `name` with the given source.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Ordered, name-keyed collection of user scripts.
#[derive(Debug, Default, Clone)]
pub struct UserScripts {
    scripts: Vec<UserScript>,
}

impl UserScripts {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert scripts, first removing any existing script of the same name.
    pub fn insert(&mut self, scripts: impl IntoIterator<Item = UserScript>) {
        let scripts: Vec<UserScript> = scripts.into_iter().collect();
        self.scripts
            .retain(|existing| !scripts.iter().any(|s| s.name == existing.name));
        self.scripts.extend(scripts);
    }

    /// Find a script by name.
    pub fn find(&self, name: &str) -> Option<&UserScript> {
        self.scripts.iter().find(|s| s.name == name)
    }

    /// Number of scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Whether there are no scripts.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Scripts in injection order.
    pub fn as_slice(&self) -> &[UserScript] {
        &self.scripts
    }
}

/// Script that publishes the image set and settings as page globals.
///
/// Sets `filelist` (identifiers in presentation order), `files`
/// (identifier → metadata) and `config` (settings).
pub fn files_data(files: &FileSet, config: &Map<String, Value>) -> Result<UserScript, BridgeError> {
    let source = format!(
        "filelist = {};files = {};config = {};",
        serde_json::to_string(files.identifiers())?,
        serde_json::to_string(&files.to_json_map())?,
        serde_json::to_string(config)?,
    );
    Ok(UserScript::new(FILES_DATA_SCRIPT, source))
}

/// Source that calls `window.<func>` with `args`.
pub fn call_js(func: &str, args: &[Value]) -> Result<String, BridgeError> {
    let valid = !func.is_empty()
        && func
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(BridgeError::InvalidFunction(func.to_string()));
    }
    Ok(format!(
        "window.{}.apply(this, {})",
        func,
        serde_json::to_string(args)?
    ))
}

/// The host's handle on an embedded scriptable view.
///
/// Implementations deliver work to the view asynchronously. The result of an
/// evaluation, if requested, arrives on the supplied sender; a view that
/// never answers leaves the receiver pending forever.
pub trait ViewSurface {
    /// Set up `profile` (storage and user scripts) and load the page at `url`.
    fn load(&mut self, profile: &Profile, url: Option<&str>);

    /// Evaluate `source` in the view's global scope.
    fn run_script(&mut self, source: &str, reply: Option<oneshot::Sender<Value>>);

    /// Show `title` in the window chrome.
    fn set_window_title(&mut self, title: &str);
}
