//! JSON-lines transport between the host and an out-of-process view.
//!
//! Each line is one JSON object tagged by `type`. The host writes
//! `OutboundFrame`s to its sink (stdout for the binary) and reads
//! `InboundFrame`s from the view. Evaluations that want a result carry an
//! `id`; the view answers with a `reply` frame bearing the same id.

use crate::bridge::profile::Profile;
use crate::bridge::script::ViewSurface;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};

/// Frame sent from the host to the view.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame<'a> {
    /// Script to inject into every page before it runs.
    UserScript {
        /// Script name.
        name: &'a str,
        /// Script source.
        source: &'a str,
    },
    /// Load a page with the given storage locations.
    Load {
        /// Page URL, or `None` for a blank page.
        url: Option<&'a str>,
        /// Resource cache directory.
        cache_path: Option<&'a Path>,
        /// Persistent storage directory.
        storage_path: Option<&'a Path>,
    },
    /// Evaluate a script; an `id` asks for a `reply`.
    Eval {
        /// Reply correlation id.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Script source.
        script: &'a str,
    },
    /// Set the window title.
    WindowTitle {
        /// The new title.
        title: &'a str,
    },
}

/// Frame sent from the view to the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Result of an `eval` that carried an id.
    Reply {
        /// Id of the `eval` being answered.
        id: u64,
        /// Result of the evaluation.
        #[serde(default)]
        value: Value,
    },
    /// Message queue posted directly by the page.
    Messages {
        /// The queue, as an array or a JSON-encoded string.
        #[serde(default)]
        messages: Value,
    },
    /// The page title changed; messages may be pending.
    TitleChanged {
        /// The new page title.
        #[serde(default)]
        title: String,
    },
    /// Console output of the page.
    Console {
        /// The logged text.
        #[serde(default)]
        message: String,
    },
}

impl InboundFrame {
    /// Parse one line of input.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// `ViewSurface` that writes frames as JSON lines.
pub struct JsonLinesView<W: Write> {
    out: W,
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<Value>>,
}

impl<W: Write> JsonLinesView<W> {
    /// View writing its frames to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Complete the evaluation with `id`. Returns `false` for unknown ids.
    pub fn resolve(&mut self, id: u64, value: Value) -> bool {
        match self.pending.remove(&id) {
            Some(reply) => {
                // The caller may have stopped waiting.
                let _ = reply.send(value);
                true
            }
            None => {
                tracing::debug!("Reply for unknown evaluation {}", id);
                false
            }
        }
    }

    /// Number of evaluations still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    /// The underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn send(&mut self, frame: &OutboundFrame<'_>) {
        let written = serde_json::to_writer(&mut self.out, frame)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to write to view: {}", e);
        }
    }
}

impl<W: Write> ViewSurface for JsonLinesView<W> {
    fn load(&mut self, profile: &Profile, url: Option<&str>) {
        for script in profile.scripts() {
            self.send(&OutboundFrame::UserScript {
                name: &script.name,
                source: &script.source,
            });
        }
        self.send(&OutboundFrame::Load {
            url,
            cache_path: profile.cache_path.as_deref(),
            storage_path: profile.storage_path.as_deref(),
        });
    }

    fn run_script(&mut self, source: &str, reply: Option<oneshot::Sender<Value>>) {
        let id = reply.map(|reply| {
            let id = self.next_id;
            self.next_id += 1;
            self.pending.insert(id, reply);
            id
        });
        self.send(&OutboundFrame::Eval { id, script: source });
    }

    fn set_window_title(&mut self, title: &str) {
        self.send(&OutboundFrame::WindowTitle { title });
    }
}

/// Read frames line by line from `reader` until EOF.
///
/// Blank lines are skipped and malformed lines are logged and dropped.
/// Returns when the input ends or the receiver is gone.
pub async fn read_frames<R>(reader: R, tx: mpsc::UnboundedSender<InboundFrame>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match InboundFrame::parse(line) {
                    Ok(frame) => {
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed frame from view: {}", e),
                }
            }
            Ok(None) => {
                tracing::info!("View input closed");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read from view: {}", e);
                break;
            }
        }
    }
}

/// Spawn a task feeding stdin frames into `tx`.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<InboundFrame>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        read_frames(stdin, tx).await;
    })
}
