//! View → host messages.
//!
//! The page keeps a queue of message objects; each names its handler in a
//! `func` field and carries the rest of its fields as payload. The queue
//! reaches the host either by polling (`POLL_EXPRESSION`, run whenever the
//! page title changes) or by being posted directly over the transport. Both
//! paths end in `Page::dispatch`, which turns known messages into
//! `ViewEvent`s and ignores everything else: the page may be newer than the
//! host.

use crate::bridge::script::ViewSurface;
use crate::library::entry::identifier_to_path;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

/// Expression that drains the page's message queue.
///
/// Evaluates to nothing when the page has not defined the accessor yet.
pub const POLL_EXPRESSION: &str =
    "try { window.get_messages_from_javascript() } catch(TypeError) {}";

/// A message from the page, with the `func` tag stripped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "func", rename_all = "snake_case")]
pub enum ViewMessage {
    /// The grid is on screen.
    ShowingGrid,
    /// A single image is on screen.
    ShowingImage {
        /// URL of the image.
        url: String,
    },
    /// A script error escaped the page's own handling.
    UnhandledError {
        /// Error text.
        #[serde(default)]
        msg: String,
    },
    /// The user asked for a full rescan.
    RefreshGrid,
    /// Partial settings change.
    UpdateSettings(Map<String, Value>),
}

/// What the rest of the host is told about page activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Show a per-image title, or the default title for `None`.
    SetTitle(Option<String>),
    /// Rebuild the image set from scratch.
    RefreshAll,
    /// Merge and persist a partial settings update.
    UpdateSettings(Map<String, Value>),
    /// A script error the page could not handle.
    UnhandledError(String),
}

impl From<ViewMessage> for ViewEvent {
    fn from(message: ViewMessage) -> Self {
        match message {
            ViewMessage::ShowingGrid => ViewEvent::SetTitle(None),
            ViewMessage::ShowingImage { url } => ViewEvent::SetTitle(Some(title_for_url(&url))),
            ViewMessage::UnhandledError { msg } => ViewEvent::UnhandledError(msg),
            ViewMessage::RefreshGrid => ViewEvent::RefreshAll,
            ViewMessage::UpdateSettings(settings) => ViewEvent::UpdateSettings(settings),
        }
    }
}

/// Display title for an image URL: the file name of its local path.
pub fn title_for_url(url: &str) -> String {
    identifier_to_path(url)
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| url.to_string())
}

/// Parse a drained message queue.
///
/// Accepts the queue as a JSON-encoded string, an array, or a single message
/// object. Null, empty and unparseable queues yield no messages; unknown or
/// malformed messages are skipped.
pub fn parse_messages(queue: Value) -> Vec<ViewMessage> {
    let items = match queue {
        Value::Null => return Vec::new(),
        Value::String(raw) => {
            if raw.is_empty() || raw == "[]" {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Array(items)) => items,
                Ok(other) => vec![other],
                Err(e) => {
                    tracing::debug!("Ignoring unparseable message queue: {}", e);
                    return Vec::new();
                }
            }
        }
        Value::Array(items) => items,
        other @ Value::Object(_) => vec![other],
        other => {
            tracing::debug!("Ignoring message queue of unexpected shape: {}", other);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match ViewMessage::deserialize(&item) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::trace!("Ignoring message {}: {}", item, e);
                None
            }
        })
        .collect()
}

/// Receiving half of the bridge.
#[derive(Clone)]
pub struct Page {
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl Page {
    /// Creates a new page dispatcher.
    ///
    /// # Returns
    /// A tuple of (page, receiver) where receiver gets the dispatched events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    /// Dispatch every known message in `queue`. Returns how many were sent.
    pub fn dispatch(&self, queue: Value) -> usize {
        dispatch_to(&self.events, queue)
    }

    /// Poll the page for pending messages.
    ///
    /// The poll result is dispatched from a spawned task once the page
    /// answers, so this never waits on the view.
    pub fn check_for_messages<S: ViewSurface + ?Sized>(&self, surface: &mut S) {
        let (reply, answer) = oneshot::channel();
        surface.run_script(POLL_EXPRESSION, Some(reply));

        let events = self.events.clone();
        tokio::spawn(async move {
            // A dropped sender means the page went away before answering.
            if let Ok(queue) = answer.await {
                dispatch_to(&events, queue);
            }
        });
    }
}

fn dispatch_to(events: &mpsc::UnboundedSender<ViewEvent>, queue: Value) -> usize {
    let mut sent = 0;
    for message in parse_messages(queue) {
        if events.send(message.into()).is_ok() {
            sent += 1;
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::script::tests::RecordingSurface;
    use serde_json::json;

    #[test]
    fn test_parse_known_messages() {
        let queue = json!([
            {"func": "showing_grid"},
            {"func": "showing_image", "url": "file:///pics/cat%20one.png"},
            {"func": "unhandled_error", "msg": "boom"},
            {"func": "refresh_grid"},
            {"func": "update_settings", "thumbnail_size": 256},
        ]);

        let messages = parse_messages(queue);

        let mut settings = Map::new();
        settings.insert("thumbnail_size".into(), json!(256));
        assert_eq!(
            messages,
            [
                ViewMessage::ShowingGrid,
                ViewMessage::ShowingImage {
                    url: "file:///pics/cat%20one.png".into()
                },
                ViewMessage::UnhandledError { msg: "boom".into() },
                ViewMessage::RefreshGrid,
                ViewMessage::UpdateSettings(settings),
            ]
        );
    }

    #[test]
    fn test_unknown_func_is_ignored() {
        let queue = json!([
            {"func": "teleport", "where": "mars"},
            {"no_func": true},
            {"func": "showing_image"},
            {"func": "refresh_grid"},
        ]);
        assert_eq!(parse_messages(queue), [ViewMessage::RefreshGrid]);
    }

    #[test]
    fn test_parse_encoded_queue() {
        let encoded = Value::String(r#"[{"func":"showing_grid"}]"#.into());
        assert_eq!(parse_messages(encoded), [ViewMessage::ShowingGrid]);
        assert!(parse_messages(Value::String("[]".into())).is_empty());
        assert!(parse_messages(Value::String("not json".into())).is_empty());
        assert!(parse_messages(Value::Null).is_empty());
        assert!(parse_messages(json!(42)).is_empty());
    }

    #[test]
    fn test_title_for_url() {
        assert_eq!(title_for_url("file:///pics/cat%20one.png"), "cat one.png");
        assert_eq!(title_for_url("not a url"), "not a url");
    }

    #[test]
    fn test_dispatch_sends_events() {
        let (page, mut rx) = Page::new();
        let sent = page.dispatch(json!([
            {"func": "showing_image", "url": "file:///pics/a.png"},
            {"func": "mystery"},
            {"func": "showing_grid"},
        ]));

        assert_eq!(sent, 2);
        assert_eq!(rx.try_recv().unwrap(), ViewEvent::SetTitle(Some("a.png".into())));
        assert_eq!(rx.try_recv().unwrap(), ViewEvent::SetTitle(None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poll_dispatches_reply() {
        let (page, mut rx) = Page::new();
        let mut surface = RecordingSurface::default();

        page.check_for_messages(&mut surface);
        assert_eq!(surface.scripts, [POLL_EXPRESSION]);

        let reply = surface.replies.pop().unwrap();
        reply
            .send(Value::String(r#"[{"func":"refresh_grid"}]"#.into()))
            .unwrap();

        assert_eq!(rx.recv().await, Some(ViewEvent::RefreshAll));
    }

    #[tokio::test]
    async fn test_poll_without_answer_is_harmless() {
        let (page, mut rx) = Page::new();
        let mut surface = RecordingSurface::default();

        page.check_for_messages(&mut surface);
        surface.replies.clear();
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
    }
}
