//! The host's side of the embedded view.
//!
//! `View` pairs a `ViewSurface` (how work reaches the page) with a `Page`
//! (how page messages come back) and knows the handful of page functions
//! the host calls.

use crate::bridge::page::{Page, ViewEvent};
use crate::bridge::profile::Profile;
use crate::bridge::script::{call_js, BridgeError, ViewSurface};
use crate::library::entry::FileEntry;
use crate::library::file_set::FileSet;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

/// Embedded view driven through a `ViewSurface`.
pub struct View<S: ViewSurface> {
    surface: S,
    page: Page,
    profile: Profile,
    url: Option<String>,
}

impl<S: ViewSurface> View<S> {
    /// Creates a new view.
    ///
    /// # Arguments
    /// * `surface` - Where scripts and page loads are sent
    /// * `profile` - Storage locations and user scripts for the page
    /// * `url` - The page to load, if any
    ///
    /// # Returns
    /// A tuple of (view, receiver) where receiver gets the page's events.
    pub fn new(
        surface: S,
        profile: Profile,
        url: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (page, events) = Page::new();
        (
            Self {
                surface,
                page,
                profile,
                url,
            },
            events,
        )
    }

    /// Install the profile and load the page.
    pub fn load(&mut self) {
        tracing::debug!(
            "Loading view with {} user scripts",
            self.profile.scripts().len()
        );
        self.surface.load(&self.profile, self.url.as_deref());
    }

    /// The page title changed: poll it for pending messages.
    pub fn title_changed(&mut self) {
        self.page.check_for_messages(&mut self.surface);
    }

    /// Dispatch a message queue posted by the page.
    pub fn deliver_messages(&self, queue: Value) -> usize {
        self.page.dispatch(queue)
    }

    /// Call `window.<func>(...args)` without waiting for a result.
    pub fn call_js(&mut self, func: &str, args: &[Value]) -> Result<(), BridgeError> {
        let source = call_js(func, args)?;
        self.surface.run_script(&source, None);
        Ok(())
    }

    /// Call `window.<func>(...args)`; the result arrives on the receiver.
    pub fn call_js_with_result(
        &mut self,
        func: &str,
        args: &[Value],
    ) -> Result<oneshot::Receiver<Value>, BridgeError> {
        let source = call_js(func, args)?;
        let (reply, result) = oneshot::channel();
        self.surface.run_script(&source, Some(reply));
        Ok(result)
    }

    /// Tell the page that an image's metadata changed.
    pub fn image_changed(&mut self, entry: &FileEntry) -> Result<(), BridgeError> {
        self.call_js("image_changed", &[json!(entry.identifier), entry.to_json()])
    }

    /// Replace the page's image set.
    pub fn refresh_files(&mut self, files: &FileSet) -> Result<(), BridgeError> {
        let map = Value::Object(files.to_json_map());
        let order = serde_json::to_value(files.identifiers())?;
        self.call_js("refresh_files", &[map, order])
    }

    /// Show `title` in the window chrome.
    pub fn set_window_title(&mut self, title: &str) {
        self.surface.set_window_title(title);
    }

    /// Profile the view was created with.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The underlying surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// The underlying surface, mutably.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::page::POLL_EXPRESSION;
    use crate::bridge::script::tests::RecordingSurface;
    use crate::bridge::script::UserScript;
    use std::path::PathBuf;

    fn entry() -> FileEntry {
        FileEntry {
            identifier: "file:///pics/a.png".into(),
            path: PathBuf::from("/pics/a.png"),
            name: "a.png".into(),
            size: 10,
            mtime: 1.0,
            ctime: 1.0,
        }
    }

    fn view() -> (View<RecordingSurface>, mpsc::UnboundedReceiver<ViewEvent>) {
        let mut profile = Profile::private();
        profile.insert_scripts([UserScript::new("files-data.js", "files = {};")]);
        View::new(
            RecordingSurface::default(),
            profile,
            Some("file:///client/index.html".into()),
        )
    }

    #[test]
    fn test_load_passes_profile_scripts() {
        let (mut view, _events) = view();
        view.load();

        let (scripts, url) = &view.surface().loaded[0];
        assert_eq!(scripts[0].name, "files-data.js");
        assert_eq!(url.as_deref(), Some("file:///client/index.html"));
    }

    #[test]
    fn test_image_changed_call() {
        let (mut view, _events) = view();
        view.image_changed(&entry()).unwrap();

        let script = &view.surface().scripts[0];
        assert!(script.starts_with(r#"window.image_changed.apply(this, ["file:///pics/a.png",{"#));
        assert!(script.contains(r#""size":10"#));
    }

    #[test]
    fn test_refresh_files_call() {
        let (mut view, _events) = view();
        let files: FileSet = [entry()].into_iter().collect();
        view.refresh_files(&files).unwrap();

        let script = &view.surface().scripts[0];
        assert!(script.starts_with("window.refresh_files.apply(this, [{"));
        assert!(script.ends_with(r#"["file:///pics/a.png"]])"#));
    }

    #[tokio::test]
    async fn test_call_with_result() {
        let (mut view, _events) = view();
        let result = view.call_js_with_result("zoom_level", &[]).unwrap();

        let reply = view.surface_mut().replies.pop().unwrap();
        reply.send(json!(1.5)).unwrap();
        assert_eq!(result.await.unwrap(), json!(1.5));
    }

    #[tokio::test]
    async fn test_title_change_polls_page() {
        let (mut view, mut events) = view();
        view.title_changed();
        assert_eq!(view.surface().scripts, [POLL_EXPRESSION]);

        let reply = view.surface_mut().replies.pop().unwrap();
        reply.send(json!([{"func": "showing_grid"}])).unwrap();
        assert_eq!(events.recv().await, Some(ViewEvent::SetTitle(None)));
    }

    #[test]
    fn test_posted_messages_dispatch() {
        let (view, mut events) = view();
        let sent = view.deliver_messages(json!([{"func": "refresh_grid"}, {"func": "nope"}]));

        assert_eq!(sent, 1);
        assert_eq!(events.try_recv().unwrap(), ViewEvent::RefreshAll);
    }
}
