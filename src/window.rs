//! Top-level orchestration.
//!
//! `MainWindow` owns the reconciler, the view and the settings, and runs the
//! single event loop that everything else feeds into:
//!
//! ```text
//! notify callback ──► raw events ─┐
//! view (stdin)    ──► frames ─────┤
//! page dispatch   ──► ViewEvent ──┼──► MainWindow (one task, no locks)
//! debounce deadlines ─────────────┘          │
//!                                            ▼
//!                         Reconciler / View / Config
//! ```

use crate::bridge::page::ViewEvent;
use crate::bridge::script::ViewSurface;
use crate::bridge::transport::{InboundFrame, JsonLinesView};
use crate::bridge::view::View;
use crate::config::{Config, APP_NAME};
use crate::library::reconciler::{ReconcileOutcome, Reconciler};
use crate::library::watcher::PathWatcher;
use std::future::Future;
use std::io::Write;
use std::time::Instant;
use tokio::sync::mpsc;

/// The host window: state plus event handlers.
pub struct MainWindow<S: ViewSurface, W: PathWatcher> {
    reconciler: Reconciler<W>,
    view: View<S>,
    config: Config,
    image_title: Option<String>,
    title: String,
}

impl<S: ViewSurface, W: PathWatcher> MainWindow<S, W> {
    /// Assemble the window and show the default title.
    pub fn new(reconciler: Reconciler<W>, view: View<S>, config: Config) -> Self {
        let mut window = Self {
            reconciler,
            view,
            config,
            image_title: None,
            title: String::new(),
        };
        window.set_title(None);
        window
    }

    /// Load the view.
    pub fn show(&mut self) {
        self.view.load();
        let title = self.title.clone();
        self.view.set_window_title(&title);
    }

    /// Current window title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The reconciler owning the image set.
    pub fn reconciler(&self) -> &Reconciler<W> {
        &self.reconciler
    }

    /// The embedded view.
    pub fn view(&self) -> &View<S> {
        &self.view
    }

    /// Current settings.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Show a per-image title, or the image count for `None`.
    pub fn set_title(&mut self, val: Option<String>) {
        self.image_title = val;
        let title = match &self.image_title {
            Some(val) if !val.is_empty() => format!("{} :: {}", val, APP_NAME),
            _ => format!("{} images :: {}", self.reconciler.files().len(), APP_NAME),
        };
        if title != self.title {
            tracing::debug!("Window title: {}", title);
            self.view.set_window_title(&title);
            self.title = title;
        }
    }

    /// Feed a raw filesystem event to the reconciler.
    pub fn handle_watch_event(&mut self, event: &notify::Event, now: Instant) {
        for change in self.reconciler.registry().classify(event) {
            tracing::trace!("{:?}", change);
            self.reconciler.handle_event(change, now);
        }
    }

    /// Run the debounce flushes that are due and forward the results.
    pub fn poll_timers(&mut self, now: Instant) {
        let outcome = self.reconciler.poll_timers(now);
        self.apply(outcome);
    }

    /// React to something the page told us.
    pub fn handle_view_event(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::SetTitle(val) => self.set_title(val),
            ViewEvent::RefreshAll => {
                self.reconciler.refresh_all();
                self.apply(ReconcileOutcome {
                    updated: Vec::new(),
                    refresh: true,
                });
            }
            ViewEvent::UpdateSettings(changes) => {
                if let Err(e) = self.config.update(changes) {
                    tracing::warn!("Failed to save settings: {}", e);
                }
            }
            ViewEvent::UnhandledError(msg) => {
                // Not surfaced to the user.
                tracing::debug!("Unhandled error in view: {}", msg);
            }
        }
    }

    fn apply(&mut self, outcome: ReconcileOutcome) {
        for entry in &outcome.updated {
            if let Err(e) = self.view.image_changed(entry) {
                tracing::warn!("Failed to notify view about {}: {}", entry.path.display(), e);
            }
        }
        if outcome.refresh {
            if let Err(e) = self.view.refresh_files(self.reconciler.files()) {
                tracing::warn!("Failed to refresh view: {}", e);
            }
            let image_title = self.image_title.take();
            self.set_title(image_title);
        }
    }
}

impl<Out: Write, W: PathWatcher> MainWindow<JsonLinesView<Out>, W> {
    /// Handle a frame read from the view.
    pub fn handle_frame(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Reply { id, value } => {
                self.view.surface_mut().resolve(id, value);
            }
            InboundFrame::Messages { messages } => {
                self.view.deliver_messages(messages);
            }
            InboundFrame::TitleChanged { .. } => self.view.title_changed(),
            InboundFrame::Console { message } => {
                tracing::info!(target: "iv::console", "{}", message);
            }
        }
    }

    /// Run the event loop until `shutdown` resolves or the view goes away.
    ///
    /// # Arguments
    /// * `fs_events` - Raw events from the notify watcher
    /// * `frames` - Frames read from the view
    /// * `view_events` - Events dispatched by the page
    /// * `shutdown` - Resolves when the process should exit
    pub async fn run(
        mut self,
        mut fs_events: mpsc::UnboundedReceiver<notify::Event>,
        mut frames: mpsc::UnboundedReceiver<InboundFrame>,
        mut view_events: mpsc::UnboundedReceiver<ViewEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        self.show();

        loop {
            let deadline = self.reconciler.next_deadline();
            let timer = async move {
                match deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break;
                }
                Some(event) = fs_events.recv() => {
                    self.handle_watch_event(&event, Instant::now());
                }
                Some(event) = view_events.recv() => {
                    self.handle_view_event(event);
                }
                () = timer => {
                    self.poll_timers(Instant::now());
                }
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => {
                        tracing::info!("View closed, shutting down");
                        break;
                    }
                },
            }
        }
    }
}
