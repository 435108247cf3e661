//! Host ↔ view bridge.
//!
//! This module provides:
//! - `script`: user scripts, `call_js` and the `ViewSurface` seam
//! - `page`: parsing and dispatch of messages coming from the page
//! - `view`: the host-side view (loads, calls, polling)
//! - `profile`: view storage locations and injected scripts
//! - `transport`: JSON-lines `ViewSurface` over stdio

pub mod page;
pub mod profile;
pub mod script;
pub mod transport;
pub mod view;

pub use page::{parse_messages, Page, ViewEvent, ViewMessage, POLL_EXPRESSION};
pub use profile::Profile;
pub use script::{call_js, files_data, BridgeError, UserScript, UserScripts, ViewSurface};
pub use transport::{InboundFrame, JsonLinesView, OutboundFrame};
pub use view::View;
