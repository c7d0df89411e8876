//! The status page itself.
//!
//! - **mrkdwn**: Slack mrkdwn → sanitized HTML
//! - **snapshot**: atomically swapped channel snapshot + the builder that refreshes it
//! - **render**: minijinja page template

pub mod mrkdwn;
pub mod render;
pub mod snapshot;

pub use render::{PageRenderer, RenderError};
pub use snapshot::{ChannelSnapshot, PageBuilder, SnapshotStore};
