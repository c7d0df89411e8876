//! Core building blocks for the cursed status page.
//!
//! - **config**: typed configuration, JSON file + env var loading
//! - **types**: Slack message view and the derived status-page model
//! - **classify**: mirrored-reaction classification (severity, pin, current)
//! - **utils**: timestamp formatting and mention helpers

pub mod classify;
pub mod config;
pub mod types;
pub mod utils;

pub use classify::{Classification, EmojiKind, EmojiSet};
pub use config::Config;
pub use types::{Message, PageModel, Reaction, Severity, Site, StatusUpdate};
