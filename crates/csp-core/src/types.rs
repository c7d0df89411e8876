//! Shared data model.
//!
//! [`Message`] and [`Reaction`] are read-only views of Slack objects and
//! deserialize straight from Web API / Events API JSON. [`StatusUpdate`],
//! [`Site`] and [`PageModel`] are derived on every rebuild and never mutated
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::utils::{mention_marker, strip_mention};

// ─────────────────────────────────────────────
// Slack views
// ─────────────────────────────────────────────

/// A reaction on a message: emoji name + who applied it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub count: u32,
}

impl Reaction {
    pub fn new(name: impl Into<String>, users: &[&str]) -> Self {
        Self {
            name: name.into(),
            users: users.iter().map(|u| u.to_string()).collect(),
            count: users.len() as u32,
        }
    }

    /// Whether `user` is among the accounts that applied this reaction.
    pub fn applied_by(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }
}

/// A Slack message as returned by `conversations.history`.
///
/// Identified by `(channel, ts)`; `ts` is unique and increasing per channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Channels this message is pinned in.
    #[serde(default)]
    pub pinned_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl Message {
    pub fn is_pinned(&self) -> bool {
        !self.pinned_to.is_empty()
    }

    /// Whether the text contains the `<@BOT>` marker.
    pub fn mentions(&self, bot_id: &str) -> bool {
        self.text.contains(&mention_marker(bot_id))
    }

    /// Mentions the bot and has something to say besides the mention.
    pub fn is_status_update(&self, bot_id: &str) -> bool {
        self.mentions(bot_id) && !self.stripped_text(bot_id).is_empty()
    }

    /// Text with every bot mention removed.
    pub fn stripped_text(&self, bot_id: &str) -> String {
        strip_mention(&self.text, bot_id)
    }

    /// Whether this message is a reply inside someone else's thread.
    pub fn is_thread_reply(&self) -> bool {
        matches!(&self.thread_ts, Some(parent) if parent != &self.ts)
    }
}

// ─────────────────────────────────────────────
// Severity
// ─────────────────────────────────────────────

/// Status color classification derived from the bot's mirrored reaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Neutral,
    Ok,
    Warn,
    Error,
}

impl Severity {
    /// CSS class used by the page template.
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Neutral => "neutral",
            Severity::Ok => "ok",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    /// Icon shown next to the card.
    pub fn icon(self) -> &'static str {
        match self {
            Severity::Neutral => "ℹ️",
            Severity::Ok => "✅",
            Severity::Warn => "⚠️",
            Severity::Error => "🔥",
        }
    }
}

// ─────────────────────────────────────────────
// Page model
// ─────────────────────────────────────────────

/// One card on the status page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Slack timestamp of the source message (empty for the nominal placeholder).
    pub ts: String,
    /// Sanitized HTML body.
    pub html: String,
    /// Display name of the author.
    pub sent_by: String,
    /// Human-readable local time.
    pub timestamp: String,
    pub severity: Severity,
    pub pinned: bool,
    pub current: bool,
}

/// A monitored site tile (from a site-directory thread).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub severity: Severity,
}

/// Everything the page template needs, built wholesale on every rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageModel {
    /// Featured status. Never absent: falls back to the nominal placeholder.
    pub current: StatusUpdate,
    pub pinned: Vec<StatusUpdate>,
    pub updates: Vec<StatusUpdate>,
    pub sites: Vec<Site>,
}

impl PageModel {
    /// A page with nothing on it but the given current status.
    pub fn empty(current: StatusUpdate) -> Self {
        Self {
            current,
            pinned: Vec::new(),
            updates: Vec::new(),
            sites: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
