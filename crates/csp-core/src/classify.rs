//! Reaction classifier.
//!
//! Only reactions the bot applied itself (mirrored reactions) count. The
//! bot copies a moderator's emoji onto the message, so its own copy is the
//! single source of truth for a message's severity and placement.
//!
//! Rules:
//! - severity: the **first** bot-authored severity reaction in upstream order wins
//! - current: any bot-authored current emoji
//! - pin: any bot-authored pin emoji, unless the message is current

use serde::{Deserialize, Serialize};

use crate::types::{Reaction, Severity};

// ─────────────────────────────────────────────
// Recognized emoji
// ─────────────────────────────────────────────

/// The closed set of emoji names the bot acts on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiSet {
    pub ok: String,
    pub warn: String,
    pub error: String,
    pub pin: String,
    pub current: String,
}

/// What a recognized emoji means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmojiKind {
    Severity(Severity),
    Pin,
    Current,
}

impl EmojiKind {
    /// Pin and current are one category: a message is featured at most one way.
    fn same_category(self, other: EmojiKind) -> bool {
        matches!(
            (self, other),
            (EmojiKind::Severity(_), EmojiKind::Severity(_))
                | (EmojiKind::Pin | EmojiKind::Current, EmojiKind::Pin | EmojiKind::Current)
        )
    }
}

impl EmojiSet {
    /// Classify an emoji name, ignoring any `::skin-tone-N` suffix.
    pub fn recognize(&self, name: &str) -> Option<EmojiKind> {
        let base = name.split("::").next().unwrap_or(name);
        if base.is_empty() {
            return None;
        }
        if base == self.ok {
            Some(EmojiKind::Severity(Severity::Ok))
        } else if base == self.warn {
            Some(EmojiKind::Severity(Severity::Warn))
        } else if base == self.error {
            Some(EmojiKind::Severity(Severity::Error))
        } else if base == self.current {
            Some(EmojiKind::Current)
        } else if base == self.pin {
            Some(EmojiKind::Pin)
        } else {
            None
        }
    }

    /// Emoji name the bot uses to mark `severity` (none for Neutral).
    pub fn for_severity(&self, severity: Severity) -> Option<&str> {
        match severity {
            Severity::Neutral => None,
            Severity::Ok => Some(&self.ok),
            Severity::Warn => Some(&self.warn),
            Severity::Error => Some(&self.error),
        }
    }

    /// Emoji names for every severity.
    pub fn severity_names(&self) -> [&str; 3] {
        [&self.ok, &self.warn, &self.error]
    }

    /// Other emoji in the same category as `name`, which must be cleared
    /// before `name` is mirrored.
    pub fn conflicts_with(&self, name: &str) -> Vec<&str> {
        let Some(kind) = self.recognize(name) else {
            return Vec::new();
        };
        [&self.ok, &self.warn, &self.error, &self.pin, &self.current]
            .into_iter()
            .map(String::as_str)
            .filter(|other| *other != name)
            .filter(|other| {
                self.recognize(other)
                    .is_some_and(|k| k != kind && k.same_category(kind))
            })
            .collect()
    }
}

// ─────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────

/// Everything the page builder needs to know about a message's reactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub pinned: bool,
    pub current: bool,
}

fn bot_reactions<'a>(
    reactions: &'a [Reaction],
    bot_id: &'a str,
) -> impl Iterator<Item = &'a Reaction> + 'a {
    reactions.iter().filter(move |r| r.applied_by(bot_id))
}

/// Severity from the first bot-authored severity reaction, else Neutral.
pub fn classify_severity(reactions: &[Reaction], bot_id: &str, emoji: &EmojiSet) -> Severity {
    bot_reactions(reactions, bot_id)
        .find_map(|r| match emoji.recognize(&r.name) {
            Some(EmojiKind::Severity(severity)) => Some(severity),
            _ => None,
        })
        .unwrap_or_default()
}

/// Whether the bot marked this message as the current status.
pub fn is_current(reactions: &[Reaction], bot_id: &str, emoji: &EmojiSet) -> bool {
    bot_reactions(reactions, bot_id)
        .any(|r| emoji.recognize(&r.name) == Some(EmojiKind::Current))
}

/// Whether the bot pinned this message. Current wins over pin.
pub fn should_pin(reactions: &[Reaction], bot_id: &str, emoji: &EmojiSet) -> bool {
    !is_current(reactions, bot_id, emoji)
        && bot_reactions(reactions, bot_id)
            .any(|r| emoji.recognize(&r.name) == Some(EmojiKind::Pin))
}

/// Classify a message's reactions in one call.
pub fn classify(reactions: &[Reaction], bot_id: &str, emoji: &EmojiSet) -> Classification {
    Classification {
        severity: classify_severity(reactions, bot_id, emoji),
        pinned: should_pin(reactions, bot_id, emoji),
        current: is_current(reactions, bot_id, emoji),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
