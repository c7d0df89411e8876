//! Inbound Slack events.
//!
//! Events arrive as loosely-typed JSON from two transports (Socket Mode
//! envelopes and Events API / interactivity webhooks). Both are funnelled
//! through the parsers here into the closed [`SlackEvent`] set so the worker
//! can dispatch with an exhaustive `match`.

use serde_json::Value;
use tracing::debug;

use crate::blocks::{OPTIONS_BLOCK_ID, UPDATE_STATUS_PAGE_CALLBACK};

// ─────────────────────────────────────────────
// Event model
// ─────────────────────────────────────────────

/// A button press on the classification prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAction {
    /// Who pressed the button.
    pub user: String,
    pub channel: String,
    /// The prompt message itself (deleted once handled).
    pub prompt_ts: String,
    /// The status update the prompt was posted under.
    pub target_ts: String,
    pub action_id: String,
    /// Values of the ticked checkbox options.
    pub selected_options: Vec<String>,
}

/// Every inbound event the bot reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ReactionAdded {
        user: String,
        channel: String,
        ts: String,
        reaction: String,
    },
    ReactionRemoved {
        user: String,
        channel: String,
        ts: String,
        reaction: String,
    },
    PinAdded {
        channel: String,
    },
    PinRemoved {
        channel: String,
    },
    MessagePosted {
        channel: String,
        user: String,
        ts: String,
        text: String,
        /// Parent timestamp when the message is a thread reply.
        thread_ts: Option<String>,
    },
    MessageEdited {
        channel: String,
        user: String,
        ts: String,
        text: String,
        previous_text: String,
    },
    MessageDeleted {
        channel: String,
        ts: String,
    },
    AppMention {
        channel: String,
        user: String,
        ts: String,
    },
    BlockAction(BlockAction),
    Shortcut {
        callback_id: String,
        user: String,
    },
}

impl SlackEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SlackEvent::ReactionAdded { .. } => "reaction_added",
            SlackEvent::ReactionRemoved { .. } => "reaction_removed",
            SlackEvent::PinAdded { .. } => "pin_added",
            SlackEvent::PinRemoved { .. } => "pin_removed",
            SlackEvent::MessagePosted { .. } => "message",
            SlackEvent::MessageEdited { .. } => "message_changed",
            SlackEvent::MessageDeleted { .. } => "message_deleted",
            SlackEvent::AppMention { .. } => "app_mention",
            SlackEvent::BlockAction(_) => "block_actions",
            SlackEvent::Shortcut { .. } => "shortcut",
        }
    }

    /// Whether this is the "refresh the page" shortcut.
    pub fn is_refresh_shortcut(&self) -> bool {
        matches!(self, SlackEvent::Shortcut { callback_id, .. } if callback_id == UPDATE_STATUS_PAGE_CALLBACK)
    }
}

fn str_field(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ─────────────────────────────────────────────
// Events API
// ─────────────────────────────────────────────

/// Outer body of an Events API request (webhook mode), or the payload of a
/// Socket Mode `events_api` envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callback {
    /// Endpoint ownership handshake; must be answered with the challenge.
    UrlVerification { challenge: String },
    /// Slack is throttling event delivery to this app.
    RateLimited,
    /// A wrapped event. `None` when the inner event is not one we handle.
    Event(Option<SlackEvent>),
    Unknown(String),
}

/// Classify an Events API body.
pub fn parse_callback(body: &Value) -> Callback {
    match body["type"].as_str().unwrap_or_default() {
        "url_verification" => Callback::UrlVerification {
            challenge: str_field(body, "/challenge"),
        },
        "app_rate_limited" => Callback::RateLimited,
        "event_callback" => Callback::Event(parse_event(&body["event"])),
        other => Callback::Unknown(other.to_string()),
    }
}

/// Parse the inner `event` object of an `event_callback`.
///
/// Returns `None` for event types and message subtypes the bot ignores.
pub fn parse_event(event: &Value) -> Option<SlackEvent> {
    let event_type = event["type"].as_str().unwrap_or_default();
    let channel = || str_field(event, "/channel");

    let parsed = match event_type {
        "reaction_added" | "reaction_removed" => {
            let user = str_field(event, "/user");
            let channel = str_field(event, "/item/channel");
            let ts = str_field(event, "/item/ts");
            let reaction = str_field(event, "/reaction");
            if event_type == "reaction_added" {
                SlackEvent::ReactionAdded {
                    user,
                    channel,
                    ts,
                    reaction,
                }
            } else {
                SlackEvent::ReactionRemoved {
                    user,
                    channel,
                    ts,
                    reaction,
                }
            }
        }
        "pin_added" => SlackEvent::PinAdded {
            channel: pin_channel(event),
        },
        "pin_removed" => SlackEvent::PinRemoved {
            channel: pin_channel(event),
        },
        "app_mention" => SlackEvent::AppMention {
            channel: channel(),
            user: str_field(event, "/user"),
            ts: str_field(event, "/ts"),
        },
        "message" => return parse_message(event),
        other => {
            debug!(event_type = %other, "ignoring event type");
            return None;
        }
    };
    Some(parsed)
}

/// Pin events carry `channel_id`; older payloads only have `item.channel`.
fn pin_channel(event: &Value) -> String {
    let id = str_field(event, "/channel_id");
    if id.is_empty() {
        str_field(event, "/item/channel")
    } else {
        id
    }
}

fn parse_message(event: &Value) -> Option<SlackEvent> {
    let channel = str_field(event, "/channel");
    match event["subtype"].as_str().unwrap_or_default() {
        "" => Some(SlackEvent::MessagePosted {
            channel,
            user: str_field(event, "/user"),
            ts: str_field(event, "/ts"),
            text: str_field(event, "/text"),
            thread_ts: event["thread_ts"].as_str().map(str::to_string),
        }),
        "message_changed" => Some(SlackEvent::MessageEdited {
            channel,
            user: str_field(event, "/message/user"),
            ts: str_field(event, "/message/ts"),
            text: str_field(event, "/message/text"),
            previous_text: str_field(event, "/previous_message/text"),
        }),
        "message_deleted" => Some(SlackEvent::MessageDeleted {
            channel,
            ts: str_field(event, "/deleted_ts"),
        }),
        other => {
            debug!(subtype = %other, "ignoring message subtype");
            None
        }
    }
}

// ─────────────────────────────────────────────
// Interactivity
// ─────────────────────────────────────────────

/// Parse an interactivity payload (button presses and shortcuts).
pub fn parse_interaction(payload: &Value) -> Option<SlackEvent> {
    match payload["type"].as_str().unwrap_or_default() {
        "block_actions" => {
            let action_id = str_field(payload, "/actions/0/action_id");
            if action_id.is_empty() {
                debug!("block_actions payload without actions");
                return None;
            }
            let selected_options = payload
                .pointer(&format!(
                    "/state/values/{OPTIONS_BLOCK_ID}/{OPTIONS_BLOCK_ID}/selected_options"
                ))
                .and_then(Value::as_array)
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| o["value"].as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(SlackEvent::BlockAction(BlockAction {
                user: str_field(payload, "/user/id"),
                channel: str_field(payload, "/channel/id"),
                prompt_ts: str_field(payload, "/container/message_ts"),
                target_ts: str_field(payload, "/container/thread_ts"),
                action_id,
                selected_options,
            }))
        }
        "shortcut" | "message_action" => Some(SlackEvent::Shortcut {
            callback_id: str_field(payload, "/callback_id"),
            user: str_field(payload, "/user/id"),
        }),
        other => {
            debug!(interaction_type = %other, "ignoring interaction type");
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
