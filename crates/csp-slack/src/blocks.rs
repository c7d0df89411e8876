//! The classification prompt posted in reply to a new status update.
//!
//! Block Kit JSON is built with `serde_json::json!`; the ids below are the
//! contract between [`prompt_blocks`] and the interaction parser.

use serde_json::{json, Value};

/// Block id (and element action id) of the pin/forward checkbox group.
pub const OPTIONS_BLOCK_ID: &str = "options";

pub const SET_OK: &str = "csp_set_ok";
pub const SET_WARN: &str = "csp_set_warn";
pub const SET_ERROR: &str = "csp_set_error";
pub const CANCEL: &str = "csp_cancel";

/// Checkbox option: pin the update to the page.
pub const OPTION_PIN: &str = "csp_pin";
/// Checkbox option: repost the update to the forward channel.
pub const OPTION_FORWARD: &str = "csp_forward";

/// Callback id of the "refresh status page" shortcut.
pub const UPDATE_STATUS_PAGE_CALLBACK: &str = "csp_update_status_page";

const PROMPT_TEXT: &str = "I see you are posting a new message to the support page. \
What kind of alert is this? *Warning: this alert will go live immediately!*";

/// Fallback text for clients that cannot show blocks.
pub const PROMPT_FALLBACK: &str = "What kind of alert is this?";

fn plain(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text, "emoji": true })
}

fn button(action_id: &str, label: &str) -> Value {
    json!({
        "type": "button",
        "action_id": action_id,
        "value": action_id,
        "text": plain(label),
    })
}

fn option(value: &str, label: &str) -> Value {
    json!({ "value": value, "text": plain(label) })
}

/// Blocks for the prompt, addressed to `author`. The forward option is
/// offered only when a forward channel name is given.
pub fn prompt_blocks(author: &str, forward_channel_name: Option<&str>) -> Value {
    let mut options = vec![option(OPTION_PIN, "Pin this message to the status page")];
    if let Some(name) = forward_channel_name {
        options.push(option(
            OPTION_FORWARD,
            &format!("Forward message to the #{name} channel"),
        ));
    }
    let intro = if author.is_empty() {
        PROMPT_TEXT.to_string()
    } else {
        format!("<@{author}> {PROMPT_TEXT}")
    };
    json!([
        {
            "type": "section",
            "text": { "type": "mrkdwn", "text": intro }
        },
        {
            "type": "input",
            "block_id": OPTIONS_BLOCK_ID,
            "optional": true,
            "label": plain(" "),
            "element": {
                "type": "checkboxes",
                "action_id": OPTIONS_BLOCK_ID,
                "options": options
            }
        },
        {
            "type": "actions",
            "elements": [
                button(SET_ERROR, "🔥 Critical"),
                button(SET_WARN, "⚠️ Warning"),
                button(SET_OK, "✅ OK/Info"),
                button(CANCEL, "❌ Close"),
            ]
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_has_four_buttons() {
        let blocks = prompt_blocks("U1", Some("general"));
        let buttons = blocks[2]["elements"].as_array().unwrap();
        let ids: Vec<&str> = buttons
            .iter()
            .map(|b| b["action_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![SET_ERROR, SET_WARN, SET_OK, CANCEL]);
    }

    #[test]
    fn test_prompt_mentions_author_and_forward_channel() {
        let blocks = prompt_blocks("U1", Some("announcements"));
        assert!(blocks[0]["text"]["text"].as_str().unwrap().starts_with("<@U1>"));
        let forward = &blocks[1]["element"]["options"][1];
        assert_eq!(forward["value"], OPTION_FORWARD);
        assert!(forward["text"]["text"]
            .as_str()
            .unwrap()
            .contains("#announcements"));
    }

    #[test]
    fn test_prompt_block_ids_match_parser() {
        let blocks = prompt_blocks("", None);
        assert_eq!(blocks[1]["block_id"], OPTIONS_BLOCK_ID);
        assert_eq!(blocks[1]["element"]["options"].as_array().unwrap().len(), 1);
        assert_eq!(blocks[1]["element"]["action_id"], OPTIONS_BLOCK_ID);
        assert!(!blocks[0]["text"]["text"].as_str().unwrap().starts_with("<@"));
    }
}
