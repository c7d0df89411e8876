//! Configuration schema.
//!
//! Hierarchy: `Config` → `OrgConfig`, `SlackConfig`, `StatusConfig`,
//! `ReminderConfig`, `GatewayConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};

use crate::classify::EmojiSet;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded once from `~/.csp/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub org: OrgConfig,
    pub slack: SlackConfig,
    pub status: StatusConfig,
    pub reminders: ReminderConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    /// The closed set of emoji the bot recognizes and mirrors.
    pub fn emoji(&self) -> EmojiSet {
        self.status.emoji()
    }
}

// ─────────────────────────────────────────────
// Organization branding
// ─────────────────────────────────────────────

/// Branding strings rendered into the page header.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrgConfig {
    pub name: String,
    pub logo_url: String,
    pub favicon_url: String,
    /// Trusted HTML shown under the header (usually a "get help" link).
    pub help_message: String,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            name: "Cursed Status Page".to_string(),
            logo_url: String::new(),
            favicon_url: String::new(),
            help_message: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Slack
// ─────────────────────────────────────────────

/// How inbound Slack events reach the bot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlackMode {
    /// Socket Mode WebSocket (needs `appToken`).
    #[default]
    Socket,
    /// Events API + interactivity webhooks (needs `signingSecret`).
    Webhook,
}

/// Slack workspace settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`), required.
    pub bot_token: String,
    /// App-level token (`xapp-...`), required for Socket Mode.
    pub app_token: String,
    /// Signing secret, required for webhook mode.
    pub signing_secret: String,
    /// Channel mirrored onto the status page.
    pub status_channel: String,
    /// Channel that receives forwarded updates.
    pub forward_channel: String,
    /// How many messages of history make up a snapshot.
    pub history_limit: u32,
    pub mode: SlackMode,
    /// Web API base URL.
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            signing_secret: String::new(),
            status_channel: String::new(),
            forward_channel: String::new(),
            history_limit: 100,
            mode: SlackMode::Socket,
            api_base: "https://slack.com/api".to_string(),
        }
    }
}

impl SlackConfig {
    /// Whether the tokens needed for the configured mode are present.
    pub fn is_configured(&self) -> bool {
        if self.bot_token.is_empty() || self.status_channel.is_empty() {
            return false;
        }
        match self.mode {
            SlackMode::Socket => !self.app_token.is_empty(),
            SlackMode::Webhook => !self.signing_secret.is_empty(),
        }
    }
}

// ─────────────────────────────────────────────
// Status classification
// ─────────────────────────────────────────────

/// Emoji ↔ severity mapping, card colors and page limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusConfig {
    pub neutral_color: String,
    pub ok_color: String,
    pub ok_emoji: String,
    pub warn_color: String,
    pub warn_emoji: String,
    pub error_color: String,
    pub error_emoji: String,
    /// Emoji that pins an update to the top of the page.
    pub pin_emoji: String,
    /// Emoji that features an update as the current status.
    pub current_emoji: String,
    /// Emoji that marks a message whose thread lists monitored sites.
    pub site_emoji: String,
    /// Capacity of the pinned list; overflow lands in ordinary updates.
    pub pin_limit: usize,
    /// Current-status text shown when nothing is featured.
    pub nominal_message: String,
    pub nominal_sent_by: String,
    /// IANA timezone used for human-readable timestamps.
    pub timezone: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            neutral_color: "#d3d3d3".to_string(),
            ok_color: "#3fb950".to_string(),
            ok_emoji: "white_check_mark".to_string(),
            warn_color: "#d29922".to_string(),
            warn_emoji: "warning".to_string(),
            error_color: "#f85149".to_string(),
            error_emoji: "fire".to_string(),
            pin_emoji: "pushpin".to_string(),
            current_emoji: "star".to_string(),
            site_emoji: "globe_with_meridians".to_string(),
            pin_limit: 5,
            nominal_message: "All systems operational.".to_string(),
            nominal_sent_by: "Status Bot".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl StatusConfig {
    /// Build the recognized emoji set from the configured names.
    pub fn emoji(&self) -> EmojiSet {
        EmojiSet {
            ok: self.ok_emoji.clone(),
            warn: self.warn_emoji.clone(),
            error: self.error_emoji.clone(),
            pin: self.pin_emoji.clone(),
            current: self.current_emoji.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// Reminders
// ─────────────────────────────────────────────

/// Pinned-message reminder settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Cron expression with a leading seconds field (e.g. `"0 0 14 * * Mon-Fri"`).
    pub schedule: String,
    /// Pins younger than this are skipped unless the scan is forced.
    pub min_age_hours: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: "0 0 14 * * Mon-Fri".to_string(),
            min_age_hours: 24,
        }
    }
}

// ─────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────

/// HTTP listener configuration (status page + webhooks).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.slack.history_limit, 100);
        assert_eq!(config.slack.mode, SlackMode::Socket);
        assert_eq!(config.status.pin_limit, 5);
        assert_eq!(config.reminders.min_age_hours, 24);
        assert!(!config.reminders.enabled);
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = serde_json::json!({
            "slack": {
                "botToken": "xoxb-1",
                "statusChannel": "C123",
                "historyLimit": 50,
                "mode": "webhook"
            },
            "status": {
                "okEmoji": "large_green_circle",
                "pinLimit": 2
            }
        });

        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.slack.bot_token, "xoxb-1");
        assert_eq!(config.slack.status_channel, "C123");
        assert_eq!(config.slack.history_limit, 50);
        assert_eq!(config.slack.mode, SlackMode::Webhook);
        assert_eq!(config.status.ok_emoji, "large_green_circle");
        assert_eq!(config.status.pin_limit, 2);
        // Defaults preserved for missing fields
        assert_eq!(config.status.warn_emoji, "warning");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["slack"].get("historyLimit").is_some());
        assert!(json["status"].get("nominalMessage").is_some());
        assert!(json["slack"].get("history_limit").is_none());
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.status.nominal_message, "All systems operational.");
        assert_eq!(config.status.timezone, "America/New_York");
    }

    #[test]
    fn test_slack_is_configured_socket() {
        let mut slack = SlackConfig {
            bot_token: "xoxb".into(),
            status_channel: "C1".into(),
            ..Default::default()
        };
        assert!(!slack.is_configured());
        slack.app_token = "xapp".into();
        assert!(slack.is_configured());
    }

    #[test]
    fn test_slack_is_configured_webhook() {
        let mut slack = SlackConfig {
            bot_token: "xoxb".into(),
            status_channel: "C1".into(),
            mode: SlackMode::Webhook,
            ..Default::default()
        };
        assert!(!slack.is_configured());
        slack.signing_secret = "shh".into();
        assert!(slack.is_configured());
    }

    #[test]
    fn test_emoji_set_from_status_config() {
        let emoji = StatusConfig::default().emoji();
        assert_eq!(emoji.ok, "white_check_mark");
        assert_eq!(emoji.pin, "pushpin");
        assert_eq!(emoji.current, "star");
    }
}
