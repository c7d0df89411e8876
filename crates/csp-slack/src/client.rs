//! Slack Web API client.
//!
//! A thin, concrete wrapper over the handful of Web API methods the bot
//! uses. Read methods go out as `GET` with query parameters (Slack does
//! not accept JSON bodies for them); write methods are `POST` with a JSON
//! body. Every call is a single attempt: failures are returned, never retried.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use csp_core::config::schema::SlackConfig;
use csp_core::types::Message;

/// API errors that mean "already in the requested state".
const IDEMPOTENT_ERRORS: &[&str] = &["no_reaction", "already_reacted", "already_pinned", "no_pin"];

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("HTTP error calling {method}: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("{method} response is missing `{field}`")]
    MissingField { method: String, field: &'static str },

    #[error("{method} returned malformed data: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SlackError {
    /// The Slack `error` code, if this was an API-level failure.
    pub fn api_error(&self) -> Option<&str> {
        match self {
            SlackError::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SlackError>;

// ─────────────────────────────────────────────
// SlackClient
// ─────────────────────────────────────────────

/// Web API client authenticated with the bot token.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(config.bot_token.clone(), config.api_base.clone())
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// Turn a Slack response envelope into a result.
    fn check(method: &str, body: Value) -> Result<Value> {
        if body["ok"].as_bool() == Some(true) {
            return Ok(body);
        }
        let error = body["error"].as_str().unwrap_or("unknown").to_string();
        Err(SlackError::Api {
            method: method.to_string(),
            error,
        })
    }

    async fn get(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        debug!(method = %method, "slack GET");
        let http_err = |source| SlackError::Http {
            method: method.to_string(),
            source,
        };
        let body: Value = self
            .http
            .get(self.url(method))
            .bearer_auth(&self.bot_token)
            .query(params)
            .send()
            .await
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;
        Self::check(method, body)
    }

    async fn post_with_token(&self, method: &str, token: &str, body: &Value) -> Result<Value> {
        debug!(method = %method, "slack POST");
        let http_err = |source| SlackError::Http {
            method: method.to_string(),
            source,
        };
        let body: Value = self
            .http
            .post(self.url(method))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;
        Self::check(method, body)
    }

    async fn post(&self, method: &str, body: &Value) -> Result<Value> {
        self.post_with_token(method, &self.bot_token, body).await
    }

    /// Like [`post`](Self::post), but "already done" errors count as success.
    async fn post_idempotent(&self, method: &str, body: &Value) -> Result<()> {
        match self.post(method, body).await {
            Ok(_) => Ok(()),
            Err(e) if e.api_error().is_some_and(|c| IDEMPOTENT_ERRORS.contains(&c)) => {
                debug!(method = %method, error = %e, "treating as already applied");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn decode_messages(method: &str, body: &Value) -> Result<Vec<Message>> {
        let messages = body
            .get("messages")
            .cloned()
            .ok_or_else(|| SlackError::MissingField {
                method: method.to_string(),
                field: "messages",
            })?;
        serde_json::from_value(messages).map_err(|source| SlackError::Decode {
            method: method.to_string(),
            source,
        })
    }

    fn string_field(method: &str, value: &Value, field: &'static str) -> Result<String> {
        value[field]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SlackError::MissingField {
                method: method.to_string(),
                field,
            })
    }

    // ─────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────

    /// Call `auth.test` and return the bot's own user ID.
    pub async fn auth_test(&self) -> Result<String> {
        let body = self.post("auth.test", &json!({})).await?;
        Self::string_field("auth.test", &body, "user_id")
    }

    /// Call `apps.connections.open` to get a Socket Mode WebSocket URL.
    pub async fn open_socket(&self, app_token: &str) -> Result<String> {
        let body = self
            .post_with_token("apps.connections.open", app_token, &json!({}))
            .await?;
        Self::string_field("apps.connections.open", &body, "url")
    }

    // ─────────────────────────────────────────
    // History
    // ─────────────────────────────────────────

    /// The newest `limit` messages of a channel, newest first.
    pub async fn history(&self, channel: &str, limit: u32) -> Result<Vec<Message>> {
        let limit = limit.to_string();
        let body = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel),
                    ("oldest", "0"),
                    ("inclusive", "true"),
                    ("limit", &limit),
                ],
            )
            .await?;
        Self::decode_messages("conversations.history", &body)
    }

    /// The single top-level message posted at `ts`, if it still exists.
    pub async fn message_at(&self, channel: &str, ts: &str) -> Result<Option<Message>> {
        let body = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel),
                    ("latest", ts),
                    ("oldest", ts),
                    ("inclusive", "true"),
                    ("limit", "1"),
                ],
            )
            .await?;
        let messages = Self::decode_messages("conversations.history", &body)?;
        Ok(messages.into_iter().find(|m| m.ts == ts))
    }

    /// A thread: the parent message followed by its replies.
    pub async fn replies(&self, channel: &str, ts: &str) -> Result<Vec<Message>> {
        let body = self
            .get("conversations.replies", &[("channel", channel), ("ts", ts)])
            .await?;
        Self::decode_messages("conversations.replies", &body)
    }

    // ─────────────────────────────────────────
    // Reactions & pins
    // ─────────────────────────────────────────

    pub async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()> {
        let body = json!({ "channel": channel, "timestamp": ts, "name": name });
        self.post_idempotent("reactions.add", &body).await
    }

    pub async fn remove_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()> {
        let body = json!({ "channel": channel, "timestamp": ts, "name": name });
        self.post_idempotent("reactions.remove", &body).await
    }

    pub async fn add_pin(&self, channel: &str, ts: &str) -> Result<()> {
        let body = json!({ "channel": channel, "timestamp": ts });
        self.post_idempotent("pins.add", &body).await
    }

    // ─────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────

    /// Post a message (optionally threaded, optionally with blocks).
    /// Returns the new message's timestamp.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<Value>,
    ) -> Result<String> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }
        let resp = self.post("chat.postMessage", &body).await?;
        Self::string_field("chat.postMessage", &resp, "ts")
    }

    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        let body = json!({ "channel": channel, "ts": ts });
        self.post("chat.delete", &body).await.map(|_| ())
    }

    pub async fn permalink(&self, channel: &str, ts: &str) -> Result<String> {
        let body = self
            .get("chat.getPermalink", &[("channel", channel), ("message_ts", ts)])
            .await?;
        Self::string_field("chat.getPermalink", &body, "permalink")
    }

    // ─────────────────────────────────────────
    // Directory lookups
    // ─────────────────────────────────────────

    /// A user's display name: real name, then profile real name, then handle.
    pub async fn user_name(&self, user: &str) -> Result<String> {
        let body = self.get("users.info", &[("user", user)]).await?;
        let u = &body["user"];
        let name = [&u["real_name"], &u["profile"]["real_name"], &u["name"]]
            .into_iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or(user);
        Ok(name.to_string())
    }

    /// A channel's name (without the leading `#`).
    pub async fn channel_name(&self, channel: &str) -> Result<String> {
        let body = self
            .get("conversations.info", &[("channel", channel)])
            .await?;
        Self::string_field("conversations.info", &body["channel"], "name")
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
