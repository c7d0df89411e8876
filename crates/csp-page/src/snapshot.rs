//! Channel snapshot store.
//!
//! The snapshot (recent status-channel history plus the page model derived
//! from it) is rebuilt wholesale and published with a single atomic pointer
//! swap. HTTP readers call [`SnapshotStore::current`] and get either the old
//! or the new generation, never a mix. A failed rebuild publishes nothing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use csp_core::classify::{classify, classify_severity};
use csp_core::config::schema::StatusConfig;
use csp_core::types::{Message, PageModel, Severity, Site, StatusUpdate};
use csp_core::utils::{format_slack_ts, parse_timezone};
use csp_core::Config;
use csp_slack::SlackClient;

use crate::mrkdwn;

// ─────────────────────────────────────────────
// Snapshot + store
// ─────────────────────────────────────────────

/// One generation of channel state. Immutable once published.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSnapshot {
    /// History as returned by Slack (newest first), truncated to the
    /// configured limit.
    pub messages: Vec<Message>,
    pub page: PageModel,
    /// When this generation was built; `None` for the startup placeholder.
    pub built_at: Option<DateTime<Utc>>,
}

impl ChannelSnapshot {
    /// A snapshot with no history: just the nominal status.
    pub fn placeholder(status: &StatusConfig) -> Self {
        Self {
            messages: Vec::new(),
            page: PageModel::empty(nominal_status(status)),
            built_at: None,
        }
    }
}

/// Single-writer, many-reader holder of the latest snapshot.
pub struct SnapshotStore {
    inner: ArcSwap<ChannelSnapshot>,
}

impl SnapshotStore {
    pub fn new(initial: ChannelSnapshot) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// The latest published snapshot. Never blocks on a rebuild.
    pub fn current(&self) -> Arc<ChannelSnapshot> {
        self.inner.load_full()
    }

    /// Replace the snapshot in one step.
    pub fn publish(&self, snapshot: ChannelSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

// ─────────────────────────────────────────────
// Partition
// ─────────────────────────────────────────────

/// The canned "all systems normal" card shown when nothing is current.
pub fn nominal_status(status: &StatusConfig) -> StatusUpdate {
    StatusUpdate {
        ts: String::new(),
        html: mrkdwn::render(&status.nominal_message),
        sent_by: status.nominal_sent_by.clone(),
        timestamp: "Now".to_string(),
        severity: Severity::Ok,
        pinned: false,
        current: true,
    }
}

/// Split classified updates (in scan order) into the page's sections.
///
/// - the first current-flagged update takes the current slot; later ones
///   are demoted to ordinary updates
/// - pin-flagged updates fill the pinned list up to `pin_limit`; the rest
///   fall through to ordinary updates
/// - with no current update, the slot holds `nominal`
///
/// Flags on the returned cards describe where each one landed.
pub fn partition(updates: Vec<StatusUpdate>, pin_limit: usize, nominal: StatusUpdate) -> PageModel {
    let mut current: Option<StatusUpdate> = None;
    let mut pinned = Vec::new();
    let mut ordinary = Vec::new();

    for mut update in updates {
        if update.current && current.is_none() {
            update.pinned = false;
            current = Some(update);
        } else if update.pinned && !update.current && pinned.len() < pin_limit {
            pinned.push(update);
        } else {
            update.current = false;
            update.pinned = false;
            ordinary.push(update);
        }
    }

    PageModel {
        current: current.unwrap_or(nominal),
        pinned,
        updates: ordinary,
        sites: Vec::new(),
    }
}

/// Site tiles from a site-directory thread: every reply that does not
/// mention the bot, coloured by the bot's first severity reaction.
pub fn sites_from_thread(replies: &[Message], bot_id: &str, config: &Config) -> Vec<Site> {
    let emoji = config.emoji();
    replies
        .iter()
        .filter(|m| !m.mentions(bot_id))
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| Site {
            name: m.text.trim().to_string(),
            severity: classify_severity(&m.reactions, bot_id, &emoji),
        })
        .collect()
}

fn is_site_directory(message: &Message, site_emoji: &str) -> bool {
    !site_emoji.is_empty()
        && message
            .reactions
            .iter()
            .any(|r| r.name.split("::").next() == Some(site_emoji))
}

// ─────────────────────────────────────────────
// PageBuilder
// ─────────────────────────────────────────────

/// Fetches the status channel and publishes fresh snapshots.
pub struct PageBuilder {
    client: SlackClient,
    config: Arc<Config>,
    bot_id: String,
    store: Arc<SnapshotStore>,
}

impl PageBuilder {
    pub fn new(
        client: SlackClient,
        config: Arc<Config>,
        bot_id: impl Into<String>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            client,
            config,
            bot_id: bot_id.into(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Fetch history and derive a complete snapshot without publishing it.
    ///
    /// Any failed lookup aborts the whole build.
    pub async fn build(&self) -> anyhow::Result<ChannelSnapshot> {
        let slack = &self.config.slack;
        let status = &self.config.status;
        let emoji = self.config.emoji();
        let tz = parse_timezone(&status.timezone);

        let messages = self
            .client
            .history(&slack.status_channel, slack.history_limit)
            .await
            .context("fetching status channel history")?;

        let mut names: HashMap<String, String> = HashMap::new();
        let mut updates = Vec::new();
        let mut sites: Option<Vec<Site>> = None;

        for message in &messages {
            if !message.is_status_update(&self.bot_id) {
                continue;
            }

            if is_site_directory(message, &status.site_emoji) {
                // Newest directory wins.
                if sites.is_none() {
                    let replies = self
                        .client
                        .replies(&slack.status_channel, &message.ts)
                        .await
                        .with_context(|| format!("fetching site thread {}", message.ts))?;
                    sites = Some(sites_from_thread(&replies, &self.bot_id, &self.config));
                }
                continue;
            }

            let sent_by = match names.get(&message.user) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .client
                        .user_name(&message.user)
                        .await
                        .with_context(|| format!("resolving user {}", message.user))?;
                    names.insert(message.user.clone(), name.clone());
                    name
                }
            };

            let class = classify(&message.reactions, &self.bot_id, &emoji);
            updates.push(StatusUpdate {
                ts: message.ts.clone(),
                html: mrkdwn::render(&message.stripped_text(&self.bot_id)),
                sent_by,
                timestamp: format_slack_ts(&message.ts, tz),
                severity: class.severity,
                pinned: class.pinned,
                current: class.current,
            });
        }

        let mut page = partition(updates, status.pin_limit, nominal_status(status));
        page.sites = sites.unwrap_or_default();

        debug!(
            messages = messages.len(),
            pinned = page.pinned.len(),
            updates = page.updates.len(),
            sites = page.sites.len(),
            "built page model"
        );

        Ok(ChannelSnapshot {
            messages,
            page,
            built_at: Some(Utc::now()),
        })
    }

    /// Build and publish. On failure the previous snapshot stays live.
    pub async fn rebuild(&self) -> anyhow::Result<Arc<ChannelSnapshot>> {
        match self.build().await {
            Ok(snapshot) => {
                self.store.publish(snapshot);
                info!("status page rebuilt");
                Ok(self.store.current())
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "rebuild failed, keeping previous snapshot");
                Err(e)
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use csp_core::types::Reaction;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOT: &str = "UBOT";

    fn card(ts: &str, pinned: bool, current: bool) -> StatusUpdate {
        StatusUpdate {
            ts: ts.into(),
            html: format!("<p>{ts}</p>\n"),
            sent_by: "Someone".into(),
            timestamp: ts.into(),
            severity: Severity::Neutral,
            pinned,
            current,
        }
    }

    fn nominal() -> StatusUpdate {
        nominal_status(&StatusConfig::default())
    }

    fn test_config(api_base: &str) -> Arc<Config> {
        let mut config = Config::default();
        config.slack.bot_token = "xoxb".into();
        config.slack.status_channel = "CSTATUS".into();
        config.slack.api_base = api_base.into();
        config.status.timezone = "UTC".into();
        config.status.pin_limit = 1;
        Arc::new(config)
    }

    // ── partition ──

    #[test]
    fn test_no_current_uses_nominal() {
        let page = partition(vec![card("1", false, false)], 5, nominal());
        assert_eq!(page.current, nominal());
        assert_eq!(page.current.timestamp, "Now");
        assert_eq!(page.current.sent_by, "Status Bot");
        assert_eq!(page.updates.len(), 1);
    }

    #[test]
    fn test_first_current_wins() {
        let page = partition(
            vec![card("3", false, true), card("2", false, true), card("1", false, false)],
            5,
            nominal(),
        );
        assert_eq!(page.current.ts, "3");
        let ts: Vec<&str> = page.updates.iter().map(|u| u.ts.as_str()).collect();
        assert_eq!(ts, vec!["2", "1"]);
        assert!(page.updates.iter().all(|u| !u.current));
    }

    #[test]
    fn test_pin_limit_overflow() {
        let updates = (0..5).map(|i| card(&i.to_string(), true, false)).collect();
        let page = partition(updates, 2, nominal());
        assert_eq!(page.pinned.len(), 2);
        assert_eq!(page.updates.len(), 3);
        assert!(page.updates.iter().all(|u| !u.pinned));
        assert_eq!(page.pinned[0].ts, "0");
    }

    #[test]
    fn test_zero_pin_limit() {
        let page = partition(vec![card("1", true, false)], 0, nominal());
        assert!(page.pinned.is_empty());
        assert_eq!(page.updates.len(), 1);
    }

    #[test]
    fn test_nominal_renders_message() {
        let n = nominal();
        assert_eq!(n.html, "<p>All systems operational.</p>\n");
        assert_eq!(n.severity, Severity::Ok);
        assert!(n.current);
    }

    // ── sites ──

    #[test]
    fn test_sites_from_thread() {
        let config = test_config("http://unused");
        let replies = vec![
            Message {
                ts: "1.0".into(),
                text: "<@UBOT> sites".into(),
                ..Default::default()
            },
            Message {
                ts: "1.1".into(),
                text: "Website".into(),
                reactions: vec![Reaction::new("fire", &[BOT])],
                ..Default::default()
            },
            Message {
                ts: "1.2".into(),
                text: "Mail".into(),
                reactions: vec![Reaction::new("fire", &["U1"])],
                ..Default::default()
            },
        ];
        let sites = sites_from_thread(&replies, BOT, &config);
        assert_eq!(
            sites,
            vec![
                Site {
                    name: "Website".into(),
                    severity: Severity::Error
                },
                Site {
                    name: "Mail".into(),
                    severity: Severity::Neutral
                },
            ]
        );
    }

    // ── store ──

    #[test]
    fn test_store_swaps_whole_snapshot() {
        let store = SnapshotStore::new(ChannelSnapshot::placeholder(&StatusConfig::default()));
        let before = store.current();
        assert!(before.built_at.is_none());

        let mut next = ChannelSnapshot::placeholder(&StatusConfig::default());
        next.page.updates.push(card("9", false, false));
        next.built_at = Some(Utc::now());
        store.publish(next);

        // Readers holding the old generation still see it intact.
        assert!(before.page.updates.is_empty());
        assert_eq!(store.current().page.updates.len(), 1);
    }

    // ── PageBuilder ──

    async fn mount_history(server: &MockServer, messages: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("channel", "CSTATUS"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "messages": messages })),
            )
            .mount(server)
            .await;
    }

    async fn mount_user(server: &MockServer, id: &str, name: &str) {
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "user": { "name": id, "real_name": name } })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_rebuild_builds_sections() {
        let server = MockServer::start().await;
        mount_history(
            &server,
            json!([
                { "ts": "1700000400.0", "user": "U1", "text": "<@UBOT> *all good*",
                  "reactions": [{ "name": "white_check_mark", "users": ["UBOT"], "count": 1 },
                                { "name": "pushpin", "users": ["UBOT"], "count": 1 }] },
                { "ts": "1700000300.0", "user": "U2", "text": "<@UBOT> outage",
                  "reactions": [{ "name": "fire", "users": ["UBOT"], "count": 1 },
                                { "name": "star", "users": ["UBOT"], "count": 1 }] },
                { "ts": "1700000200.0", "user": "U1", "text": "<@UBOT> pinned too",
                  "reactions": [{ "name": "pushpin", "users": ["UBOT"], "count": 1 }] },
                { "ts": "1700000100.0", "user": "U1", "text": "unrelated chatter" },
                { "ts": "1700000000.0", "user": "U1", "text": "<@UBOT>" }
            ]),
        )
        .await;
        mount_user(&server, "U1", "Ada").await;
        mount_user(&server, "U2", "Grace").await;

        let config = test_config(&server.uri());
        let store = Arc::new(SnapshotStore::new(ChannelSnapshot::placeholder(&config.status)));
        let builder = PageBuilder::new(
            SlackClient::from_config(&config.slack),
            config.clone(),
            BOT,
            store.clone(),
        );

        let snapshot = builder.rebuild().await.unwrap();
        let page = &snapshot.page;
        assert_eq!(snapshot.messages.len(), 5);

        assert_eq!(page.current.ts, "1700000300.0");
        assert_eq!(page.current.severity, Severity::Error);
        assert_eq!(page.current.sent_by, "Grace");
        assert_eq!(page.current.html, "<p>outage</p>\n");

        // pin limit is 1: the second pinned message overflows.
        assert_eq!(page.pinned.len(), 1);
        assert_eq!(page.pinned[0].ts, "1700000400.0");
        assert_eq!(page.pinned[0].severity, Severity::Ok);
        assert_eq!(page.pinned[0].html, "<p><strong>all good</strong></p>\n");
        assert_eq!(page.pinned[0].timestamp, "2023-11-14 22:20:00 UTC");

        assert_eq!(page.updates.len(), 1);
        assert_eq!(page.updates[0].ts, "1700000200.0");

        assert!(store.current().built_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        mount_history(
            &server,
            json!([{ "ts": "1.0", "user": "U404", "text": "<@UBOT> hello" }]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "user_not_found" })),
            )
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let store = Arc::new(SnapshotStore::new(ChannelSnapshot::placeholder(&config.status)));
        let builder = PageBuilder::new(
            SlackClient::from_config(&config.slack),
            config.clone(),
            BOT,
            store.clone(),
        );

        assert!(builder.rebuild().await.is_err());
        assert!(store.current().built_at.is_none());
        assert_eq!(store.current().page.current, nominal());
    }

    #[tokio::test]
    async fn test_site_directory_becomes_tiles() {
        let server = MockServer::start().await;
        mount_history(
            &server,
            json!([
                { "ts": "2.0", "user": "U1", "text": "<@UBOT> our sites",
                  "reactions": [{ "name": "globe_with_meridians", "users": ["U1"], "count": 1 }] }
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [
                    { "ts": "2.0", "user": "U1", "text": "<@UBOT> our sites", "thread_ts": "2.0" },
                    { "ts": "2.1", "user": "U1", "text": "Wiki", "thread_ts": "2.0",
                      "reactions": [{ "name": "warning", "users": ["UBOT"], "count": 1 }] }
                ]
            })))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let store = Arc::new(SnapshotStore::new(ChannelSnapshot::placeholder(&config.status)));
        let builder = PageBuilder::new(
            SlackClient::from_config(&config.slack),
            config.clone(),
            BOT,
            store,
        );

        let snapshot = builder.build().await.unwrap();
        assert!(snapshot.page.updates.is_empty());
        assert_eq!(
            snapshot.page.sites,
            vec![Site {
                name: "Wiki".into(),
                severity: Severity::Warn
            }]
        );
    }
}
