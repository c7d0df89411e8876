//! Pinned-message reminders.
//!
//! Walks the current snapshot for pinned status updates and posts one
//! summary to the status channel asking admins whether they are still
//! relevant. Only reads the snapshot; never triggers a rebuild.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use csp_core::classify::{classify_severity, EmojiSet};
use csp_core::utils::{age_of, format_slack_ts, parse_timezone};
use csp_core::Config;
use csp_page::{ChannelSnapshot, SnapshotStore};
use csp_slack::SlackClient;

const PLAIN_BULLET: &str = "•";

/// A pinned update that is due a reminder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinnedReminder {
    pub ts: String,
    pub author: String,
    /// Human-readable posting time.
    pub time: String,
    /// `:emoji:` of the update's severity, or a plain bullet.
    pub bullet: String,
}

/// Scan parameters.
#[derive(Clone, Copy, Debug)]
pub struct ScanOptions<'a> {
    pub bot_id: &'a str,
    pub emoji: &'a EmojiSet,
    pub tz: Tz,
    pub now: DateTime<Utc>,
    /// Skip the age gate.
    pub force: bool,
    pub min_age_hours: i64,
}

/// Pinned status updates in `snapshot` that qualify for a reminder.
pub fn scan(snapshot: &ChannelSnapshot, opts: &ScanOptions<'_>) -> Vec<PinnedReminder> {
    let min_age = Duration::hours(opts.min_age_hours);
    snapshot
        .messages
        .iter()
        .filter(|m| m.is_pinned() && m.is_status_update(opts.bot_id))
        .filter(|m| {
            if opts.force {
                return true;
            }
            match age_of(&m.ts, opts.now) {
                Some(age) => age >= min_age,
                None => {
                    debug!(ts = %m.ts, "skipping pin with unparseable timestamp");
                    false
                }
            }
        })
        .map(|m| {
            let severity = classify_severity(&m.reactions, opts.bot_id, opts.emoji);
            let bullet = opts
                .emoji
                .for_severity(severity)
                .map(|name| format!(":{name}:"))
                .unwrap_or_else(|| PLAIN_BULLET.to_string());
            PinnedReminder {
                ts: m.ts.clone(),
                author: m.user.clone(),
                time: format_slack_ts(&m.ts, opts.tz),
                bullet,
            }
        })
        .collect()
}

/// `>1 day`, `>2 days`, `>36 hours`.
fn age_phrase(hours: i64) -> String {
    let (n, unit) = if hours > 0 && hours % 24 == 0 {
        (hours / 24, "day")
    } else {
        (hours, "hour")
    };
    let plural = if n == 1 { "" } else { "s" };
    format!(">{n} {unit}{plural}")
}

/// The single summary message; each pin is paired with its permalink.
///
/// `min_age_hours` is the age gate the scan applied, or `None` when forced.
pub fn compose_summary(pins: &[(PinnedReminder, String)], min_age_hours: Option<i64>) -> String {
    let mut text = String::from("<!here> Hello, Admins.\nThe following messages have been pinned");
    match min_age_hours {
        Some(hours) => text.push_str(&format!(" for {}.\n", age_phrase(hours))),
        None => text.push_str(".\n"),
    }
    for (pin, permalink) in pins {
        text.push_str(&format!(
            "{} <{}|Since {}> from <@{}>\n",
            pin.bullet, permalink, pin.time, pin.author
        ));
    }
    text.push_str("It might be time to unpin them if they are no longer relevant.");
    text
}

// ─────────────────────────────────────────────
// ReminderScanner
// ─────────────────────────────────────────────

/// Runs a scan against the live snapshot and posts the summary.
#[derive(Clone)]
pub struct ReminderScanner {
    client: SlackClient,
    config: Arc<Config>,
    bot_id: String,
    store: Arc<SnapshotStore>,
}

impl ReminderScanner {
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

    /// Scan the current snapshot and post one summary if anything is due.
    /// Returns how many pins were reported.
    pub async fn scan_and_notify(&self, force: bool) -> anyhow::Result<usize> {
        let snapshot = self.store.current();
        let emoji = self.config.emoji();
        let opts = ScanOptions {
            bot_id: &self.bot_id,
            emoji: &emoji,
            tz: parse_timezone(&self.config.status.timezone),
            now: Utc::now(),
            force,
            min_age_hours: self.config.reminders.min_age_hours,
        };

        let due = scan(&snapshot, &opts);
        if due.is_empty() {
            info!(force, "no pinned messages due a reminder");
            return Ok(0);
        }

        let channel = &self.config.slack.status_channel;
        let mut lines = Vec::with_capacity(due.len());
        for pin in due {
            let permalink = self
                .client
                .permalink(channel, &pin.ts)
                .await
                .with_context(|| format!("resolving permalink for {}", pin.ts))?;
            lines.push((pin, permalink));
        }

        let gate = (!force).then_some(self.config.reminders.min_age_hours);
        let text = compose_summary(&lines, gate);
        self.client
            .post_message(channel, &text, None, None)
            .await
            .context("posting pinned-message reminder")?;
        info!(pins = lines.len(), force, "posted pinned-message reminder");
        Ok(lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csp_core::types::{Message, PageModel, Reaction};
    use csp_page::snapshot::nominal_status;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOT: &str = "UBOT";
    const NOW: i64 = 1_700_200_000;

    fn message(ts: &str, text: &str, pinned: bool, reactions: Vec<Reaction>) -> Message {
        Message {
            ts: ts.into(),
            user: "U1".into(),
            text: text.into(),
            reactions,
            pinned_to: if pinned { vec!["CSTATUS".into()] } else { Vec::new() },
            thread_ts: None,
        }
    }

    fn snapshot(messages: Vec<Message>) -> ChannelSnapshot {
        let config = Config::default();
        ChannelSnapshot {
            messages,
            page: PageModel::empty(nominal_status(&config.status)),
            built_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn opts(emoji: &EmojiSet, force: bool) -> ScanOptions<'_> {
        ScanOptions {
            bot_id: BOT,
            emoji,
            tz: chrono_tz::UTC,
            now: now(),
            force,
            min_age_hours: 24,
        }
    }

    /// Two days old.
    const OLD: &str = "1700027200.000100";
    /// One hour old.
    const FRESH: &str = "1700196400.000100";

    #[test]
    fn test_scan_filters_pinned_mentions() {
        let emoji = Config::default().emoji();
        let snap = snapshot(vec![
            message(OLD, "<@UBOT> maintenance", true, vec![Reaction::new("warning", &[BOT])]),
            message("1700027100.0", "pinned elsewhere", true, vec![]),
            message("1700027000.0", "<@UBOT> not pinned", false, vec![]),
            message("1700026900.0", "<@UBOT>", true, vec![]),
        ]);
        let due = scan(&snap, &opts(&emoji, false));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].ts, OLD);
        assert_eq!(due[0].bullet, ":warning:");
        assert_eq!(due[0].author, "U1");
        assert_eq!(due[0].time, "2023-11-15 05:46:40 UTC");
    }

    #[test]
    fn test_scan_age_gate_and_force() {
        let emoji = Config::default().emoji();
        let snap = snapshot(vec![message(FRESH, "<@UBOT> just pinned", true, vec![])]);
        assert!(scan(&snap, &opts(&emoji, false)).is_empty());
        let forced = scan(&snap, &opts(&emoji, true));
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].bullet, PLAIN_BULLET);
    }

    #[test]
    fn test_user_reactions_do_not_pick_bullet() {
        let emoji = Config::default().emoji();
        let snap = snapshot(vec![message(
            OLD,
            "<@UBOT> x",
            true,
            vec![Reaction::new("fire", &["U1"])],
        )]);
        assert_eq!(scan(&snap, &opts(&emoji, false))[0].bullet, PLAIN_BULLET);
    }

    #[test]
    fn test_compose_summary() {
        let pin = PinnedReminder {
            ts: OLD.into(),
            author: "U1".into(),
            time: "2023-11-15 05:46:40 UTC".into(),
            bullet: ":fire:".into(),
        };
        let text = compose_summary(&[(pin.clone(), "https://x.slack.com/p1".into())], Some(24));
        assert_eq!(
            text,
            "<!here> Hello, Admins.\n\
             The following messages have been pinned for >1 day.\n\
             :fire: <https://x.slack.com/p1|Since 2023-11-15 05:46:40 UTC> from <@U1>\n\
             It might be time to unpin them if they are no longer relevant."
        );
        let forced = compose_summary(&[(pin, "https://x.slack.com/p1".into())], None);
        assert!(forced.contains("have been pinned.\n"));
        assert!(!forced.contains(">1 day"));
    }

    #[test]
    fn test_summary_wording_follows_age_gate() {
        assert!(compose_summary(&[], Some(48)).contains("pinned for >2 days.\n"));
        assert!(compose_summary(&[], Some(36)).contains("pinned for >36 hours.\n"));
        assert!(compose_summary(&[], Some(1)).contains("pinned for >1 hour.\n"));
    }

    fn scanner(server: &MockServer, messages: Vec<Message>) -> ReminderScanner {
        let mut config = Config::default();
        config.slack.status_channel = "CSTATUS".into();
        config.slack.api_base = server.uri();
        let config = Arc::new(config);
        let store = Arc::new(SnapshotStore::new(snapshot(messages)));
        ReminderScanner::new(SlackClient::from_config(&config.slack), config, BOT, store)
    }

    #[tokio::test]
    async fn test_nothing_pinned_posts_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1.0" })))
            .expect(0)
            .mount(&server)
            .await;

        let count = scanner(&server, vec![message(OLD, "<@UBOT> hi", false, vec![])])
            .scan_and_notify(true)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_posts_one_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat.getPermalink"))
            .and(query_param("message_ts", OLD))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "permalink": "https://x.slack.com/p1" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_partial_json(json!({ "channel": "CSTATUS" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "2.0" })))
            .expect(1)
            .mount(&server)
            .await;

        let count = scanner(
            &server,
            vec![
                message(OLD, "<@UBOT> maintenance", true, vec![]),
                message(FRESH, "<@UBOT> not pinned", false, vec![]),
            ],
        )
        .scan_and_notify(false)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_permalink_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat.getPermalink"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": false, "error": "message_not_found" }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "2.0" })))
            .expect(0)
            .mount(&server)
            .await;

        let result = scanner(&server, vec![message(OLD, "<@UBOT> x", true, vec![])])
            .scan_and_notify(false)
            .await;
        assert!(result.is_err());
    }
}
