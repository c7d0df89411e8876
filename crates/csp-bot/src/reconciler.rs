//! Event reconciler.
//!
//! Each inbound event is first classified into a [`Plan`] by pure `plan_*`
//! functions, then executed against Slack. Execution is serialized through
//! a single worker, which is what makes the clear-then-mirror reaction
//! sequence safe.
//!
//! Failures abandon the rest of the event's side effects and are logged;
//! nothing is retried. Whether the page is rebuilt is decided by the plan,
//! not by whether the side effects succeeded.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use csp_core::classify::EmojiSet;
use csp_core::types::{Message, Severity};
use csp_core::utils::{mention_marker, strip_mention};
use csp_core::Config;
use csp_page::PageBuilder;
use csp_slack::blocks::{self, prompt_blocks, PROMPT_FALLBACK};
use csp_slack::{BlockAction, EventQueue, SlackClient, SlackEvent};

// ─────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────

/// What the bot knows about itself when classifying an event.
#[derive(Clone, Copy, Debug)]
pub struct PlanContext<'a> {
    pub bot_id: &'a str,
    pub status_channel: &'a str,
    pub emoji: &'a EmojiSet,
}

/// A moderator's answer to the classification prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptChoice {
    pub channel: String,
    /// The status update being classified.
    pub target_ts: String,
    /// The prompt message, deleted once the choice is applied.
    pub prompt_ts: String,
    pub severity: Option<Severity>,
    pub pin: bool,
    pub forward: bool,
}

/// The decision for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    Ignore,
    Rebuild,
    /// Copy a moderator's reaction under the bot's account, if the message
    /// turns out to mention the bot. Rebuilds when it does.
    Mirror { ts: String, reaction: String },
    /// Drop the bot's copy of a reaction a moderator removed. Rebuilds.
    Unmirror { ts: String, reaction: String },
    /// Post the classification prompt under a new status update. Rebuilds.
    Prompt { ts: String, author: String },
    /// Apply a prompt answer. Rebuilds.
    Classify(PromptChoice),
}

impl Plan {
    fn rebuild_when_in(channel: &str, ctx: &PlanContext<'_>) -> Plan {
        if channel == ctx.status_channel {
            Plan::Rebuild
        } else {
            Plan::Ignore
        }
    }
}

/// Classify an inbound event.
pub fn plan(event: &SlackEvent, ctx: &PlanContext<'_>) -> Plan {
    match event {
        SlackEvent::ReactionAdded {
            user,
            channel,
            ts,
            reaction,
        } => plan_reaction_added(user, channel, ts, reaction, ctx),
        SlackEvent::ReactionRemoved {
            user,
            channel,
            ts,
            reaction,
        } => plan_reaction_removed(user, channel, ts, reaction, ctx),
        SlackEvent::PinAdded { .. } | SlackEvent::PinRemoved { .. } => Plan::Rebuild,
        SlackEvent::MessagePosted {
            channel,
            user,
            ts,
            text,
            thread_ts,
        } => plan_message_posted(channel, user, ts, text, thread_ts.as_deref(), ctx),
        SlackEvent::MessageEdited {
            channel,
            user,
            ts,
            text,
            previous_text,
        } => plan_message_edited(channel, user, ts, text, previous_text, ctx),
        SlackEvent::MessageDeleted { channel, .. } => Plan::rebuild_when_in(channel, ctx),
        SlackEvent::AppMention { channel, .. } => Plan::rebuild_when_in(channel, ctx),
        SlackEvent::BlockAction(action) => plan_block_action(action),
        SlackEvent::Shortcut { .. } => {
            if event.is_refresh_shortcut() {
                Plan::Rebuild
            } else {
                Plan::Ignore
            }
        }
    }
}

pub fn plan_reaction_added(
    user: &str,
    channel: &str,
    ts: &str,
    reaction: &str,
    ctx: &PlanContext<'_>,
) -> Plan {
    if user == ctx.bot_id || channel != ctx.status_channel || ctx.emoji.recognize(reaction).is_none() {
        return Plan::Ignore;
    }
    Plan::Mirror {
        ts: ts.to_string(),
        reaction: reaction.to_string(),
    }
}

pub fn plan_reaction_removed(
    user: &str,
    channel: &str,
    ts: &str,
    reaction: &str,
    ctx: &PlanContext<'_>,
) -> Plan {
    if user == ctx.bot_id || channel != ctx.status_channel {
        return Plan::Ignore;
    }
    Plan::Unmirror {
        ts: ts.to_string(),
        reaction: reaction.to_string(),
    }
}

/// Whether `text` is a status update: mentions the bot with something to say.
fn is_update_text(text: &str, bot_id: &str) -> bool {
    text.contains(&mention_marker(bot_id)) && !strip_mention(text, bot_id).is_empty()
}

pub fn plan_message_posted(
    channel: &str,
    user: &str,
    ts: &str,
    text: &str,
    thread_ts: Option<&str>,
    ctx: &PlanContext<'_>,
) -> Plan {
    if channel != ctx.status_channel || user == ctx.bot_id {
        return Plan::Ignore;
    }
    if !text.contains(&mention_marker(ctx.bot_id)) {
        return Plan::Ignore;
    }
    // Thread replies (site tiles) change the page but are not updates.
    if thread_ts.is_some_and(|parent| parent != ts) {
        return Plan::Rebuild;
    }
    // A bare mention is not an update, but may replace one that was.
    if !is_update_text(text, ctx.bot_id) {
        return Plan::Rebuild;
    }
    Plan::Prompt {
        ts: ts.to_string(),
        author: user.to_string(),
    }
}

pub fn plan_message_edited(
    channel: &str,
    user: &str,
    ts: &str,
    text: &str,
    previous_text: &str,
    ctx: &PlanContext<'_>,
) -> Plan {
    if channel != ctx.status_channel || user == ctx.bot_id {
        return Plan::Ignore;
    }
    let marker = mention_marker(ctx.bot_id);
    // Unfurls and attachment updates arrive as edits with the same text.
    if text != previous_text && is_update_text(text, ctx.bot_id) {
        Plan::Prompt {
            ts: ts.to_string(),
            author: user.to_string(),
        }
    } else if text.contains(&marker) || previous_text.contains(&marker) {
        Plan::Rebuild
    } else {
        Plan::Ignore
    }
}

pub fn plan_block_action(action: &BlockAction) -> Plan {
    let severity = match action.action_id.as_str() {
        blocks::SET_OK => Some(Severity::Ok),
        blocks::SET_WARN => Some(Severity::Warn),
        blocks::SET_ERROR => Some(Severity::Error),
        blocks::CANCEL => None,
        other => {
            debug!(action_id = %other, "ignoring unknown block action");
            return Plan::Ignore;
        }
    };
    // Close, or a prompt that has lost its parent: just remove the prompt.
    let apply = severity.is_some() && !action.target_ts.is_empty();
    let selected = |value: &str| apply && action.selected_options.iter().any(|o| o == value);
    Plan::Classify(PromptChoice {
        channel: action.channel.clone(),
        target_ts: action.target_ts.clone(),
        prompt_ts: action.prompt_ts.clone(),
        severity: severity.filter(|_| apply),
        pin: selected(blocks::OPTION_PIN),
        forward: selected(blocks::OPTION_FORWARD),
    })
}

/// The bot's own reactions on `message` that conflict with `reaction`.
pub fn conflicting_bot_reactions(
    message: &Message,
    reaction: &str,
    bot_id: &str,
    emoji: &EmojiSet,
) -> Vec<String> {
    let base = reaction.split("::").next().unwrap_or(reaction);
    let conflicts = emoji.conflicts_with(base);
    message
        .reactions
        .iter()
        .filter(|r| r.applied_by(bot_id))
        .filter(|r| {
            let name = r.name.split("::").next().unwrap_or(&r.name);
            conflicts.contains(&name)
        })
        .map(|r| r.name.clone())
        .collect()
}

// ─────────────────────────────────────────────
// Reconciler
// ─────────────────────────────────────────────

/// Executes plans against Slack and refreshes the page.
pub struct Reconciler {
    client: SlackClient,
    builder: Arc<PageBuilder>,
    config: Arc<Config>,
    bot_id: String,
    emoji: EmojiSet,
}

impl Reconciler {
    pub fn new(
        client: SlackClient,
        builder: Arc<PageBuilder>,
        config: Arc<Config>,
        bot_id: impl Into<String>,
    ) -> Self {
        let emoji = config.emoji();
        Self {
            client,
            builder,
            config,
            bot_id: bot_id.into(),
            emoji,
        }
    }

    fn context(&self) -> PlanContext<'_> {
        PlanContext {
            bot_id: &self.bot_id,
            status_channel: &self.config.slack.status_channel,
            emoji: &self.emoji,
        }
    }

    fn status_channel(&self) -> &str {
        &self.config.slack.status_channel
    }

    /// Consume the queue one event at a time until it closes or shutdown.
    pub async fn run(&self, queue: Arc<EventQueue>, shutdown: Arc<Notify>) {
        info!("event worker started");
        loop {
            tokio::select! {
                event = queue.consume() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => {
                        info!("event queue closed, worker exiting");
                        break;
                    }
                },
                _ = shutdown.notified() => {
                    info!("event worker shutting down");
                    break;
                }
            }
        }
    }

    /// Handle one event. Returns whether a rebuild was triggered.
    pub async fn handle(&self, event: SlackEvent) -> bool {
        let plan = plan(&event, &self.context());
        debug!(kind = event.kind(), plan = ?plan, "planned event");

        let rebuild = match plan {
            Plan::Ignore => false,
            Plan::Rebuild => true,
            Plan::Mirror { ts, reaction } => self.mirror(&ts, &reaction).await,
            Plan::Unmirror { ts, reaction } => {
                if let Err(e) = self
                    .client
                    .remove_reaction(self.status_channel(), &ts, &reaction)
                    .await
                {
                    warn!(error = %e, ts = %ts, reaction = %reaction, "could not remove mirrored reaction");
                }
                true
            }
            Plan::Prompt { ts, author } => {
                if let Err(e) = self.post_prompt(&ts, &author).await {
                    warn!(error = %format!("{e:#}"), ts = %ts, "classification prompt abandoned");
                }
                true
            }
            Plan::Classify(choice) => {
                if let Err(e) = self.apply_choice(&choice).await {
                    warn!(error = %format!("{e:#}"), ts = %choice.target_ts, "prompt answer abandoned");
                }
                true
            }
        };

        if rebuild {
            // Failure is logged by the builder; the old snapshot stays live.
            let _ = self.builder.rebuild().await;
        }
        rebuild
    }

    /// Mirror a moderator's reaction. Returns whether the page may have changed.
    async fn mirror(&self, ts: &str, reaction: &str) -> bool {
        let message = match self.client.message_at(self.status_channel(), ts).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(ts = %ts, "reacted message not found");
                return false;
            }
            Err(e) => {
                warn!(error = %e, ts = %ts, "could not fetch reacted message");
                return false;
            }
        };
        if !message.mentions(&self.bot_id) {
            debug!(ts = %ts, "reaction on a message that does not mention the bot");
            return false;
        }

        if let Err(e) = self.mirror_onto(&message, reaction).await {
            warn!(error = %e, ts = %ts, reaction = %reaction, "mirroring abandoned");
        }
        true
    }

    async fn mirror_onto(&self, message: &Message, reaction: &str) -> Result<(), csp_slack::SlackError> {
        let channel = self.status_channel();
        for stale in conflicting_bot_reactions(message, reaction, &self.bot_id, &self.emoji) {
            debug!(ts = %message.ts, reaction = %stale, "clearing conflicting reaction");
            self.client.remove_reaction(channel, &message.ts, &stale).await?;
        }
        self.client.add_reaction(channel, &message.ts, reaction).await?;
        info!(ts = %message.ts, reaction = %reaction, "mirrored reaction");
        Ok(())
    }

    async fn post_prompt(&self, ts: &str, author: &str) -> anyhow::Result<()> {
        let forward = &self.config.slack.forward_channel;
        let forward_name = if forward.is_empty() {
            None
        } else {
            Some(
                self.client
                    .channel_name(forward)
                    .await
                    .context("resolving forward channel name")?,
            )
        };
        let blocks = prompt_blocks(author, forward_name.as_deref());
        self.client
            .post_message(self.status_channel(), PROMPT_FALLBACK, Some(ts), Some(blocks))
            .await
            .context("posting classification prompt")?;
        info!(ts = %ts, author = %author, "posted classification prompt");
        Ok(())
    }

    async fn apply_choice(&self, choice: &PromptChoice) -> anyhow::Result<()> {
        let channel = choice.channel.as_str();
        let ts = choice.target_ts.as_str();

        if let Some(severity) = choice.severity {
            if let Some(chosen) = self.emoji.for_severity(severity) {
                for other in self.emoji.conflicts_with(chosen) {
                    self.client
                        .remove_reaction(channel, ts, other)
                        .await
                        .context("clearing previous severity")?;
                }
                self.client
                    .add_reaction(channel, ts, chosen)
                    .await
                    .context("applying severity")?;
            }
        }

        if choice.pin {
            self.client.add_pin(channel, ts).await.context("pinning update")?;
            for other in self.emoji.conflicts_with(&self.emoji.pin) {
                self.client
                    .remove_reaction(channel, ts, other)
                    .await
                    .context("clearing current marker")?;
            }
            self.client
                .add_reaction(channel, ts, &self.emoji.pin)
                .await
                .context("marking update pinned")?;
        }

        if choice.forward {
            self.forward(channel, ts).await?;
        }

        self.client
            .delete_message(channel, &choice.prompt_ts)
            .await
            .context("deleting prompt")?;
        info!(ts = %ts, severity = ?choice.severity, pin = choice.pin, forward = choice.forward, "applied prompt answer");
        Ok(())
    }

    /// Repost an update's text, minus the bot mention, to the forward channel.
    async fn forward(&self, channel: &str, ts: &str) -> anyhow::Result<()> {
        let target = &self.config.slack.forward_channel;
        if target.is_empty() {
            warn!("forward requested but no forward channel is configured");
            return Ok(());
        }
        let Some(message) = self
            .client
            .message_at(channel, ts)
            .await
            .context("fetching update to forward")?
        else {
            bail!("update {ts} no longer exists");
        };
        let text = strip_mention(&message.text, &self.bot_id);
        self.client
            .post_message(target, &text, None, None)
            .await
            .context("forwarding update")?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
