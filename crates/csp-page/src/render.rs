//! HTML page rendering (minijinja).
//!
//! The template is compiled into the binary. Card bodies are already
//! sanitized by [`crate::mrkdwn`] and are emitted with `|safe`; everything
//! else goes through minijinja's HTML auto-escaping.

use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;

use csp_core::config::schema::StatusConfig;
use csp_core::types::{Severity, Site, StatusUpdate};
use csp_core::Config;

use crate::snapshot::ChannelSnapshot;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

// ─────────────────────────────────────────────
// View models
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CardView<'a> {
    html: &'a str,
    sent_by: &'a str,
    timestamp: &'a str,
    css_class: &'static str,
    icon: &'static str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct SiteView<'a> {
    name: &'a str,
    css_class: &'static str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct OrgView<'a> {
    name: &'a str,
    logo_url: &'a str,
    favicon_url: &'a str,
    help_message: &'a str,
}

#[derive(Debug, Serialize)]
struct PageView<'a> {
    org: OrgView<'a>,
    current: CardView<'a>,
    pinned: Vec<CardView<'a>>,
    updates: Vec<CardView<'a>>,
    sites: Vec<SiteView<'a>>,
    built_at: Option<String>,
}

fn color_for(status: &StatusConfig, severity: Severity) -> &str {
    match severity {
        Severity::Neutral => &status.neutral_color,
        Severity::Ok => &status.ok_color,
        Severity::Warn => &status.warn_color,
        Severity::Error => &status.error_color,
    }
}

fn card<'a>(update: &'a StatusUpdate, status: &'a StatusConfig) -> CardView<'a> {
    CardView {
        html: &update.html,
        sent_by: &update.sent_by,
        timestamp: &update.timestamp,
        css_class: update.severity.css_class(),
        icon: update.severity.icon(),
        color: color_for(status, update.severity),
    }
}

fn site<'a>(site: &'a Site, status: &'a StatusConfig) -> SiteView<'a> {
    SiteView {
        name: &site.name,
        css_class: site.severity.css_class(),
        color: color_for(status, site.severity),
    }
}

// ─────────────────────────────────────────────
// PageRenderer
// ─────────────────────────────────────────────

/// Renders a snapshot into the public status page.
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(&self, snapshot: &ChannelSnapshot, config: &Config) -> Result<String, RenderError> {
        let status = &config.status;
        let page = &snapshot.page;
        let view = PageView {
            org: OrgView {
                name: &config.org.name,
                logo_url: &config.org.logo_url,
                favicon_url: &config.org.favicon_url,
                help_message: &config.org.help_message,
            },
            current: card(&page.current, status),
            pinned: page.pinned.iter().map(|u| card(u, status)).collect(),
            updates: page.updates.iter().map(|u| card(u, status)).collect(),
            sites: page.sites.iter().map(|s| site(s, status)).collect(),
            built_at: snapshot
                .built_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        };
        let template = self.env.get_template("index.html")?;
        Ok(template.render(&view)?)
    }
}
