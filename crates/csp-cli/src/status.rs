//! `csp status`: show resolved configuration.
//!
//! - Config path and whether it exists
//! - Slack mode, channels and tokens (masked)
//! - Emoji mapping, page limits, reminder schedule and its next run

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use csp_core::config::{get_config_path, load_config, SlackMode};
use csp_core::utils::parse_timezone;

use crate::helpers::mask_secret;

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

/// Run the status command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    let config = load_config(Some(path.as_path()));
    let slack = &config.slack;
    let status = &config.status;

    println!();
    println!("{}", "📟 csp status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        path.display(),
        if path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );
    println!("  {:<18} {}", "Organization:".bold(), config.org.name);
    println!(
        "  {:<18} http://{}:{}/",
        "Listen:".bold(),
        config.gateway.host,
        config.gateway.port
    );

    // Slack
    println!();
    println!("  {}", "Slack:".bold());
    let mode = match slack.mode {
        SlackMode::Socket => "socket",
        SlackMode::Webhook => "webhook",
    };
    let ready = if slack.is_configured() {
        "✓".green().to_string()
    } else {
        "· incomplete".yellow().to_string()
    };
    println!("    {:<20} {} {}", "Mode", mode, ready);
    println!("    {:<20} {}", "Status channel", or_unset(&slack.status_channel));
    println!("    {:<20} {}", "Forward channel", or_unset(&slack.forward_channel));
    println!("    {:<20} {}", "Bot token", mask_secret(&slack.bot_token));
    println!("    {:<20} {}", "App token", mask_secret(&slack.app_token));
    println!("    {:<20} {}", "Signing secret", mask_secret(&slack.signing_secret));
    println!("    {:<20} {}", "History limit", slack.history_limit);

    // Page
    println!();
    println!("  {}", "Page:".bold());
    println!(
        "    {:<20} :{}: ok | :{}: warn | :{}: error",
        "Severity emoji", status.ok_emoji, status.warn_emoji, status.error_emoji
    );
    println!(
        "    {:<20} :{}: pin | :{}: current | :{}: sites",
        "Placement emoji", status.pin_emoji, status.current_emoji, status.site_emoji
    );
    println!("    {:<20} {}", "Pin limit", status.pin_limit);
    println!("    {:<20} {}", "Timezone", status.timezone);

    // Reminders
    println!();
    let tz = parse_timezone(&status.timezone);
    let reminders = if !config.reminders.enabled {
        format!("{}", "· disabled".dimmed())
    } else {
        match csp_cron::parse_schedule(&config.reminders.schedule) {
            Ok(schedule) => match csp_cron::next_fire(&schedule, tz, Utc::now()) {
                Some(next) => format!(
                    "{} `{}` (next: {})",
                    "✓".green(),
                    config.reminders.schedule,
                    next.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z")
                ),
                None => format!("{} `{}` never fires", "✗".red(), config.reminders.schedule),
            },
            Err(e) => format!("{} {e:#}", "✗".red()),
        }
    };
    println!("  {:<18} {}", "Reminders:".bold(), reminders);
    println!();

    Ok(())
}
