//! Config loader: reads `~/.csp/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.csp/config.json` (or an explicit path)
//! 3. Environment variables `CSP_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, SlackMode};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given (or default) path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `CSP_<SECTION>__<FIELD>` (double underscore as delimiter),
/// e.g. `CSP_SLACK__BOT_TOKEN` → `slack.bot_token`.
fn apply_env_overrides(mut config: Config) -> Config {
    // Org branding
    override_string(&mut config.org.name, "CSP_ORG__NAME");
    override_string(&mut config.org.logo_url, "CSP_ORG__LOGO_URL");
    override_string(&mut config.org.favicon_url, "CSP_ORG__FAVICON_URL");
    override_string(&mut config.org.help_message, "CSP_ORG__HELP_MESSAGE");

    // Slack
    override_string(&mut config.slack.bot_token, "CSP_SLACK__BOT_TOKEN");
    override_string(&mut config.slack.app_token, "CSP_SLACK__APP_TOKEN");
    override_string(&mut config.slack.signing_secret, "CSP_SLACK__SIGNING_SECRET");
    override_string(&mut config.slack.status_channel, "CSP_SLACK__STATUS_CHANNEL");
    override_string(&mut config.slack.forward_channel, "CSP_SLACK__FORWARD_CHANNEL");
    override_string(&mut config.slack.api_base, "CSP_SLACK__API_BASE");
    override_parsed(&mut config.slack.history_limit, "CSP_SLACK__HISTORY_LIMIT");
    if let Ok(val) = std::env::var("CSP_SLACK__MODE") {
        match val.to_ascii_lowercase().as_str() {
            "socket" => config.slack.mode = SlackMode::Socket,
            "webhook" => config.slack.mode = SlackMode::Webhook,
            other => warn!(mode = %other, "ignoring unknown CSP_SLACK__MODE"),
        }
    }

    // Status classification
    let status = &mut config.status;
    override_string(&mut status.neutral_color, "CSP_STATUS__NEUTRAL_COLOR");
    override_string(&mut status.ok_color, "CSP_STATUS__OK_COLOR");
    override_string(&mut status.ok_emoji, "CSP_STATUS__OK_EMOJI");
    override_string(&mut status.warn_color, "CSP_STATUS__WARN_COLOR");
    override_string(&mut status.warn_emoji, "CSP_STATUS__WARN_EMOJI");
    override_string(&mut status.error_color, "CSP_STATUS__ERROR_COLOR");
    override_string(&mut status.error_emoji, "CSP_STATUS__ERROR_EMOJI");
    override_string(&mut status.pin_emoji, "CSP_STATUS__PIN_EMOJI");
    override_string(&mut status.current_emoji, "CSP_STATUS__CURRENT_EMOJI");
    override_string(&mut status.site_emoji, "CSP_STATUS__SITE_EMOJI");
    override_parsed(&mut status.pin_limit, "CSP_STATUS__PIN_LIMIT");
    override_string(&mut status.nominal_message, "CSP_STATUS__NOMINAL_MESSAGE");
    override_string(&mut status.nominal_sent_by, "CSP_STATUS__NOMINAL_SENT_BY");
    override_string(&mut status.timezone, "CSP_STATUS__TIMEZONE");

    // Reminders
    if let Ok(val) = std::env::var("CSP_REMINDERS__ENABLED") {
        config.reminders.enabled = val == "true" || val == "1";
    }
    override_string(&mut config.reminders.schedule, "CSP_REMINDERS__SCHEDULE");
    override_parsed(&mut config.reminders.min_age_hours, "CSP_REMINDERS__MIN_AGE_HOURS");

    // Gateway
    override_string(&mut config.gateway.host, "CSP_GATEWAY__HOST");
    override_parsed(&mut config.gateway.port, "CSP_GATEWAY__PORT");

    config
}

fn override_string(field: &mut String, var: &str) {
    if let Ok(val) = std::env::var(var) {
        *field = val;
    }
}

fn override_parsed<T: std::str::FromStr>(field: &mut T, var: &str) {
    if let Ok(val) = std::env::var(var) {
        match val.parse::<T>() {
            Ok(parsed) => *field = parsed,
            Err(_) => warn!(var = %var, value = %val, "ignoring unparseable env override"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
