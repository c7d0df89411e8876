//! Reminder scheduler: sleeps until the next cron fire time, then invokes
//! the callback.
//!
//! Timer loop:
//! 1. Compute the next fire time after now, in the configured timezone
//! 2. Sleep until then (or until shutdown)
//! 3. Run the callback to completion, log its outcome, repeat
//!
//! A fire time missed while the callback was running is skipped, not queued.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

// ─────────────────────────────────────────────
// Callback type
// ─────────────────────────────────────────────

/// Callback invoked on every fire. In `serve` this wraps
/// `ReminderScanner::scan_and_notify(false)`.
pub type OnFireFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

// ─────────────────────────────────────────────
// Schedule helpers
// ─────────────────────────────────────────────

/// Parse a cron expression (seconds field first, e.g. `0 0 14 * * Mon-Fri`).
pub fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(expr.trim()).with_context(|| format!("invalid cron expression {expr:?}"))
}

/// First fire time strictly after `after`, with the expression read as
/// wall-clock time in `tz`.
pub fn next_fire(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

// ─────────────────────────────────────────────
// ReminderScheduler
// ─────────────────────────────────────────────

pub struct ReminderScheduler {
    schedule: Schedule,
    tz: Tz,
    on_fire: OnFireFn,
    shutdown: Arc<Notify>,
}

impl ReminderScheduler {
    pub fn new(expr: &str, tz: Tz, on_fire: OnFireFn, shutdown: Arc<Notify>) -> anyhow::Result<Self> {
        Ok(Self {
            schedule: parse_schedule(expr)?,
            tz,
            on_fire,
            shutdown,
        })
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_fire(&self.schedule, self.tz, after)
    }

    /// Run until shutdown is signalled or the schedule is exhausted.
    pub async fn run(&self) {
        info!(timezone = %self.tz, "reminder scheduler started");

        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire(now) else {
                warn!("schedule has no upcoming fire time, reminder scheduler stopping");
                return;
            };
            let delay = (next - now).to_std().unwrap_or_default();
            debug!(next = %next, sleep_ms = delay.as_millis() as u64, "reminder timer armed");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    info!("running scheduled reminder scan");
                    if let Err(e) = (self.on_fire)().await {
                        error!(error = %format!("{e:#}"), "scheduled reminder scan failed");
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("reminder scheduler shutting down");
                    return;
                }
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
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_parse_schedule() {
        assert!(parse_schedule("0 0 14 * * Mon-Fri").is_ok());
        assert!(parse_schedule(" 0 */5 * * * * ").is_ok());
        let err = parse_schedule("every tuesday").unwrap_err();
        assert!(err.to_string().contains("every tuesday"));
    }

    #[test]
    fn test_next_fire_skips_weekend_in_timezone() {
        let schedule = parse_schedule("0 0 14 * * Mon-Fri").unwrap();
        // Friday 2023-11-17 15:00 in New York, after that day's fire.
        let friday = Utc.with_ymd_and_hms(2023, 11, 17, 20, 0, 0).unwrap();
        let next = next_fire(&schedule, chrono_tz::America::New_York, friday).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 11, 20, 19, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fire_is_strictly_after() {
        let schedule = parse_schedule("0 0 * * * *").unwrap();
        let on_the_hour = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = next_fire(&schedule, chrono_tz::UTC, on_the_hour).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_run_fires_and_stops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_notify = Arc::new(Notify::new());
        let on_fire: OnFireFn = {
            let fired = fired.clone();
            let fired_notify = fired_notify.clone();
            Arc::new(move || {
                let fired = fired.clone();
                let fired_notify = fired_notify.clone();
                Box::pin(async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                    fired_notify.notify_one();
                    Err(anyhow::anyhow!("scan failures are logged, not fatal"))
                })
            })
        };
        let shutdown = Arc::new(Notify::new());
        let scheduler = Arc::new(
            ReminderScheduler::new("* * * * * *", chrono_tz::UTC, on_fire, shutdown.clone()).unwrap(),
        );

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };

        tokio::time::timeout(Duration::from_secs(3), fired_notify.notified())
            .await
            .unwrap();
        assert!(fired.load(Ordering::SeqCst) >= 1);

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_invalid_expression_rejected_by_constructor() {
        let on_fire: OnFireFn = Arc::new(|| Box::pin(async { Ok(()) }));
        let result = ReminderScheduler::new("61 * * * * *", chrono_tz::UTC, on_fire, Arc::new(Notify::new()));
        assert!(result.is_err());
    }
}
