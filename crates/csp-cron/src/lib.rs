//! Reminder scheduling.
//!
//! A single cron expression, evaluated in the status page's timezone,
//! drives one callback. No persistence: the schedule lives in config.

pub mod scheduler;

pub use scheduler::{next_fire, parse_schedule, OnFireFn, ReminderScheduler};
