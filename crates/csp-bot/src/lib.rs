//! The bot's behaviour on top of the Slack plumbing.
//!
//! - **reconciler**: turns inbound events into Slack side effects and page rebuilds
//! - **reminder**: periodic summary of long-pinned status updates

pub mod reconciler;
pub mod reminder;

pub use reconciler::{plan, Plan, PlanContext, PromptChoice, Reconciler};
pub use reminder::{compose_summary, scan, PinnedReminder, ReminderScanner, ScanOptions};
