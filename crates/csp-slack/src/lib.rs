//! Slack plumbing for the status page bot.
//!
//! This crate provides:
//! - **client**: `SlackClient`, the Web API calls the bot needs
//! - **events**: `SlackEvent`, the closed set of inbound events
//! - **blocks**: the interactive classification prompt
//! - **queue**: `EventQueue`, the serialized hand-off to the event worker
//! - **socket**: Socket Mode listener feeding the queue
//! - **signature**: request-signature verification for webhook mode

pub mod blocks;
pub mod client;
pub mod events;
pub mod queue;
pub mod signature;
pub mod socket;

pub use client::{SlackClient, SlackError};
pub use events::{BlockAction, SlackEvent};
pub use queue::EventQueue;
pub use signature::SignatureError;
pub use socket::SocketListener;
