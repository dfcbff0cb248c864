//! rollcast-chat — Twitch IRC-over-WebSocket chat client.
//!
//! Connects to Twitch chat at `wss://irc-ws.chat.twitch.tv:443`, joins one
//! channel, and dispatches `!command` messages to registered handlers as
//! independent tokio tasks. Outbound messages flow through a single writer
//! task; replies use Twitch's `reply-parent-msg-id` tag when the inbound
//! message carried an id.

pub mod client;
pub mod error;
pub mod irc;

pub use client::{
    ChatApi, ChatClient, ChatHandle, CommandContext, CommandHandler, HandlerFuture, ReadyState,
};
pub use error::ChatError;
pub use irc::{ParsedMessage, TwitchConfig};
