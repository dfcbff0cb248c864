//! rollcast-engine — command records, configuration, and the dispatcher.
//!
//! Ties the dice roller, overlay manager, chat client, and script sandbox
//! together. Each command owns a lock that serializes its invocations;
//! the dispatcher walks roll → show → wait → hide → reply → script under
//! that lock and releases it on every exit path.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;

pub use command::Command;
pub use config::{BotConfig, CommandConfig, DisplaySection, ObsSection};
pub use dispatcher::Dispatcher;
pub use error::EngineError;
