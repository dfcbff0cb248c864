//! Engine errors.

use thiserror::Error;

/// Errors from configuration loading, command registration, and dispatch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("command '{command}' failed to register: {reason}")]
    Registration { command: String, reason: String },

    #[error(transparent)]
    Obs(#[from] rollcast_obs::ObsError),

    #[error(transparent)]
    Chat(#[from] rollcast_chat::ChatError),
}
