//! Chat client error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("invalid chat configuration: {0}")]
    InvalidConfig(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("login authentication failed: {0}")]
    Auth(String),

    #[error("chat connection closed")]
    Closed,
}
