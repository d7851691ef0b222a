//! Error types for the channel facade.

use ofchannel_core::CoreError;
use ofchannel_session::SessionError;
use thiserror::Error;

/// Errors that can occur while configuring or running channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid version set or other core value.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
