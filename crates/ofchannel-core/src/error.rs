//! Error types for the OFChannel Core.

use thiserror::Error;

/// Errors raised while building core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("version set must not be empty")]
    EmptyVersionSet,

    #[error("protocol version {0} is out of range (1..=31)")]
    VersionOutOfRange(u8),
}

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("header declares invalid length {0}")]
    BadLength(usize),

    #[error("frame of {0} bytes exceeds the 16-bit length field")]
    FrameTooLarge(usize),

    #[error("invalid role value {0}")]
    BadRoleValue(u32),

    #[error("malformed hello element: {0}")]
    BadElement(String),
}
