//! Error types for channel sessions.

use std::io;

use ofchannel_core::CodecError;
use thiserror::Error;

use crate::transport::TransportKind;

/// Errors raised by a transport binding.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Dialing the remote peer failed (refused, unreachable, timed out).
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The remote end closed the connection at a frame boundary.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The binding was closed locally.
    #[error("transport is closed")]
    Closed,

    /// A frame header declared a length shorter than the header itself.
    #[error("frame header declares length {0}")]
    FrameTooShort(usize),

    /// The requested transport kind cannot be dialed by this crate.
    #[error("transport kind {0} is not supported for dialing")]
    Unsupported(TransportKind),

    /// Any other I/O fault.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Sort an I/O error into peer hang-ups and other faults.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::PeerClosed,
            _ => TransportError::Io(err),
        }
    }
}

/// Faults that end a session abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
