//! # ofchannel
//!
//! Switch-side OpenFlow channel handling: one session per controller
//! connection, with version negotiation and master/slave role arbitration.
//!
//! ## Overview
//!
//! - **Negotiation**: HELLO exchange picks the highest common version, or
//!   fails the connection with `HELLO_FAILED`.
//! - **Roles**: controllers claim master or slave with a generation id; stale
//!   claims are rejected, and a new master demotes its siblings.
//! - **Lifecycle**: a session reports whether it ended normally or on a fault.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ofchannel::{Channel, ChannelConfig, MemoryRegistry, ResourceId};
//!
//! async fn example() -> ofchannel::Result<()> {
//!     let registry = Arc::new(MemoryRegistry::new());
//!     let channel = Channel::new(&ChannelConfig::from_env()?, registry)?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:6653").await.unwrap();
//!     loop {
//!         let (stream, _) = listener.accept().await.unwrap();
//!         channel.accept_tcp(ResourceId::new("dpid:0000000000000001"), stream);
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `ofchannel::core` - wire messages, negotiation and arbitration
//! - `ofchannel::session` - transports, sessions and the registry

pub mod channel;
pub mod config;
pub mod error;

// Re-export component crates
pub use ofchannel_core as core;
pub use ofchannel_session as session;

// Re-export main types for convenience
pub use channel::{Channel, SpawnedSession};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};

pub use ofchannel_core::{ResourceId, Role, SessionId};
pub use ofchannel_session::{
    ChannelRegistry, CloseReason, MemoryRegistry, RemotePeer, SessionConfig, SessionHandle,
    SessionSnapshot, SessionState, Termination, TransportKind,
};
