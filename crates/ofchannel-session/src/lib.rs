//! # ofchannel-session
//!
//! Switch-side session for one OpenFlow controller connection.
//!
//! ## Overview
//!
//! A [`Session`] owns a transport binding for its whole life. It runs the
//! HELLO exchange, then answers role-change requests from the controller and
//! tells sibling connections of the same device to step down when a new
//! master is elected.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ofchannel_core::ResourceId;
//! use ofchannel_session::{
//!     transport::memory, ChannelRegistry, Endpoint, MemoryRegistry, Session, SessionConfig,
//! };
//!
//! async fn example() {
//!     let registry = Arc::new(MemoryRegistry::new());
//!     let (switch_side, _controller_side) = memory::pair();
//!
//!     let resource = ResourceId::new("dpid:0000000000000001");
//!     let (session, handle) = Session::new(
//!         resource.clone(),
//!         Endpoint::Accepted(Box::new(switch_side)),
//!         registry.clone(),
//!         SessionConfig::default(),
//!     );
//!     registry.register(&resource, handle.clone());
//!
//!     let termination = session.run().await;
//!     println!("session ended: {:?}", termination);
//! }
//! ```

pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

pub use error::{Result, SessionError, TransportError};
pub use registry::{ChannelRegistry, MemoryRegistry};
pub use session::{
    CloseReason, Endpoint, Session, SessionConfig, SessionHandle, SessionSnapshot, SessionState,
    Termination,
};
pub use transport::{
    bind_accepted, bind_tcp, dial, memory::MemoryTransport, RemotePeer, StreamTransport,
    Transport, TransportKind,
};
