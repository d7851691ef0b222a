//! # OFChannel Core
//!
//! Pure primitives for OpenFlow channel sessions: wire messages, the HELLO
//! version negotiation, and controller role arbitration.
//!
//! This crate contains no I/O, no sockets, no tasks. It is pure computation
//! over protocol state.
//!
//! ## Key Types
//!
//! - [`Message`] / [`Body`] - Decoded OpenFlow frames for the bodies a channel session handles
//! - [`VersionSet`] - The ordered set of protocol versions a peer speaks
//! - [`Handshake`] - HELLO exchange state and its [`Negotiation`] outcome
//! - [`RoleState`] - Controller role plus generation id, updated by [`arbitrate`]
//!
//! ## Wire Format
//!
//! Frames use the OpenFlow header (`version`, `type`, `length`, `xid`). See
//! the [`codec`] module for the subset of bodies that is decoded.

pub mod codec;
pub mod error;
pub mod message;
pub mod negotiation;
pub mod role;
pub mod types;

pub use codec::{decode, encode, frame_length};
pub use error::{CodecError, CoreError};
pub use message::{Body, ErrorKind, ErrorMsg, HelloElement, Message, OFP_HEADER_LEN};
pub use negotiation::{agree, Handshake, Negotiation};
pub use role::{arbitrate, is_stale, Arbitration, RequestedRole, Role, RoleReply, RoleRequest, RoleState};
pub use types::{ResourceId, SessionId, VersionSet, Xid};
