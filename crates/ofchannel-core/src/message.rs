//! OpenFlow messages handled by a channel session.
//!
//! Only the bodies that take part in the handshake and role arbitration are
//! decoded. Every other message type is carried as [`Body::Unsupported`] so it
//! can be logged or re-encoded without loss.

use std::collections::BTreeSet;

use bytes::Bytes;

use crate::role::{RoleReply, RoleRequest};
use crate::types::{VersionSet, Xid};

/// Length of the common OpenFlow header.
pub const OFP_HEADER_LEN: usize = 8;

/// Protocol version numbers as carried in the header.
pub mod version {
    pub const OFP_1_0: u8 = 1;
    pub const OFP_1_1: u8 = 2;
    pub const OFP_1_2: u8 = 3;
    pub const OFP_1_3: u8 = 4;
    pub const OFP_1_4: u8 = 5;
    pub const OFP_1_5: u8 = 6;
}

/// Message type codes.
pub mod msg_type {
    pub const HELLO: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const ECHO_REQUEST: u8 = 2;
    pub const ECHO_REPLY: u8 = 3;
    pub const ROLE_REQUEST: u8 = 24;
    pub const ROLE_REPLY: u8 = 25;
}

/// HELLO element type carrying the supported-versions bitmap.
pub const HELLO_ELEM_VERSIONBITMAP: u16 = 1;

/// A decoded OpenFlow frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header version.
    pub version: u8,
    /// Transaction id.
    pub xid: Xid,
    /// Typed body.
    pub body: Body,
}

/// Message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Hello { elements: Vec<HelloElement> },
    Error(ErrorMsg),
    EchoRequest(Bytes),
    EchoReply(Bytes),
    RoleRequest(RoleRequest),
    RoleReply(RoleReply),
    /// Any message type outside the session's concern, kept verbatim.
    Unsupported { type_code: u8, payload: Bytes },
}

impl Body {
    /// Header type code of this body.
    pub fn type_code(&self) -> u8 {
        match self {
            Body::Hello { .. } => msg_type::HELLO,
            Body::Error(_) => msg_type::ERROR,
            Body::EchoRequest(_) => msg_type::ECHO_REQUEST,
            Body::EchoReply(_) => msg_type::ECHO_REPLY,
            Body::RoleRequest(_) => msg_type::ROLE_REQUEST,
            Body::RoleReply(_) => msg_type::ROLE_REPLY,
            Body::Unsupported { type_code, .. } => *type_code,
        }
    }
}

/// An element inside a HELLO body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloElement {
    /// Every version the sender supports.
    VersionBitmap(BTreeSet<u8>),
    /// Element type this side does not interpret.
    Unknown { element_type: u16, payload: Bytes },
}

/// ERROR body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub kind: ErrorKind,
    /// Free-form data; for requests this is usually the offending frame.
    pub data: Bytes,
}

/// `(type, code)` pairs of ERROR messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HELLO_FAILED / INCOMPATIBLE.
    HelloIncompatible,
    /// HELLO_FAILED / EPERM.
    HelloPermissionDenied,
    /// BAD_REQUEST / BAD_VERSION.
    BadVersion,
    /// BAD_REQUEST / BAD_TYPE.
    BadType,
    /// ROLE_REQUEST_FAILED / STALE.
    RoleStale,
    /// ROLE_REQUEST_FAILED / UNSUP.
    RoleUnsupported,
    /// ROLE_REQUEST_FAILED / BAD_ROLE.
    BadRole,
    Other { error_type: u16, code: u16 },
}

const HELLO_FAILED: u16 = 0;
const BAD_REQUEST: u16 = 1;
const ROLE_REQUEST_FAILED: u16 = 11;

impl ErrorKind {
    /// Wire `(type, code)` pair.
    pub const fn codes(self) -> (u16, u16) {
        match self {
            ErrorKind::HelloIncompatible => (HELLO_FAILED, 0),
            ErrorKind::HelloPermissionDenied => (HELLO_FAILED, 1),
            ErrorKind::BadVersion => (BAD_REQUEST, 0),
            ErrorKind::BadType => (BAD_REQUEST, 1),
            ErrorKind::RoleStale => (ROLE_REQUEST_FAILED, 0),
            ErrorKind::RoleUnsupported => (ROLE_REQUEST_FAILED, 1),
            ErrorKind::BadRole => (ROLE_REQUEST_FAILED, 2),
            ErrorKind::Other { error_type, code } => (error_type, code),
        }
    }

    /// Map a wire `(type, code)` pair.
    pub const fn from_codes(error_type: u16, code: u16) -> Self {
        match (error_type, code) {
            (HELLO_FAILED, 0) => ErrorKind::HelloIncompatible,
            (HELLO_FAILED, 1) => ErrorKind::HelloPermissionDenied,
            (BAD_REQUEST, 0) => ErrorKind::BadVersion,
            (BAD_REQUEST, 1) => ErrorKind::BadType,
            (ROLE_REQUEST_FAILED, 0) => ErrorKind::RoleStale,
            (ROLE_REQUEST_FAILED, 1) => ErrorKind::RoleUnsupported,
            (ROLE_REQUEST_FAILED, 2) => ErrorKind::BadRole,
            _ => ErrorKind::Other { error_type, code },
        }
    }
}

impl Message {
    /// Create a message.
    pub fn new(version: u8, xid: Xid, body: Body) -> Self {
        Self { version, xid, body }
    }

    /// HELLO without elements.
    pub fn hello(version: u8, xid: Xid) -> Self {
        Self::new(version, xid, Body::Hello { elements: Vec::new() })
    }

    /// HELLO carrying a version bitmap for `versions`.
    pub fn hello_with_bitmap(version: u8, xid: Xid, versions: &VersionSet) -> Self {
        Self::new(
            version,
            xid,
            Body::Hello {
                elements: vec![HelloElement::VersionBitmap(versions.as_set().clone())],
            },
        )
    }

    /// ERROR message.
    pub fn error(version: u8, xid: Xid, kind: ErrorKind, data: impl Into<Bytes>) -> Self {
        Self::new(
            version,
            xid,
            Body::Error(ErrorMsg {
                kind,
                data: data.into(),
            }),
        )
    }

    /// Whether the body is a HELLO.
    pub fn is_hello(&self) -> bool {
        matches!(self.body, Body::Hello { .. })
    }

    /// The version bitmap of a HELLO, if it carries one.
    pub fn version_bitmap(&self) -> Option<&BTreeSet<u8>> {
        match &self.body {
            Body::Hello { elements } => elements.iter().find_map(|e| match e {
                HelloElement::VersionBitmap(versions) => Some(versions),
                HelloElement::Unknown { .. } => None,
            }),
            _ => None,
        }
    }

    /// ERROR kind, if this is an ERROR message.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.body {
            Body::Error(err) => Some(err.kind),
            _ => None,
        }
    }
}
