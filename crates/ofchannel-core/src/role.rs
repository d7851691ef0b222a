//! Controller role arbitration.
//!
//! A controller claims `Master` or `Slave` together with a 64-bit generation
//! id. Claims are ordered by the sign of the wrapped difference between the
//! requested and the recorded generation id, so the counter may wrap without
//! making fresh claims look stale.

use serde::{Deserialize, Serialize};

/// Role of a connection with respect to write authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sole writer for the device.
    Master,
    /// Read-only.
    Slave,
    /// Default symmetric standing before any arbitration.
    #[default]
    Equal,
}

impl Role {
    /// Wire value used in ROLE_REQUEST / ROLE_REPLY bodies.
    pub const fn to_wire(self) -> u32 {
        match self {
            Role::Equal => 1,
            Role::Master => 2,
            Role::Slave => 3,
        }
    }

    /// Parse a wire value. `NOCHANGE` (0) is not a role.
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Role::Equal),
            2 => Some(Role::Master),
            3 => Some(Role::Slave),
            _ => None,
        }
    }
}

/// Role asked for in a role-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedRole {
    /// Query only.
    NoChange,
    Equal,
    Master,
    Slave,
}

impl RequestedRole {
    pub const fn to_wire(self) -> u32 {
        match self {
            RequestedRole::NoChange => 0,
            RequestedRole::Equal => 1,
            RequestedRole::Master => 2,
            RequestedRole::Slave => 3,
        }
    }

    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(RequestedRole::NoChange),
            1 => Some(RequestedRole::Equal),
            2 => Some(RequestedRole::Master),
            3 => Some(RequestedRole::Slave),
            _ => None,
        }
    }
}

/// ROLE_REQUEST body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRequest {
    pub role: RequestedRole,
    /// Ignored for `NoChange` and `Equal`.
    pub generation_id: u64,
}

/// ROLE_REPLY body: the role and generation id after applying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleReply {
    pub role: Role,
    pub generation_id: u64,
}

/// Role and generation id held by one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleState {
    /// Current role.
    pub role: Role,
    /// Last accepted generation id; `None` until the first master/slave claim.
    pub generation_id: Option<u64>,
}

impl RoleState {
    /// Fresh state: `Equal`, no generation id.
    pub const fn new() -> Self {
        Self {
            role: Role::Equal,
            generation_id: None,
        }
    }

    /// Reply describing this state. An undefined generation id is reported as 0.
    pub fn reply(&self) -> RoleReply {
        RoleReply {
            role: self.role,
            generation_id: self.generation_id.unwrap_or(0),
        }
    }

    /// Become slave because a sibling connection became master.
    ///
    /// The generation id is left untouched.
    pub fn demote(&mut self) {
        self.role = Role::Slave;
    }
}

/// Outcome of applying a role-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// Request accepted; `state` is the new session state.
    Accepted {
        state: RoleState,
        reply: RoleReply,
        /// Other connections of the same device must become slaves.
        demote_siblings: bool,
    },
    /// Generation id is older than the recorded one; nothing changed.
    Stale {
        current: u64,
        requested: u64,
    },
}

/// Whether `requested` lies in the past relative to `current`.
///
/// The difference is taken modulo 2^64 and read as a signed value.
pub const fn is_stale(current: u64, requested: u64) -> bool {
    (requested.wrapping_sub(current) as i64) < 0
}

/// Apply a role-change request to the current state.
pub fn arbitrate(current: &RoleState, request: &RoleRequest) -> Arbitration {
    let role = match request.role {
        RequestedRole::NoChange => {
            return Arbitration::Accepted {
                state: *current,
                reply: current.reply(),
                demote_siblings: false,
            };
        }
        RequestedRole::Equal => {
            let state = RoleState {
                role: Role::Equal,
                generation_id: current.generation_id,
            };
            return Arbitration::Accepted {
                state,
                reply: state.reply(),
                demote_siblings: false,
            };
        }
        RequestedRole::Master => Role::Master,
        RequestedRole::Slave => Role::Slave,
    };

    if let Some(recorded) = current.generation_id {
        if is_stale(recorded, request.generation_id) {
            return Arbitration::Stale {
                current: recorded,
                requested: request.generation_id,
            };
        }
    }

    let state = RoleState {
        role,
        generation_id: Some(request.generation_id),
    };
    Arbitration::Accepted {
        state,
        reply: state.reply(),
        demote_siblings: role == Role::Master,
    }
}
