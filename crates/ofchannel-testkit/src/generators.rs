//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use ofchannel_core::message::version;
use ofchannel_core::{
    Body, ErrorKind, Message, RequestedRole, Role, RoleReply, RoleRequest, RoleState, VersionSet,
};

/// Generate any generation id, with the wrap-around edges overrepresented.
pub fn generation_id() -> impl Strategy<Value = u64> {
    prop_oneof![
        any::<u64>(),
        Just(0u64),
        Just(u64::MAX),
        Just(i64::MAX as u64),
        Just(i64::MAX as u64 + 1),
    ]
}

/// Generate a Role.
pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Master), Just(Role::Slave), Just(Role::Equal)]
}

/// Generate a RequestedRole.
pub fn requested_role() -> impl Strategy<Value = RequestedRole> {
    prop_oneof![
        Just(RequestedRole::NoChange),
        Just(RequestedRole::Equal),
        Just(RequestedRole::Master),
        Just(RequestedRole::Slave),
    ]
}

/// Generate a role-change request.
pub fn role_request() -> impl Strategy<Value = RoleRequest> {
    (requested_role(), generation_id()).prop_map(|(role, generation_id)| RoleRequest {
        role,
        generation_id,
    })
}

/// Generate a session role state, with or without a generation id.
pub fn role_state() -> impl Strategy<Value = RoleState> {
    (role(), proptest::option::of(generation_id()))
        .prop_map(|(role, generation_id)| RoleState { role, generation_id })
}

/// Generate a non-empty version set within the released versions.
pub fn version_set() -> impl Strategy<Value = VersionSet> {
    prop::collection::btree_set(version::OFP_1_0..=version::OFP_1_5, 1..=4)
        .prop_filter_map("empty version set", |set| VersionSet::new(set).ok())
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// Generate an error kind with a known `(type, code)` pair.
pub fn error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::HelloIncompatible),
        Just(ErrorKind::HelloPermissionDenied),
        Just(ErrorKind::BadVersion),
        Just(ErrorKind::BadType),
        Just(ErrorKind::RoleStale),
        Just(ErrorKind::RoleUnsupported),
        Just(ErrorKind::BadRole),
    ]
}

/// Generate a message the session understands.
pub fn message() -> impl Strategy<Value = Message> {
    let body = prop_oneof![
        version_set().prop_map(|set| {
            Message::hello_with_bitmap(set.highest(), 0, &set).body
        }),
        (error_kind(), payload(32)).prop_map(|(kind, data)| {
            Message::error(0, 0, kind, data).body
        }),
        payload(64).prop_map(Body::EchoRequest),
        payload(64).prop_map(Body::EchoReply),
        role_request().prop_map(Body::RoleRequest),
        (role(), generation_id())
            .prop_map(|(role, generation_id)| Body::RoleReply(RoleReply { role, generation_id })),
    ];
    (version::OFP_1_0..=version::OFP_1_5, any::<u32>(), body)
        .prop_map(|(version, xid, body)| Message::new(version, xid, body))
}
