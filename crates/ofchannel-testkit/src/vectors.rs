//! Golden wire frames.
//!
//! Each vector pairs a message with the exact bytes it must encode to. Other
//! implementations of the channel can check their codecs against the JSON
//! export.

use bytes::Bytes;
use ofchannel_core::{
    decode, encode, Body, ErrorKind, Message, RequestedRole, Role, RoleReply, RoleRequest,
    VersionSet,
};
use serde::Serialize;

/// A golden wire vector.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Builds the message under test.
    pub build: fn() -> Message,
    /// Expected frame (hex).
    pub frame_hex: &'static str,
}

/// Serializable form of a vector.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub name: String,
    pub version: u8,
    pub type_code: u8,
    pub xid: u32,
    pub frame: String,
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "HELLO without elements",
            build: || Message::hello(4, 7),
            frame_hex: "0400000800000007",
        },
        WireVector {
            name: "HELLO with bitmap {1.0, 1.3}",
            build: || Message::hello_with_bitmap(4, 1, &versions(&[1, 4])),
            frame_hex: "04000010000000010001000800000012",
        },
        WireVector {
            name: "HELLO with bitmap {1.0, 1.3, 1.4, 1.5}",
            build: || Message::hello_with_bitmap(6, 2, &versions(&[1, 4, 5, 6])),
            frame_hex: "06000010000000020001000800000072",
        },
        WireVector {
            name: "ECHO_REQUEST with payload",
            build: || Message::new(4, 0x10, Body::EchoRequest(Bytes::from_static(b"ping"))),
            frame_hex: "0402000c0000001070696e67",
        },
        WireVector {
            name: "ROLE_REQUEST master generation 5",
            build: || {
                Message::new(
                    4,
                    0x2a,
                    Body::RoleRequest(RoleRequest {
                        role: RequestedRole::Master,
                        generation_id: 5,
                    }),
                )
            },
            frame_hex: "041800180000002a00000002000000000000000000000005",
        },
        WireVector {
            name: "ROLE_REPLY slave at maximum generation",
            build: || {
                Message::new(
                    4,
                    3,
                    Body::RoleReply(RoleReply {
                        role: Role::Slave,
                        generation_id: u64::MAX,
                    }),
                )
            },
            frame_hex: "04190018000000030000000300000000ffffffffffffffff",
        },
        WireVector {
            name: "ERROR role request stale",
            build: || Message::error(4, 9, ErrorKind::RoleStale, Bytes::new()),
            frame_hex: "0401000c00000009000b0000",
        },
        WireVector {
            name: "ERROR hello incompatible in 1.0",
            build: || Message::error(1, 0, ErrorKind::HelloIncompatible, Bytes::from_static(b"no")),
            frame_hex: "0101000e00000000000000006e6f",
        },
    ]
}

fn versions(v: &[u8]) -> VersionSet {
    match VersionSet::new(v.iter().copied()) {
        Ok(set) => set,
        Err(e) => panic!("bad vector version set {:?}: {}", v, e),
    }
}

/// Check one vector: encoding matches the frame and decoding gives the
/// message back.
pub fn verify_vector(vector: &WireVector) -> Result<(), String> {
    let message = (vector.build)();
    let frame = encode(&message).map_err(|e| format!("{}: encode failed: {}", vector.name, e))?;
    let actual = hex::encode(&frame);
    if actual != vector.frame_hex {
        return Err(format!(
            "{}: expected {}, got {}",
            vector.name, vector.frame_hex, actual
        ));
    }

    let bytes = hex::decode(vector.frame_hex)
        .map_err(|e| format!("{}: bad hex: {}", vector.name, e))?;
    let (decoded, used) =
        decode(&bytes).map_err(|e| format!("{}: decode failed: {}", vector.name, e))?;
    if used != bytes.len() || decoded != message {
        return Err(format!("{}: decoded {:?}", vector.name, decoded));
    }
    Ok(())
}

/// Verify every vector, collecting failures.
pub fn verify_all_vectors() -> Vec<String> {
    all_vectors()
        .iter()
        .filter_map(|v| verify_vector(v).err())
        .collect()
}

/// Export all vectors as pretty-printed JSON.
pub fn export_json() -> serde_json::Result<String> {
    let records: Vec<VectorRecord> = all_vectors()
        .iter()
        .map(|v| {
            let message = (v.build)();
            VectorRecord {
                name: v.name.to_string(),
                version: message.version,
                type_code: message.body.type_code(),
                xid: message.xid,
                frame: v.frame_hex.to_string(),
            }
        })
        .collect();
    serde_json::to_string_pretty(&records)
}
