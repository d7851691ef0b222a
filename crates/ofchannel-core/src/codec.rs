//! Wire encoding for channel-session messages.
//!
//! Frame layout (all integers big-endian):
//!
//! ```text
//! +---------+------+--------+-----+----------------------+
//! | version | type | length | xid | body (length - 8)    |
//! |   u8    |  u8  |  u16   | u32 |                      |
//! +---------+------+--------+-----+----------------------+
//! ```
//!
//! HELLO elements are `type u16 | length u16 | payload`, padded to a multiple
//! of 8 bytes. ROLE bodies are `role u32 | pad[4] | generation_id u64`.

use std::collections::BTreeSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::message::{
    msg_type, Body, ErrorKind, ErrorMsg, HelloElement, Message, HELLO_ELEM_VERSIONBITMAP,
    OFP_HEADER_LEN,
};
use crate::role::{RequestedRole, Role, RoleReply, RoleRequest};

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

const HELLO_ELEM_HEADER_LEN: usize = 4;
const ERROR_HEADER_LEN: usize = 4;
const ROLE_BODY_LEN: usize = 16;

/// Read the total frame length declared by a header.
pub fn frame_length(header: &[u8; OFP_HEADER_LEN]) -> Result<usize> {
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    if length < OFP_HEADER_LEN {
        return Err(CodecError::BadLength(length));
    }
    Ok(length)
}

/// Encode a message into one frame.
pub fn encode(message: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(OFP_HEADER_LEN + 16);
    buf.put_u8(message.version);
    buf.put_u8(message.body.type_code());
    buf.put_u16(0); // patched below
    buf.put_u32(message.xid);

    match &message.body {
        Body::Hello { elements } => {
            for element in elements {
                encode_hello_element(element, &mut buf);
            }
        }
        Body::Error(err) => {
            let (error_type, code) = err.kind.codes();
            buf.put_u16(error_type);
            buf.put_u16(code);
            buf.put_slice(&err.data);
        }
        Body::EchoRequest(payload) | Body::EchoReply(payload) => buf.put_slice(payload),
        Body::RoleRequest(req) => put_role_body(&mut buf, req.role.to_wire(), req.generation_id),
        Body::RoleReply(reply) => {
            put_role_body(&mut buf, reply.role.to_wire(), reply.generation_id)
        }
        Body::Unsupported { payload, .. } => buf.put_slice(payload),
    }

    let length = buf.len();
    if length > u16::MAX as usize {
        return Err(CodecError::FrameTooLarge(length));
    }
    buf[2..4].copy_from_slice(&(length as u16).to_be_bytes());
    Ok(buf.freeze())
}

/// Decode one frame from the start of `buf`.
///
/// Returns the message and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < OFP_HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: OFP_HEADER_LEN,
            available: buf.len(),
        });
    }
    let mut header = [0u8; OFP_HEADER_LEN];
    header.copy_from_slice(&buf[..OFP_HEADER_LEN]);
    let length = frame_length(&header)?;
    if buf.len() < length {
        return Err(CodecError::Truncated {
            needed: length,
            available: buf.len(),
        });
    }

    let mut cursor = &header[..];
    let version = cursor.get_u8();
    let type_code = cursor.get_u8();
    cursor.advance(2);
    let xid = cursor.get_u32();

    let body = decode_body(type_code, &buf[OFP_HEADER_LEN..length])?;
    Ok((Message { version, xid, body }, length))
}

fn decode_body(type_code: u8, payload: &[u8]) -> Result<Body> {
    let body = match type_code {
        msg_type::HELLO => Body::Hello {
            elements: decode_hello_elements(payload)?,
        },
        msg_type::ERROR => {
            ensure_len(payload, ERROR_HEADER_LEN)?;
            let mut cursor = payload;
            let error_type = cursor.get_u16();
            let code = cursor.get_u16();
            Body::Error(ErrorMsg {
                kind: ErrorKind::from_codes(error_type, code),
                data: Bytes::copy_from_slice(cursor),
            })
        }
        msg_type::ECHO_REQUEST => Body::EchoRequest(Bytes::copy_from_slice(payload)),
        msg_type::ECHO_REPLY => Body::EchoReply(Bytes::copy_from_slice(payload)),
        msg_type::ROLE_REQUEST => {
            let (value, generation_id) = get_role_body(payload)?;
            let role = RequestedRole::from_wire(value).ok_or(CodecError::BadRoleValue(value))?;
            Body::RoleRequest(RoleRequest {
                role,
                generation_id,
            })
        }
        msg_type::ROLE_REPLY => {
            let (value, generation_id) = get_role_body(payload)?;
            let role = Role::from_wire(value).ok_or(CodecError::BadRoleValue(value))?;
            Body::RoleReply(RoleReply {
                role,
                generation_id,
            })
        }
        other => Body::Unsupported {
            type_code: other,
            payload: Bytes::copy_from_slice(payload),
        },
    };
    Ok(body)
}

fn encode_hello_element(element: &HelloElement, buf: &mut BytesMut) {
    let start = buf.len();
    match element {
        HelloElement::VersionBitmap(versions) => {
            buf.put_u16(HELLO_ELEM_VERSIONBITMAP);
            buf.put_u16(0);
            for word in bitmap_words(versions) {
                buf.put_u32(word);
            }
        }
        HelloElement::Unknown {
            element_type,
            payload,
        } => {
            buf.put_u16(*element_type);
            buf.put_u16(0);
            buf.put_slice(payload);
        }
    }
    let length = buf.len() - start;
    buf[start + 2..start + 4].copy_from_slice(&(length as u16).to_be_bytes());
    buf.put_bytes(0, padded(length) - length);
}

fn decode_hello_elements(mut payload: &[u8]) -> Result<Vec<HelloElement>> {
    let mut elements = Vec::new();
    // anything shorter than an element header is trailing padding
    while payload.len() >= HELLO_ELEM_HEADER_LEN {
        let mut cursor = payload;
        let element_type = cursor.get_u16();
        let length = cursor.get_u16() as usize;
        if length < HELLO_ELEM_HEADER_LEN || length > payload.len() {
            return Err(CodecError::BadElement(format!(
                "element type {} declares length {} with {} bytes left",
                element_type,
                length,
                payload.len()
            )));
        }
        let content = &payload[HELLO_ELEM_HEADER_LEN..length];

        let element = if element_type == HELLO_ELEM_VERSIONBITMAP {
            HelloElement::VersionBitmap(versions_from_bitmap(content)?)
        } else {
            HelloElement::Unknown {
                element_type,
                payload: Bytes::copy_from_slice(content),
            }
        };
        elements.push(element);

        payload = &payload[padded(length).min(payload.len())..];
    }
    Ok(elements)
}

fn bitmap_words(versions: &BTreeSet<u8>) -> Vec<u32> {
    let highest = versions.iter().next_back().copied().unwrap_or(0);
    let mut words = vec![0u32; highest as usize / 32 + 1];
    for &v in versions {
        words[v as usize / 32] |= 1 << (v % 32);
    }
    words
}

fn versions_from_bitmap(content: &[u8]) -> Result<BTreeSet<u8>> {
    if content.len() % 4 != 0 {
        return Err(CodecError::BadElement(format!(
            "version bitmap of {} bytes is not a whole number of words",
            content.len()
        )));
    }
    let mut versions = BTreeSet::new();
    for (index, chunk) in content.chunks_exact(4).enumerate() {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        for bit in 0..32 {
            if word & (1 << bit) == 0 {
                continue;
            }
            // versions above u8 range cannot appear in a header anyway
            if let Ok(v) = u8::try_from(index * 32 + bit) {
                versions.insert(v);
            }
        }
    }
    Ok(versions)
}

fn put_role_body(buf: &mut BytesMut, role: u32, generation_id: u64) {
    buf.put_u32(role);
    buf.put_bytes(0, 4);
    buf.put_u64(generation_id);
}

fn get_role_body(payload: &[u8]) -> Result<(u32, u64)> {
    ensure_len(payload, ROLE_BODY_LEN)?;
    let mut cursor = payload;
    let role = cursor.get_u32();
    cursor.advance(4);
    Ok((role, cursor.get_u64()))
}

fn ensure_len(payload: &[u8], needed: usize) -> Result<()> {
    if payload.len() < needed {
        return Err(CodecError::Truncated {
            needed: OFP_HEADER_LEN + needed,
            available: OFP_HEADER_LEN + payload.len(),
        });
    }
    Ok(())
}

const fn padded(length: usize) -> usize {
    (length + 7) / 8 * 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionSet;

    #[test]
    fn test_hello_without_elements() {
        let bytes = encode(&Message::hello(4, 7)).unwrap();
        assert_eq!(hex::encode(&bytes), "0400000800000007");

        let (decoded, used) = decode(&bytes).unwrap();
        assert_eq!(used, 8);
        assert_eq!(decoded, Message::hello(4, 7));
    }

    #[test]
    fn test_hello_with_bitmap_layout() {
        let versions = VersionSet::new([1, 4]).unwrap();
        let bytes = encode(&Message::hello_with_bitmap(4, 1, &versions)).unwrap();
        // header(8) + element header(4) + one word(4) = 16, already aligned
        assert_eq!(hex::encode(&bytes), "04000010000000010001000800000012");

        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.version_bitmap(), Some(versions.as_set()));
    }

    #[test]
    fn test_hello_unknown_element_is_padded() {
        let message = Message::new(
            4,
            1,
            Body::Hello {
                elements: vec![HelloElement::Unknown {
                    element_type: 9,
                    payload: Bytes::from_static(b"x"),
                }],
            },
        );
        let bytes = encode(&message).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode(&bytes).unwrap().0, message);
    }

    #[test]
    fn test_hello_element_overrunning_frame() {
        // element claims 16 bytes but only 4 are left in the body
        let frame = hex::decode("0400000c0000000100010010").unwrap();
        assert!(matches!(decode(&frame), Err(CodecError::BadElement(_))));
    }

    #[test]
    fn test_role_request_layout() {
        let message = Message::new(
            4,
            0x2a,
            Body::RoleRequest(RoleRequest {
                role: RequestedRole::Master,
                generation_id: 5,
            }),
        );
        let bytes = encode(&message).unwrap();
        assert_eq!(
            hex::encode(&bytes),
            "041800180000002a00000002000000000000000000000005"
        );
        assert_eq!(decode(&bytes).unwrap().0, message);
    }

    #[test]
    fn test_role_reply_rejects_nochange() {
        let mut bytes = encode(&Message::new(
            4,
            1,
            Body::RoleReply(RoleReply {
                role: Role::Slave,
                generation_id: 1,
            }),
        ))
        .unwrap()
        .to_vec();
        bytes[OFP_HEADER_LEN + 3] = 0;
        assert_eq!(decode(&bytes), Err(CodecError::BadRoleValue(0)));
    }

    #[test]
    fn test_error_message() {
        let message = Message::error(4, 3, ErrorKind::HelloIncompatible, &b"no"[..]);
        let bytes = encode(&message).unwrap();
        assert_eq!(hex::encode(&bytes), "0401000e00000003000000006e6f");
        assert_eq!(decode(&bytes).unwrap().0, message);
    }

    #[test]
    fn test_unsupported_type_is_preserved() {
        let bytes = hex::decode("040a000c00000001deadbeef").unwrap();
        let (message, used) = decode(&bytes).unwrap();
        assert_eq!(used, 12);
        assert_eq!(message.body.type_code(), 10);
        assert_eq!(encode(&message).unwrap().as_ref(), &bytes[..]);
    }

    #[test]
    fn test_truncated_and_bad_length() {
        assert!(matches!(decode(&[4, 0, 0]), Err(CodecError::Truncated { .. })));
        assert_eq!(
            decode(&hex::decode("0400000400000001").unwrap()),
            Err(CodecError::BadLength(4))
        );
        assert!(matches!(
            decode(&hex::decode("0400001000000001").unwrap()),
            Err(CodecError::Truncated { needed: 16, .. })
        ));
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let mut stream = encode(&Message::hello(4, 1)).unwrap().to_vec();
        stream.extend_from_slice(&encode(&Message::hello(4, 2)).unwrap());
        let (first, used) = decode(&stream).unwrap();
        assert_eq!(first.xid, 1);
        let (second, _) = decode(&stream[used..]).unwrap();
        assert_eq!(second.xid, 2);
    }

    #[test]
    fn test_bitmap_multiple_words() {
        let versions = BTreeSet::from([1, 33]);
        assert_eq!(bitmap_words(&versions), vec![0b10, 0b10]);
        let mut content = Vec::new();
        for w in bitmap_words(&versions) {
            content.extend_from_slice(&w.to_be_bytes());
        }
        assert_eq!(versions_from_bitmap(&content).unwrap(), versions);
    }
}
