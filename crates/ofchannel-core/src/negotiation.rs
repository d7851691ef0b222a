//! HELLO-based version negotiation.
//!
//! Both sides send a HELLO as their first message. The header version is the
//! highest version the sender speaks; an optional version-bitmap element lists
//! every version it speaks.
//!
//! ```text
//! Switch                              Controller
//!   |-------- HELLO (v=max, bitmap) ----->|
//!   |<------- HELLO (v, [bitmap]) --------|
//!   |                                      |
//!   |  agreed:       connection stays open |
//!   |  incompatible: ERROR(HELLO_FAILED)   |
//!   |                then close            |
//! ```

use std::collections::BTreeSet;

use crate::message::{version, ErrorKind, Message};
use crate::types::{VersionSet, Xid};

/// Outcome of a HELLO exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Both sides speak this version.
    Agreed(u8),
    /// No version in common.
    Incompatible { peer_version: u8 },
    /// The peer sent something other than HELLO before the handshake finished.
    Violation { type_code: u8 },
}

impl Negotiation {
    /// The agreed version, if any.
    pub fn version(&self) -> Option<u8> {
        match self {
            Negotiation::Agreed(v) => Some(*v),
            _ => None,
        }
    }
}

/// Compute the agreed version for a peer HELLO.
///
/// With a bitmap the result is the highest version in both sets. Without one,
/// the peer's header version is an upper bound on what it speaks.
pub fn agree(local: &VersionSet, peer_version: u8, peer_bitmap: Option<&BTreeSet<u8>>) -> Option<u8> {
    match peer_bitmap {
        Some(bitmap) => local.highest_common(bitmap),
        None => local.highest_at_most(peer_version),
    }
}

/// HELLO exchange state for one connection.
#[derive(Debug, Clone)]
pub struct Handshake {
    local: VersionSet,
    advertise_bitmap: bool,
    hello_sent: bool,
    peer_version: Option<u8>,
    outcome: Option<Negotiation>,
}

impl Handshake {
    /// Start a handshake for the given local versions.
    pub fn new(local: VersionSet, advertise_bitmap: bool) -> Self {
        Self {
            local,
            advertise_bitmap,
            hello_sent: false,
            peer_version: None,
            outcome: None,
        }
    }

    /// The HELLO to send, exactly once.
    ///
    /// Bitmap elements only exist from OpenFlow 1.3 on, so one is attached
    /// only when our highest version is at least 1.3.
    pub fn hello(&mut self, xid: Xid) -> Option<Message> {
        if self.hello_sent {
            return None;
        }
        self.hello_sent = true;

        let highest = self.local.highest();
        if self.advertise_bitmap && highest >= version::OFP_1_3 {
            Some(Message::hello_with_bitmap(highest, xid, &self.local))
        } else {
            Some(Message::hello(highest, xid))
        }
    }

    /// Whether our HELLO has gone out.
    pub fn hello_sent(&self) -> bool {
        self.hello_sent
    }

    /// Feed the peer's first message.
    ///
    /// Once an outcome is reached it is final; later calls return it unchanged.
    pub fn receive(&mut self, message: &Message) -> Negotiation {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        let outcome = if message.is_hello() {
            self.peer_version = Some(message.version);
            match agree(&self.local, message.version, message.version_bitmap()) {
                Some(v) => Negotiation::Agreed(v),
                None => Negotiation::Incompatible {
                    peer_version: message.version,
                },
            }
        } else {
            self.peer_version = Some(message.version);
            Negotiation::Violation {
                type_code: message.body.type_code(),
            }
        };

        self.outcome = Some(outcome);
        outcome
    }

    /// The HELLO_FAILED error sent before closing a failed handshake.
    ///
    /// It goes out in the lower of the peer's header version and our highest
    /// version so that the peer can parse it.
    pub fn failure_message(&self, xid: Xid) -> Message {
        let ours = self.local.highest();
        let version = self.peer_version.map_or(ours, |peer| peer.min(ours));
        let reason = match self.outcome {
            Some(Negotiation::Violation { type_code }) => {
                format!("expected HELLO, got message type {}", type_code)
            }
            _ => format!(
                "no common version; supported: {:?}",
                self.local.iter().collect::<Vec<_>>()
            ),
        };
        Message::error(version, xid, ErrorKind::HelloIncompatible, reason.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;
    use proptest::prelude::*;

    fn versions(v: &[u8]) -> VersionSet {
        VersionSet::new(v.iter().copied()).unwrap()
    }

    fn hello_with(version: u8, bitmap: &[u8]) -> Message {
        Message::hello_with_bitmap(version, 1, &versions(bitmap))
    }

    #[test]
    fn test_bitmap_picks_highest_common() {
        let mut hs = Handshake::new(versions(&[3, 4]), true);
        assert_eq!(hs.receive(&hello_with(4, &[1, 4])), Negotiation::Agreed(4));
    }

    #[test]
    fn test_bitmap_with_single_local_version() {
        let mut hs = Handshake::new(versions(&[1]), true);
        assert_eq!(hs.receive(&hello_with(4, &[1, 4])), Negotiation::Agreed(1));
    }

    #[test]
    fn test_bitmap_without_overlap_is_incompatible() {
        let mut hs = Handshake::new(versions(&[4]), true);
        assert_eq!(
            hs.receive(&hello_with(1, &[1])),
            Negotiation::Incompatible { peer_version: 1 }
        );
        let error = hs.failure_message(9);
        assert_eq!(error.version, 1);
        assert_eq!(error.xid, 9);
        assert_eq!(error.error_kind(), Some(ErrorKind::HelloIncompatible));
    }

    #[test]
    fn test_header_version_is_upper_bound() {
        let mut hs = Handshake::new(versions(&[1, 4]), true);
        assert_eq!(hs.receive(&Message::hello(4, 1)), Negotiation::Agreed(4));

        let mut hs = Handshake::new(versions(&[1, 4]), true);
        assert_eq!(hs.receive(&Message::hello(3, 1)), Negotiation::Agreed(1));

        let mut hs = Handshake::new(versions(&[4, 5]), true);
        assert_eq!(hs.receive(&Message::hello(6, 1)), Negotiation::Agreed(5));
    }

    #[test]
    fn test_non_hello_is_violation() {
        let mut hs = Handshake::new(versions(&[4]), true);
        let echo = Message::new(4, 1, Body::EchoRequest(Default::default()));
        assert_eq!(hs.receive(&echo), Negotiation::Violation { type_code: 2 });
        assert_eq!(hs.failure_message(1).error_kind(), Some(ErrorKind::HelloIncompatible));
    }

    #[test]
    fn test_outcome_is_final() {
        let mut hs = Handshake::new(versions(&[4]), true);
        assert_eq!(hs.receive(&Message::hello(4, 1)), Negotiation::Agreed(4));
        let late = hs.receive(&Message::hello(1, 2));
        assert_eq!(late, Negotiation::Agreed(4));
        assert_eq!(late.version(), Some(4));
    }

    #[test]
    fn test_hello_sent_once() {
        let mut hs = Handshake::new(versions(&[1, 4]), true);
        let hello = hs.hello(1).unwrap();
        assert_eq!(hello.version, 4);
        assert_eq!(hello.version_bitmap(), Some(versions(&[1, 4]).as_set()));
        assert!(hs.hello_sent());
        assert!(hs.hello(2).is_none());
    }

    #[test]
    fn test_hello_without_bitmap_below_1_3() {
        let mut hs = Handshake::new(versions(&[1, 3]), true);
        assert!(hs.hello(1).unwrap().version_bitmap().is_none());

        let mut hs = Handshake::new(versions(&[4]), false);
        assert!(hs.hello(1).unwrap().version_bitmap().is_none());
    }

    proptest! {
        #[test]
        fn prop_agreed_version_is_common_and_maximal(
            local in prop::collection::btree_set(1u8..=6, 1..6),
            peer in prop::collection::btree_set(1u8..=6, 1..6),
        ) {
            let local_set = VersionSet::new(local.iter().copied()).unwrap();
            let peer_max = *peer.iter().next_back().unwrap();
            match agree(&local_set, peer_max, Some(&peer)) {
                Some(v) => {
                    prop_assert!(local.contains(&v) && peer.contains(&v));
                    prop_assert!(local.intersection(&peer).all(|&c| c <= v));
                }
                None => prop_assert!(local.is_disjoint(&peer)),
            }
        }
    }
}
