//! Test fixtures and helpers.
//!
//! A [`ControllerPeer`] plays the controller side of a connection, and
//! [`SessionFixture`] wires one up to a session over an in-memory pipe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use ofchannel_core::message::version;
use ofchannel_core::{
    decode, encode, Body, Message, RequestedRole, ResourceId, RoleRequest, SessionId, VersionSet,
    Xid,
};
use ofchannel_session::transport::memory::{pair, MemoryTransport};
use ofchannel_session::{
    ChannelRegistry, Endpoint, Session, SessionConfig, SessionHandle, Termination, Transport,
    TransportError,
};
use tokio::task::JoinHandle;

/// How long fixtures wait for a frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Resource id used by fixtures unless told otherwise.
pub const TEST_RESOURCE: &str = "dpid:0000000000000001";

/// Controller end of a channel connection.
pub struct ControllerPeer<T: Transport> {
    transport: T,
    version: u8,
    next_xid: Xid,
}

impl<T: Transport> ControllerPeer<T> {
    /// Wrap a transport. Messages go out at OpenFlow 1.3 until
    /// [`ControllerPeer::set_version`] says otherwise.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            version: version::OFP_1_3,
            next_xid: 1,
        }
    }

    /// Header version for messages built by this peer.
    pub fn set_version(&mut self, version: u8) {
        self.version = version;
    }

    /// Allocate a transaction id.
    pub fn xid(&mut self) -> Xid {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    /// Send a message.
    pub async fn send(&mut self, message: &Message) {
        let frame = encode(message).expect("test message must encode");
        self.send_raw(frame).await;
    }

    /// Send raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, frame: Bytes) {
        self.transport
            .send(frame)
            .await
            .expect("controller send failed");
    }

    /// Receive the next message from the switch.
    pub async fn recv(&mut self) -> Message {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.transport.receive())
            .await
            .expect("timed out waiting for the switch")
            .expect("controller receive failed");
        decode(&frame).expect("switch sent a malformed frame").0
    }

    /// Wait for the switch to close the connection.
    pub async fn expect_closed(&mut self) {
        match tokio::time::timeout(RECV_TIMEOUT, self.transport.receive()).await {
            Ok(Err(TransportError::PeerClosed)) => {}
            Ok(other) => panic!("expected the switch to close, got {:?}", other),
            Err(_) => panic!("timed out waiting for the switch to close"),
        }
    }

    /// Receive the switch's HELLO and answer with ours.
    ///
    /// With `versions` the HELLO carries a bitmap and a header version equal
    /// to the highest entry; without, it is a bare HELLO at the current
    /// version. Returns the switch's HELLO.
    pub async fn handshake(&mut self, versions: Option<&VersionSet>) -> Message {
        let hello = self.recv().await;
        assert!(hello.is_hello(), "expected HELLO, got {:?}", hello);

        let xid = self.xid();
        let ours = match versions {
            Some(set) => {
                self.version = set.highest();
                Message::hello_with_bitmap(set.highest(), xid, set)
            }
            None => Message::hello(self.version, xid),
        };
        self.send(&ours).await;
        hello
    }

    /// Send a ROLE_REQUEST and return the switch's answer.
    pub async fn request_role(&mut self, role: RequestedRole, generation_id: u64) -> Message {
        let xid = self.xid();
        let request = Message::new(
            self.version,
            xid,
            Body::RoleRequest(RoleRequest {
                role,
                generation_id,
            }),
        );
        self.send(&request).await;
        let answer = self.recv().await;
        assert_eq!(answer.xid, xid, "answer does not match the request");
        answer
    }

    /// Hang up.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

/// Registry that records demotion requests instead of acting on them.
#[derive(Default)]
pub struct RecordingRegistry {
    demotions: Mutex<Vec<(ResourceId, SessionId)>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(resource, except)` pairs seen so far.
    pub fn demotions(&self) -> Vec<(ResourceId, SessionId)> {
        match self.demotions.lock() {
            Ok(d) => d.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ChannelRegistry for RecordingRegistry {
    fn demote_to_slave(&self, resource_id: &ResourceId, except: SessionId) {
        let mut demotions = match self.demotions.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        demotions.push((resource_id.clone(), except));
    }
}

/// A running session with a controller on the other end of a memory pipe.
pub struct SessionFixture {
    pub controller: ControllerPeer<MemoryTransport>,
    pub handle: SessionHandle,
    pub task: JoinHandle<Termination>,
}

impl SessionFixture {
    /// Spawn a session for [`TEST_RESOURCE`] using `registry`.
    pub fn spawn(config: SessionConfig, registry: Arc<dyn ChannelRegistry>) -> Self {
        Self::spawn_for(ResourceId::new(TEST_RESOURCE), config, registry)
    }

    /// Spawn a session for `resource_id` and register it.
    pub fn spawn_for(
        resource_id: ResourceId,
        config: SessionConfig,
        registry: Arc<dyn ChannelRegistry>,
    ) -> Self {
        let (switch_side, controller_side) = pair();
        let (session, handle) = Session::new(
            resource_id.clone(),
            Endpoint::Accepted(Box::new(switch_side)),
            registry.clone(),
            config,
        );
        registry.register(&resource_id, handle.clone());
        Self {
            controller: ControllerPeer::new(controller_side),
            handle,
            task: session.spawn(),
        }
    }

    /// Wait for the session task to finish.
    pub async fn termination(self) -> Termination {
        tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("session did not terminate")
            .expect("session task panicked")
    }
}
