//! Session state machine.
//!
//! One session per controller connection. It binds the transport, runs the
//! HELLO exchange, then answers role-change requests until the connection
//! ends.
//!
//! ```text
//! Connecting ──> Negotiating ──> Established
//!     │               │               │
//!     └───────────────┴───────────────┴──> Closed
//! ```
//!
//! All mutable state lives in the task running [`Session::run`]. Other
//! components talk to it through a [`SessionHandle`].

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ofchannel_core::{
    arbitrate, decode, encode, Arbitration, Body, ErrorKind, Handshake, Message, Negotiation,
    ResourceId, Role, RoleState, SessionId, VersionSet, Xid,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Result, SessionError, TransportError};
use crate::registry::ChannelRegistry;
use crate::transport::{self, RemotePeer, Transport};

/// Bytes of an offending request echoed back in an ERROR body.
const ERROR_DATA_LEN: usize = 64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Dialing the controller.
    Connecting,
    /// HELLO exchange in progress.
    Negotiating,
    /// Version agreed; serving requests.
    Established,
    /// Terminal.
    Closed,
}

/// Observable view of a session, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub role: Role,
    pub generation_id: Option<u64>,
    pub negotiated_version: Option<u8>,
    /// Remote address of the bound transport, once known.
    pub peer: Option<String>,
}

/// Configuration for a single session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Versions offered in our HELLO.
    pub supported_versions: VersionSet,
    /// How long to wait for the peer's first message.
    pub hello_timeout: Duration,
    /// Bound on dialing a remote peer.
    pub connect_timeout: Duration,
    /// Attach a version bitmap to our HELLO (only for 1.3 and later).
    pub advertise_bitmap: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            supported_versions: VersionSet::default(),
            hello_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            advertise_bitmap: true,
        }
    }
}

/// How the session obtains its connection.
pub enum Endpoint {
    /// Connection accepted by a listener.
    Accepted(Box<dyn Transport>),
    /// Controller to dial.
    Remote(RemotePeer),
}

/// Why a session ended without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The peer hung up.
    PeerClosed,
    /// [`SessionHandle::stop`] was called.
    Stopped,
    /// No common version.
    Incompatible,
    /// The peer's first message was not a HELLO.
    ProtocolViolation,
    /// The peer sent nothing within the HELLO timeout.
    HandshakeTimeout,
}

/// Termination reported to whoever supervises the session.
#[derive(Debug)]
pub enum Termination {
    /// Expected shutdown.
    Normal(CloseReason),
    /// Unexpected transport or decoding error.
    Fault(SessionError),
}

impl Termination {
    pub fn is_normal(&self) -> bool {
        matches!(self, Termination::Normal(_))
    }

    /// Close reason of a normal termination.
    pub fn reason(&self) -> Option<CloseReason> {
        match self {
            Termination::Normal(reason) => Some(*reason),
            Termination::Fault(_) => None,
        }
    }
}

/// Commands delivered to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    DemoteToSlave,
    Stop,
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    control: mpsc::UnboundedSender<Control>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Ask the session to close. Returns immediately.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Ask the session to become slave. Returns immediately.
    pub fn demote_to_slave(&self) {
        let _ = self.control.send(Control::DemoteToSlave);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the session has reached `Closed` or its task is gone.
    pub fn is_closed(&self) -> bool {
        self.snapshot.borrow().state == SessionState::Closed || self.control.is_closed()
    }

    /// Wait until the session reaches `state`.
    ///
    /// Returns the snapshot that matched, or the last one if the session
    /// ended without reaching `state`.
    pub async fn wait_for_state(&self, state: SessionState) -> SessionSnapshot {
        let mut rx = self.snapshot.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.state == state || current.state == SessionState::Closed {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

/// What woke the session up.
enum Event {
    Control(Control),
    ControlDropped,
    Frame(Bytes),
    Transport(TransportError),
}

/// A channel session.
pub struct Session {
    id: SessionId,
    resource_id: ResourceId,
    endpoint: Option<Endpoint>,
    transport: Option<Box<dyn Transport>>,
    registry: Arc<dyn ChannelRegistry>,
    config: SessionConfig,
    handshake: Handshake,
    role: RoleState,
    state: SessionState,
    negotiated_version: Option<u8>,
    peer: Option<String>,
    next_xid: Xid,
    control: mpsc::UnboundedReceiver<Control>,
    control_open: bool,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Session {
    /// Create a session and its handle. Nothing happens until [`Session::run`].
    pub fn new(
        resource_id: ResourceId,
        endpoint: Endpoint,
        registry: Arc<dyn ChannelRegistry>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let id = SessionId::random();
        let state = match endpoint {
            Endpoint::Accepted(_) => SessionState::Negotiating,
            Endpoint::Remote(_) => SessionState::Connecting,
        };
        let role = RoleState::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            state,
            role: role.role,
            generation_id: role.generation_id,
            negotiated_version: None,
            peer: None,
        });

        let session = Self {
            id,
            resource_id,
            endpoint: Some(endpoint),
            transport: None,
            registry,
            handshake: Handshake::new(config.supported_versions.clone(), config.advertise_bitmap),
            config,
            role,
            state,
            negotiated_version: None,
            peer: None,
            next_xid: 1,
            control: control_rx,
            control_open: true,
            snapshot: snapshot_tx,
        };
        let handle = SessionHandle {
            id,
            control: control_tx,
            snapshot: snapshot_rx,
        };
        (session, handle)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion on a new tokio task.
    pub fn spawn(self) -> JoinHandle<Termination> {
        tokio::spawn(self.run())
    }

    /// Run the session until it closes.
    pub async fn run(mut self) -> Termination {
        tracing::debug!("Session {} for {} starting", self.id, self.resource_id);

        let outcome = match self.drive().await {
            Err(SessionError::Transport(TransportError::PeerClosed)) => Ok(CloseReason::PeerClosed),
            other => other,
        };
        self.shutdown().await;

        match outcome {
            Ok(reason) => {
                tracing::info!(
                    "Session {} for {} closed: {:?}",
                    self.id,
                    self.resource_id,
                    reason
                );
                Termination::Normal(reason)
            }
            Err(e) => {
                tracing::warn!("Session {} for {} failed: {}", self.id, self.resource_id, e);
                Termination::Fault(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<CloseReason> {
        if let ControlFlow::Break(reason) = self.connect().await? {
            return Ok(reason);
        }
        if let ControlFlow::Break(reason) = self.negotiate().await? {
            return Ok(reason);
        }
        self.serve().await
    }

    /// Bind or dial the transport.
    async fn connect(&mut self) -> Result<ControlFlow<CloseReason>> {
        let peer = match self.endpoint.take() {
            Some(Endpoint::Accepted(transport)) => {
                self.bind(transport);
                return Ok(ControlFlow::Continue(()));
            }
            Some(Endpoint::Remote(peer)) => peer,
            None => return Err(TransportError::Closed.into()),
        };

        tracing::debug!("Session {} dialing {}", self.id, peer);
        let dial = transport::dial(&peer, self.config.connect_timeout);
        tokio::pin!(dial);
        loop {
            tokio::select! {
                biased;
                control = self.control.recv(), if self.control_open => match control {
                    Some(command) => {
                        if let ControlFlow::Break(reason) = self.on_control(command) {
                            return Ok(ControlFlow::Break(reason));
                        }
                    }
                    None => self.control_open = false,
                },
                result = &mut dial => {
                    self.bind(Box::new(result?));
                    self.set_state(SessionState::Negotiating);
                    return Ok(ControlFlow::Continue(()));
                }
            }
        }
    }

    fn bind(&mut self, transport: Box<dyn Transport>) {
        self.peer = transport.peer_label();
        tracing::debug!(
            "Session {} bound to {}",
            self.id,
            self.peer.as_deref().unwrap_or("unknown peer")
        );
        self.transport = Some(transport);
        self.publish();
    }

    /// Exchange HELLOs and agree on a version.
    async fn negotiate(&mut self) -> Result<ControlFlow<CloseReason>> {
        let xid = self.take_xid();
        if let Some(hello) = self.handshake.hello(xid) {
            self.send(&hello).await?;
        }

        let deadline = Instant::now() + self.config.hello_timeout;
        loop {
            let Some(event) = self.next_event_before(deadline).await else {
                tracing::warn!(
                    "Session {}: no HELLO within {:?}",
                    self.id,
                    self.config.hello_timeout
                );
                return Ok(ControlFlow::Break(CloseReason::HandshakeTimeout));
            };
            let frame = match event {
                Event::Frame(frame) => frame,
                Event::Control(command) => {
                    if let ControlFlow::Break(reason) = self.on_control(command) {
                        return Ok(ControlFlow::Break(reason));
                    }
                    continue;
                }
                Event::ControlDropped => {
                    self.control_open = false;
                    continue;
                }
                Event::Transport(TransportError::PeerClosed) => {
                    return Ok(ControlFlow::Break(CloseReason::PeerClosed))
                }
                Event::Transport(e) => return Err(e.into()),
            };

            let (message, _) = decode(&frame)?;
            let reason = match self.handshake.receive(&message) {
                Negotiation::Agreed(v) => {
                    tracing::info!(
                        "Session {} for {} negotiated version {:#04x}",
                        self.id,
                        self.resource_id,
                        v
                    );
                    self.negotiated_version = Some(v);
                    self.set_state(SessionState::Established);
                    return Ok(ControlFlow::Continue(()));
                }
                Negotiation::Incompatible { peer_version } => {
                    tracing::warn!(
                        "Session {}: no common version with peer (peer offers {:#04x})",
                        self.id,
                        peer_version
                    );
                    CloseReason::Incompatible
                }
                Negotiation::Violation { type_code } => {
                    tracing::warn!(
                        "Session {}: expected HELLO, got message type {}",
                        self.id,
                        type_code
                    );
                    CloseReason::ProtocolViolation
                }
            };

            let error = self.handshake.failure_message(message.xid);
            self.send(&error).await?;
            return Ok(ControlFlow::Break(reason));
        }
    }

    /// Steady state: answer requests until the connection ends.
    async fn serve(&mut self) -> Result<CloseReason> {
        loop {
            match self.next_event().await {
                Event::Frame(frame) => self.on_frame(frame).await?,
                Event::Control(command) => {
                    if let ControlFlow::Break(reason) = self.on_control(command) {
                        return Ok(reason);
                    }
                }
                Event::ControlDropped => self.control_open = false,
                Event::Transport(TransportError::PeerClosed) => return Ok(CloseReason::PeerClosed),
                Event::Transport(e) => return Err(e.into()),
            }
        }
    }

    /// Like [`Session::next_event`], but gives up at `deadline`.
    async fn next_event_before(&mut self, deadline: Instant) -> Option<Event> {
        tokio::time::timeout_at(deadline, self.next_event()).await.ok()
    }

    /// Wait for the next control command or frame.
    async fn next_event(&mut self) -> Event {
        let Some(transport) = self.transport.as_mut() else {
            return Event::Transport(TransportError::Closed);
        };

        tokio::select! {
            biased;
            control = self.control.recv(), if self.control_open => match control {
                Some(command) => Event::Control(command),
                None => Event::ControlDropped,
            },
            frame = transport.receive() => match frame {
                Ok(frame) => Event::Frame(frame),
                Err(e) => Event::Transport(e),
            },
        }
    }

    fn on_control(&mut self, command: Control) -> ControlFlow<CloseReason> {
        match command {
            Control::Stop => ControlFlow::Break(CloseReason::Stopped),
            Control::DemoteToSlave => {
                if self.role.role != Role::Slave {
                    tracing::debug!("Session {} demoted to slave", self.id);
                    self.role.demote();
                    self.publish();
                }
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_frame(&mut self, frame: Bytes) -> Result<()> {
        let (message, _) = decode(&frame)?;
        let negotiated = self.negotiated_version.unwrap_or(message.version);

        let is_role_request = matches!(message.body, Body::RoleRequest(_));
        if message.version != negotiated && !message.is_hello() && !is_role_request {
            tracing::debug!(
                "Session {}: version {:#04x} does not match negotiated {:#04x}",
                self.id,
                message.version,
                negotiated
            );
            return self
                .reply_error(message.xid, ErrorKind::BadVersion, &frame)
                .await;
        }

        match message.body {
            Body::RoleRequest(request) => match arbitrate(&self.role, &request) {
                Arbitration::Accepted {
                    state,
                    reply,
                    demote_siblings,
                } => {
                    tracing::debug!(
                        "Session {}: role {:?} generation {:?} accepted",
                        self.id,
                        state.role,
                        state.generation_id
                    );
                    self.role = state;
                    self.publish();
                    if demote_siblings {
                        self.registry.demote_to_slave(&self.resource_id, self.id);
                    }
                    let reply = Message::new(negotiated, message.xid, Body::RoleReply(reply));
                    self.send(&reply).await
                }
                Arbitration::Stale { current, requested } => {
                    tracing::info!(
                        "Session {}: stale role request (generation {} < {})",
                        self.id,
                        requested,
                        current
                    );
                    self.reply_error(message.xid, ErrorKind::RoleStale, &frame).await
                }
            },
            Body::EchoRequest(payload) => {
                let reply = Message::new(negotiated, message.xid, Body::EchoReply(payload));
                self.send(&reply).await
            }
            Body::Hello { .. } => {
                tracing::debug!("Session {}: ignoring HELLO after negotiation", self.id);
                Ok(())
            }
            Body::Error(error) => {
                tracing::warn!(
                    "Session {}: peer reported error {:?} (xid {})",
                    self.id,
                    error.kind,
                    message.xid
                );
                Ok(())
            }
            other => {
                tracing::debug!(
                    "Session {}: dropping message type {}",
                    self.id,
                    other.type_code()
                );
                Ok(())
            }
        }
    }

    /// Answer the request in `frame` with an ERROR carrying its first bytes.
    async fn reply_error(&mut self, xid: Xid, kind: ErrorKind, frame: &Bytes) -> Result<()> {
        let version = self
            .negotiated_version
            .unwrap_or_else(|| self.config.supported_versions.highest());
        let data = frame.slice(..frame.len().min(ERROR_DATA_LEN));
        self.send(&Message::error(version, xid, kind, data)).await
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode(message)?;
        match self.transport.as_mut() {
            Some(transport) => Ok(transport.send(frame).await?),
            None => Err(SessionError::Transport(TransportError::Closed)),
        }
    }

    fn take_xid(&mut self) -> Xid {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            state: self.state,
            role: self.role.role,
            generation_id: self.role.generation_id,
            negotiated_version: self.negotiated_version,
            peer: self.peer.clone(),
        });
    }

    /// Release the transport and enter `Closed`.
    async fn shutdown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.control.close();
        self.set_state(SessionState::Closed);
    }
}
