//! Sessions over real TCP connections.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use ofchannel::core::{Body, ErrorKind, RequestedRole, RoleReply};
use ofchannel::session::{dial, StreamTransport};
use ofchannel::{
    Channel, ChannelConfig, CloseReason, MemoryRegistry, RemotePeer, ResourceId, Role,
    SessionHandle, SessionState, SpawnedSession, Termination,
};
use ofchannel_testkit::ControllerPeer;
use tokio::net::{TcpListener, TcpStream};

const DPID: &str = "dpid:00000000000000aa";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config() -> ChannelConfig {
    ChannelConfig {
        supported_versions: vec![1, 4],
        hello_timeout_ms: 2_000,
        connect_timeout_ms: 2_000,
        ..ChannelConfig::default()
    }
}

/// Accept one controller connection on the switch listener.
async fn accept_one(
    channel: &Channel,
    listener: &TcpListener,
) -> Result<(SpawnedSession, ControllerPeer<StreamTransport<TcpStream>>)> {
    let peer = RemotePeer::tcp("127.0.0.1", listener.local_addr()?.port());
    let (accepted, dialed) = tokio::join!(listener.accept(), dial(&peer, Duration::from_secs(2)));
    let (stream, _) = accepted?;
    let spawned = channel.accept_tcp(ResourceId::new(DPID), stream);
    Ok((spawned, ControllerPeer::new(dialed?)))
}

async fn wait_for_role(handle: &SessionHandle, role: Role) -> Result<()> {
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        while rx.borrow_and_update().role != role {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .map_err(|_| anyhow!("session {} never became {:?}", handle.id(), role))?;
    Ok(())
}

fn role_reply(message: &ofchannel::core::Message) -> Result<RoleReply> {
    match &message.body {
        Body::RoleReply(reply) => Ok(*reply),
        other => Err(anyhow!("expected ROLE_REPLY, got {:?}", other)),
    }
}

async fn finish(spawned: SpawnedSession) -> Result<Termination> {
    Ok(tokio::time::timeout(Duration::from_secs(2), spawned.task).await??)
}

#[tokio::test]
async fn test_master_election_across_connections() -> Result<()> {
    init_tracing();
    let registry = Arc::new(MemoryRegistry::new());
    let channel = Channel::new(&config(), registry.clone())?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;

    let (first, mut ctl_a) = accept_one(&channel, &listener).await?;
    let (second, mut ctl_b) = accept_one(&channel, &listener).await?;
    assert_eq!(registry.sessions(&ResourceId::new(DPID)).len(), 2);

    let hello = ctl_a.handshake(None).await;
    assert_eq!(hello.version, 4);
    assert_eq!(hello.version_bitmap().map(|s| s.len()), Some(2));
    ctl_b.handshake(None).await;
    first.handle.wait_for_state(SessionState::Established).await;
    second.handle.wait_for_state(SessionState::Established).await;

    // A becomes master; B is told to step down
    let reply = role_reply(&ctl_a.request_role(RequestedRole::Master, 1).await)?;
    assert_eq!(reply.role, Role::Master);
    wait_for_role(&second.handle, Role::Slave).await?;
    assert_eq!(second.handle.snapshot().generation_id, None);

    // B takes over; A keeps its generation id as a slave
    let reply = role_reply(&ctl_b.request_role(RequestedRole::Master, 2).await)?;
    assert_eq!(reply.generation_id, 2);
    wait_for_role(&first.handle, Role::Slave).await?;

    let query = role_reply(&ctl_a.request_role(RequestedRole::NoChange, 0).await)?;
    assert_eq!(query.role, Role::Slave);
    assert_eq!(query.generation_id, 1);

    // A stale claim on B leaves it master
    let stale = ctl_b.request_role(RequestedRole::Master, 1).await;
    assert_eq!(stale.error_kind(), Some(ErrorKind::RoleStale));
    assert_eq!(second.handle.snapshot().role, Role::Master);

    ctl_a.close().await;
    ctl_b.close().await;
    assert_eq!(finish(first).await?.reason(), Some(CloseReason::PeerClosed));
    assert_eq!(finish(second).await?.reason(), Some(CloseReason::PeerClosed));
    Ok(())
}

#[tokio::test]
async fn test_echo_and_version_fallback() -> Result<()> {
    init_tracing();
    let channel = Channel::new(&config(), Arc::new(MemoryRegistry::new()))?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let (spawned, mut ctl) = accept_one(&channel, &listener).await?;

    // a 1.2 controller without a bitmap ends up on 1.0
    ctl.set_version(3);
    ctl.handshake(None).await;
    let snapshot = spawned.handle.wait_for_state(SessionState::Established).await;
    assert_eq!(snapshot.negotiated_version, Some(1));

    ctl.set_version(1);
    let xid = ctl.xid();
    ctl.send(&ofchannel::core::Message::new(
        1,
        xid,
        Body::EchoRequest(Bytes::from_static(b"keepalive")),
    ))
    .await;
    let reply = ctl.recv().await;
    assert_eq!(reply.xid, xid);
    assert_eq!(reply.body, Body::EchoReply(Bytes::from_static(b"keepalive")));

    spawned.handle.stop();
    ctl.expect_closed().await;
    assert_eq!(finish(spawned).await?.reason(), Some(CloseReason::Stopped));
    Ok(())
}

#[tokio::test]
async fn test_dial_out_to_controller() -> Result<()> {
    init_tracing();
    let registry = Arc::new(MemoryRegistry::new());
    let channel = Channel::new(&config(), registry.clone())?;
    let controller = TcpListener::bind("127.0.0.1:0").await?;
    let port = controller.local_addr()?.port();

    let spawned = channel.connect(ResourceId::new(DPID), RemotePeer::tcp("127.0.0.1", port));
    let (stream, _) = controller.accept().await?;
    let mut ctl = ControllerPeer::new(ofchannel::session::bind_tcp(stream));

    ctl.handshake(None).await;
    let snapshot = spawned.handle.wait_for_state(SessionState::Established).await;
    assert_eq!(snapshot.negotiated_version, Some(4));
    assert_eq!(snapshot.peer, Some(format!("127.0.0.1:{}", port)));

    let reply = role_reply(&ctl.request_role(RequestedRole::Slave, 9).await)?;
    assert_eq!(reply.role, Role::Slave);
    assert_eq!(registry.sessions(&ResourceId::new(DPID)).len(), 1);

    ctl.close().await;
    assert_eq!(finish(spawned).await?.reason(), Some(CloseReason::PeerClosed));
    Ok(())
}

#[tokio::test]
async fn test_dial_refused_is_fault() -> Result<()> {
    init_tracing();
    let channel = Channel::new(&config(), Arc::new(MemoryRegistry::new()))?;
    let port = {
        let scratch = TcpListener::bind("127.0.0.1:0").await?;
        scratch.local_addr()?.port()
    };

    let spawned = channel.connect(ResourceId::new(DPID), RemotePeer::tcp("127.0.0.1", port));
    let termination = finish(spawned).await?;
    assert!(!termination.is_normal());
    Ok(())
}
