//! The Channel: spawns one session per controller connection.

use std::sync::Arc;

use ofchannel_core::ResourceId;
use ofchannel_session::{
    bind_accepted, bind_tcp, ChannelRegistry, Endpoint, RemotePeer, Session, SessionConfig,
    SessionHandle, Termination,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::config::ChannelConfig;
use crate::error::Result;

/// A session running on its own task.
#[derive(Debug)]
pub struct SpawnedSession {
    /// Handle for stopping, demoting and observing the session.
    pub handle: SessionHandle,
    /// Resolves to the session's termination reason.
    pub task: JoinHandle<Termination>,
}

/// Entry point for running controller connections.
pub struct Channel {
    config: SessionConfig,
    registry: Arc<dyn ChannelRegistry>,
}

impl Channel {
    /// Create a channel. Fails if `config` does not validate.
    pub fn new(config: &ChannelConfig, registry: Arc<dyn ChannelRegistry>) -> Result<Self> {
        Ok(Self {
            config: config.session_config()?,
            registry,
        })
    }

    /// Settings every new session starts with.
    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run a session over an already-connected stream.
    pub fn accept<S>(&self, resource_id: ResourceId, stream: S) -> SpawnedSession
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.launch(resource_id, Endpoint::Accepted(Box::new(bind_accepted(stream))))
    }

    /// Run a session over an accepted TCP connection.
    pub fn accept_tcp(&self, resource_id: ResourceId, stream: TcpStream) -> SpawnedSession {
        self.launch(resource_id, Endpoint::Accepted(Box::new(bind_tcp(stream))))
    }

    /// Dial a controller and run a session over the connection.
    ///
    /// Dialing happens on the session's task; a failure shows up as its
    /// termination.
    pub fn connect(&self, resource_id: ResourceId, peer: RemotePeer) -> SpawnedSession {
        tracing::info!("Connecting {} to controller {}", resource_id, peer);
        self.launch(resource_id, Endpoint::Remote(peer))
    }

    fn launch(&self, resource_id: ResourceId, endpoint: Endpoint) -> SpawnedSession {
        let (session, handle) = Session::new(
            resource_id.clone(),
            endpoint,
            self.registry.clone(),
            self.config.clone(),
        );
        self.registry.register(&resource_id, handle.clone());
        tracing::debug!("Spawning session {} for {}", handle.id(), resource_id);

        SpawnedSession {
            handle,
            task: session.spawn(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ChannelError;
    use ofchannel_core::CoreError;
    use ofchannel_session::{MemoryRegistry, SessionState};

    #[test]
    fn test_new_rejects_bad_versions() {
        let config = ChannelConfig {
            supported_versions: vec![0],
            ..ChannelConfig::default()
        };
        let result = Channel::new(&config, Arc::new(MemoryRegistry::new()));
        assert!(matches!(
            result,
            Err(ChannelError::Core(CoreError::VersionOutOfRange(0)))
        ));
    }

    #[tokio::test]
    async fn test_accept_registers_session() {
        let registry = Arc::new(MemoryRegistry::new());
        let channel = Channel::new(&ChannelConfig::default(), registry.clone()).unwrap();
        let resource = ResourceId::new("dpid:10");

        let (switch_side, _controller_side) = tokio::io::duplex(4096);
        let spawned = channel.accept(resource.clone(), switch_side);

        let live = registry.sessions(&resource);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), spawned.handle.id());

        spawned.handle.stop();
        let termination = tokio::time::timeout(Duration::from_secs(2), spawned.task)
            .await
            .unwrap()
            .unwrap();
        assert!(termination.is_normal());
        assert_eq!(spawned.handle.snapshot().state, SessionState::Closed);
        assert!(registry.sessions(&resource).is_empty());
    }
}
