//! Lookup of sibling sessions for the same device.
//!
//! When one connection becomes master, every other connection of the same
//! resource must become slave. Sessions only know the registry through
//! [`ChannelRegistry`], so any bookkeeping can be plugged in.

use std::collections::HashMap;
use std::sync::RwLock;

use ofchannel_core::{ResourceId, SessionId};

use crate::session::SessionHandle;

/// Registry of live sessions, keyed by resource.
pub trait ChannelRegistry: Send + Sync {
    /// Demote every session of `resource_id` to slave, except `except`.
    ///
    /// Must not block on the sessions it notifies.
    fn demote_to_slave(&self, resource_id: &ResourceId, except: SessionId);

    /// Record a new session. Registries that track sessions elsewhere can
    /// leave this as a no-op.
    fn register(&self, _resource_id: &ResourceId, _handle: SessionHandle) {}
}

/// In-memory registry.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<HashMap<ResourceId, Vec<SessionHandle>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of live sessions for `resource_id`.
    pub fn sessions(&self, resource_id: &ResourceId) -> Vec<SessionHandle> {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .get(resource_id)
            .map(|handles| handles.iter().filter(|h| !h.is_closed()).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of resources with at least one recorded session.
    pub fn resource_count(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl ChannelRegistry for MemoryRegistry {
    fn demote_to_slave(&self, resource_id: &ResourceId, except: SessionId) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(handles) = inner.get_mut(resource_id) else {
            return;
        };

        handles.retain(|h| !h.is_closed());
        for handle in handles.iter().filter(|h| h.id() != except) {
            tracing::debug!("Demoting session {} of {} to slave", handle.id(), resource_id);
            handle.demote_to_slave();
        }
        if handles.is_empty() {
            inner.remove(resource_id);
        }
    }

    fn register(&self, resource_id: &ResourceId, handle: SessionHandle) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let handles = inner.entry(resource_id.clone()).or_default();
        handles.retain(|h| !h.is_closed());
        handles.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::session::{Endpoint, Session, SessionConfig, SessionState};
    use crate::transport::memory::{pair, MemoryTransport};
    use ofchannel_core::Role;

    /// Spawn a session with a silent peer. The peer end must be kept alive.
    fn accepted(registry: Arc<MemoryRegistry>, resource: &ResourceId) -> (SessionHandle, MemoryTransport) {
        let (local, remote) = pair();
        let (session, handle) = Session::new(
            resource.clone(),
            Endpoint::Accepted(Box::new(local)),
            registry.clone(),
            SessionConfig::default(),
        );
        registry.register(resource, handle.clone());
        session.spawn();
        (handle, remote)
    }

    #[tokio::test]
    async fn test_demote_skips_requester_and_other_resources() {
        let registry = Arc::new(MemoryRegistry::new());
        let dpid_a = ResourceId::new("dpid:a");
        let dpid_b = ResourceId::new("dpid:b");

        let (first, _p1) = accepted(registry.clone(), &dpid_a);
        let (second, _p2) = accepted(registry.clone(), &dpid_a);
        let (other, _p3) = accepted(registry.clone(), &dpid_b);

        registry.demote_to_slave(&dpid_a, first.id());

        let timeout = Duration::from_secs(2);
        tokio::time::timeout(timeout, async {
            let mut rx = second.watch();
            while rx.borrow_and_update().role != Role::Slave {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(first.snapshot().role, Role::Equal);
        assert_eq!(other.snapshot().role, Role::Equal);
    }

    #[tokio::test]
    async fn test_closed_sessions_are_pruned() {
        let registry = Arc::new(MemoryRegistry::new());
        let dpid = ResourceId::new("dpid:1");

        let (a, _pa) = accepted(registry.clone(), &dpid);
        let (b, _pb) = accepted(registry.clone(), &dpid);
        assert_eq!(registry.sessions(&dpid).len(), 2);

        a.stop();
        a.wait_for_state(SessionState::Closed).await;

        let live = registry.sessions(&dpid);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), b.id());

        b.stop();
        b.wait_for_state(SessionState::Closed).await;
        registry.demote_to_slave(&dpid, SessionId(0));
        assert_eq!(registry.resource_count(), 0);
    }

    #[test]
    fn test_unknown_resource_is_noop() {
        let registry = MemoryRegistry::new();
        registry.demote_to_slave(&ResourceId::new("nobody"), SessionId(1));
        assert!(registry.sessions(&ResourceId::new("nobody")).is_empty());
    }
}
