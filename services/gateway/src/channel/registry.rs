//! Process-wide map from live connection to the user behind it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use slotgate_id::{ConnectionId, UserId};
use tracing::debug;

use crate::auth::Identity;

/// The authenticated user behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub user_id: UserId,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

/// Connection registry. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    peers: Arc<DashMap<ConnectionId, Peer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection for `identity`. The entry lives as long as the
    /// returned [`Registration`].
    pub fn register(&self, identity: &Identity) -> Registration {
        let id = ConnectionId::new();
        self.peers.insert(
            id,
            Peer {
                user_id: identity.user_id,
                username: identity.username.clone(),
                connected_at: Utc::now(),
            },
        );
        debug!(connection_id = %id, user_id = %identity.user_id, "Connection registered");
        Registration {
            id,
            peers: self.peers.clone(),
        }
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Peer> {
        self.peers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Keeps a connection registered. Dropping it removes the entry, whether the
/// connection closed cleanly or its task was torn down.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    peers: Arc<DashMap<ConnectionId, Peer>>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.peers.remove(&self.id);
        debug!(connection_id = %self.id, "Connection unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: UserId::new(),
            username: name.to_string(),
        }
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = ConnectionRegistry::new();
        let ada = identity("ada");

        let registration = registry.register(&ada);
        let id = registration.id();
        assert_eq!(registry.lookup(id).map(|p| p.user_id), Some(ada.user_id));

        drop(registration);
        assert!(registry.lookup(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_one_user_may_hold_several_connections() {
        let registry = ConnectionRegistry::new();
        let ada = identity("ada");

        let first = registry.register(&ada);
        let second = registry.register(&ada);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        drop(first);
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(second.id()).is_some());
    }

    #[tokio::test]
    async fn test_aborted_task_releases_entry() {
        let registry = ConnectionRegistry::new();
        let registration = registry.register(&identity("ada"));
        let id = registration.id();

        let handle = tokio::spawn(async move {
            let _registration = registration;
            std::future::pending::<()>().await;
        });
        handle.abort();
        let _ = handle.await;

        assert!(registry.lookup(id).is_none());
    }
}
