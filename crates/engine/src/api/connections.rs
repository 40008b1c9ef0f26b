//! Connection management for WebSocket clients.
//!
//! One adventure session per connection; the registry exists for
//! observability and a clean shutdown story, not for fan-out.

use dashmap::DashMap;

use taleweaver_domain::{ConnectionId, UserId};

/// Information about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    /// Resolved user identity, when the client authenticated.
    pub user_id: Option<UserId>,
    /// Client-generated resumption key, when one was supplied.
    pub client_key: Option<String>,
}

/// Tracks all live WebSocket connections.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ConnectionInfo>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        connection_id: ConnectionId,
        user_id: Option<UserId>,
        client_key: Option<String>,
    ) {
        let info = ConnectionInfo {
            connection_id,
            user_id,
            client_key,
        };
        self.connections.insert(connection_id, info);
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    pub fn unregister(&self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&connection_id).map(|r| r.clone())
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_track_the_count() {
        let manager = ConnectionManager::new();
        let id = ConnectionId::new();

        manager.register(id, None, Some("key".into()));
        assert_eq!(manager.active_count(), 1);
        assert_eq!(
            manager.get(id).and_then(|i| i.client_key),
            Some("key".to_string())
        );

        manager.unregister(id);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.get(id).is_none());
    }
}
