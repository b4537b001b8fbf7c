use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::core::NodeId;

/// Caches `systemId -> NodeId` lookups. Inheritance resolution and query
/// evaluation perform many system-node lookups per call, so this cache
/// matters for throughput; it is a pure function of persistent state and is
/// safe to clear at any time (the next lookup simply repopulates it).
///
/// Owned by [`crate::node::service::NodeService`] rather than a
/// module-level singleton, so independent `Database` instances (as used
/// throughout the test suite) never share state.
#[derive(Default)]
pub struct SystemNodeCache {
    entries: RwLock<HashMap<String, NodeId>>,
}

impl SystemNodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, system_id: &str) -> Option<NodeId> {
        self.entries.read().await.get(system_id).copied()
    }

    pub async fn put(&self, system_id: String, id: NodeId) {
        self.entries.write().await.insert(system_id, id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
