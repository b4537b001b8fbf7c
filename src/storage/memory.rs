use async_trait::async_trait;
use im::{HashMap as ImHashMap, Vector};
use tokio::sync::RwLock;

use crate::core::{CoreError, NodeId, Result};
use crate::node::model::{Node, Property};
use crate::storage::engine::Persistence;

/// Key for a property row: `(node_id, field_node_id, order)`.
type PropertyKey = (NodeId, NodeId, i32);

#[derive(Clone, Default)]
struct Snapshot {
    nodes: ImHashMap<NodeId, Node>,
    properties: ImHashMap<PropertyKey, Property>,
}

/// `im`-backed [`Persistence`] implementation. Readers take a cheap
/// `O(1)`-clone handle on the current snapshot and never observe later
/// writes, giving point-in-time reads without `xmin`/`xmax`
/// transaction-visibility bookkeeping — there is no multi-statement
/// transaction isolation to support here. Writes are serialized by a
/// single top-level `RwLock` covering the whole store rather than one per
/// table, since a node and its properties must become visible together.
pub struct InMemoryPersistence {
    state: RwLock<Snapshot>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
        }
    }

    async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn insert_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.nodes.insert(node.id, node);
        Ok(())
    }

    async fn update_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&node.id) {
            return Err(CoreError::NotFound(node.id.to_string()));
        }
        state.nodes.insert(node.id, node);
        Ok(())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.snapshot().await.nodes.get(&id).cloned())
    }

    async fn find_node_by_system_id(&self, system_id: &str) -> Result<Option<Node>> {
        let snapshot = self.snapshot().await;
        Ok(snapshot
                .nodes
                .values()
                .find(|n| n.system_id.as_deref() == Some(system_id))
            .cloned())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.snapshot().await.nodes.values().cloned().collect())
    }

    async fn nodes_by_owner(&self, owner_id: NodeId) -> Result<Vec<Node>> {
        let snapshot = self.snapshot().await;
        Ok(snapshot
                .nodes
                .values()
                .filter(|n| n.owner_id == Some(owner_id))
                .cloned()
            .collect())
    }

    async fn upsert_property(&self, property: Property) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (property.node_id, property.field_node_id, property.order);
        state.properties.insert(key, property);
        Ok(())
    }

    async fn properties_for_node(&self, node_id: NodeId) -> Result<Vec<Property>> {
        let snapshot = self.snapshot().await;
        let mut rows: Vec<Property> = snapshot
            .properties
            .values()
            .filter(|p| p.node_id == node_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.order);
        Ok(rows)
    }

    async fn properties_for_field(&self, field_node_id: NodeId) -> Result<Vec<Property>> {
        let snapshot = self.snapshot().await;
        Ok(snapshot
                .properties
                .values()
                .filter(|p| p.field_node_id == field_node_id)
                .cloned()
            .collect())
    }

    async fn properties_referencing(
        &self,
        field_node_id: Option<NodeId>,
        target: NodeId,
    ) -> Result<Vec<Property>> {
        let snapshot = self.snapshot().await;
        Ok(snapshot
                .properties
                .values()
                .filter(|p| {
                    field_node_id.is_none_or(|f| f == p.field_node_id)
                    && p.value.as_ref_id() == Some(target)
            })
                .cloned()
            .collect())
    }

    async fn clear_property(&self, node_id: NodeId, field_node_id: NodeId) -> Result<()> {
        let mut state = self.state.write().await;
        let keys: Vector<PropertyKey> = state
            .properties
            .keys()
            .filter(|(n, f, _)| *n == node_id && *f == field_node_id)
            .cloned()
            .collect();
        for key in keys {
            state.properties.remove(&key);
        }
        Ok(())
    }

    async fn purge_deleted(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let deleted_ids: Vec<NodeId> = state
            .nodes
            .values()
            .filter(|n| n.is_deleted())
            .map(|n| n.id)
            .collect();
        let stale_keys: Vector<PropertyKey> = state
            .properties
            .keys()
            .filter(|(n, _, _)| deleted_ids.contains(n))
            .cloned()
            .collect();
        for key in stale_keys {
            state.properties.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId) -> Node {
        Node {
            id,
            content: None,
            content_plain: None,
            system_id: None,
            owner_id: None,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn inserted_node_is_retrievable_by_id() {
        let store = InMemoryPersistence::new();
        let id = NodeId::new();
        store.insert_node(node(id)).await.unwrap();
        assert!(store.get_node(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_of_missing_node_fails() {
        let store = InMemoryPersistence::new();
        let err = store.update_node(node(NodeId::new())).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn purge_deleted_removes_properties_of_deleted_nodes_only() {
        let store = InMemoryPersistence::new();
        let live = NodeId::new();
        let dead = NodeId::new();
        store.insert_node(node(live)).await.unwrap();
        let mut dead_node = node(dead);
        dead_node.deleted_at = Some(1);
        store.insert_node(dead_node).await.unwrap();

        let field = NodeId::new();
        store
            .upsert_property(Property {
                node_id: live,
                field_node_id: field,
                value: crate::core::PropertyValue::Bool(true),
                order: 0,
                created_at: 0,
                updated_at: 0,
        })
            .await
            .unwrap();
        store
            .upsert_property(Property {
                node_id: dead,
                field_node_id: field,
                value: crate::core::PropertyValue::Bool(true),
                order: 0,
                created_at: 0,
                updated_at: 0,
        })
            .await
            .unwrap();

        store.purge_deleted().await.unwrap();
        assert_eq!(store.properties_for_node(live).await.unwrap().len(), 1);
        assert_eq!(store.properties_for_node(dead).await.unwrap().len(), 0);
    }
}
