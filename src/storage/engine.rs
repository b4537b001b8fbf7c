use async_trait::async_trait;

use crate::core::{NodeId, Result};
use crate::node::model::{Node, Property};

/// The persistence port : two logical relations, `nodes` and
/// `properties`, behind a single-writer, serialized-transaction interface.
///
/// Every method is `async` for uniformity with the rest of the stack even
/// though the only shipped implementation ([`crate::storage::memory::InMemoryPersistence`])
/// never actually suspends on I/O — an on-disk backend could be substituted
/// later without touching any caller.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn insert_node(&self, node: Node) -> Result<()>;
    async fn update_node(&self, node: Node) -> Result<()>;
    async fn get_node(&self, id: NodeId) -> Result<Option<Node>>;
    async fn find_node_by_system_id(&self, system_id: &str) -> Result<Option<Node>>;
    async fn all_nodes(&self) -> Result<Vec<Node>>;
    async fn nodes_by_owner(&self, owner_id: NodeId) -> Result<Vec<Node>>;

    /// Upserts a property row. Scalar/single-reference replace semantics are
    /// enforced by the caller (`node::service`); this layer stores whatever
    /// `(node_id, field_node_id, order)` triple it is given.
    async fn upsert_property(&self, property: Property) -> Result<()>;
    async fn properties_for_node(&self, node_id: NodeId) -> Result<Vec<Property>>;
    async fn properties_for_field(&self, field_node_id: NodeId) -> Result<Vec<Property>>;
    /// Reverse-reference lookup: nodes whose property for `field_node_id`
    /// equals a reference to `target`.
    async fn properties_referencing(
        &self,
        field_node_id: Option<NodeId>,
        target: NodeId,
    ) -> Result<Vec<Property>>;
    async fn clear_property(&self, node_id: NodeId, field_node_id: NodeId) -> Result<()>;

    /// Maintenance operation: drops property rows belonging to soft-deleted
    /// nodes. Never invoked automatically by the core.
    async fn purge_deleted(&self) -> Result<()>;
}
