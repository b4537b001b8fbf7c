use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{NodeId, PropertyValue};

/// A row in the `nodes` relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub content: Option<String>,
    pub content_plain: Option<String>,
    pub system_id: Option<String>,
    pub owner_id: Option<NodeId>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Node {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A row in the `properties` relation : `(nodeId, fieldNodeId, value, order)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub node_id: NodeId,
    pub field_node_id: NodeId,
    pub value: PropertyValue,
    pub order: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A node row joined with its properties (grouped by field, ordered) and its
/// resolved supertag ids. This is what the query evaluator and subscription
/// diffing operate on; it is never itself persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledNode {
    pub node: Node,
    pub properties: BTreeMap<NodeId, Vec<PropertyValue>>,
    pub supertags: Vec<NodeId>,
}

impl AssembledNode {
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn property(&self, field_id: NodeId) -> Option<&PropertyValue> {
        self.properties.get(&field_id).and_then(|vs| vs.first())
    }

    pub fn has_field(&self, field_id: NodeId) -> bool {
        self.properties
            .get(&field_id)
            .is_some_and(|vs| !vs.is_empty())
    }

    pub fn has_supertag(&self, supertag_id: NodeId) -> bool {
        self.supertags.contains(&supertag_id)
    }
}
