use crate::core::{NodeId, PropertyValue};

/// A mutation event. Shared by reference with every matching
/// listener during a single dispatch — listeners must not mutate it.
#[derive(Debug, Clone)]
pub enum DbEvent {
    NodeCreated {
        node_id: NodeId,
        timestamp: i64,
    },
    NodeUpdated {
        node_id: NodeId,
        before_content: Option<String>,
        after_content: Option<String>,
    },
    NodeDeleted {
        node_id: NodeId,
    },
    PropertySet {
        node_id: NodeId,
        field_id: NodeId,
        field_system_id: Option<String>,
        before_value: Option<PropertyValue>,
        after_value: Option<PropertyValue>,
    },
    PropertyAdded {
        node_id: NodeId,
        field_id: NodeId,
        field_system_id: Option<String>,
        after_value: PropertyValue,
    },
    PropertyRemoved {
        node_id: NodeId,
        field_id: NodeId,
        field_system_id: Option<String>,
    },
    SupertagAdded {
        node_id: NodeId,
        supertag_id: NodeId,
        supertag_system_id: Option<String>,
    },
    SupertagRemoved {
        node_id: NodeId,
        supertag_id: NodeId,
        supertag_system_id: Option<String>,
    },
}

impl DbEvent {
    pub fn node_id(&self) -> NodeId {
        match self {
            DbEvent::NodeCreated { node_id, .. }
            | DbEvent::NodeUpdated { node_id, .. }
            | DbEvent::NodeDeleted { node_id }
            | DbEvent::PropertySet { node_id, .. }
            | DbEvent::PropertyAdded { node_id, .. }
            | DbEvent::PropertyRemoved { node_id, .. }
            | DbEvent::SupertagAdded { node_id, .. }
            | DbEvent::SupertagRemoved { node_id, .. } => *node_id,
        }
    }

    /// The event's type name, used by listener filters.
    pub fn type_name(&self) -> &'static str {
        match self {
            DbEvent::NodeCreated { .. } => "node:created",
            DbEvent::NodeUpdated { .. } => "node:updated",
            DbEvent::NodeDeleted { .. } => "node:deleted",
            DbEvent::PropertySet { .. } => "property:set",
            DbEvent::PropertyAdded { .. } => "property:added",
            DbEvent::PropertyRemoved { .. } => "property:removed",
            DbEvent::SupertagAdded { .. } => "supertag:added",
            DbEvent::SupertagRemoved { .. } => "supertag:removed",
        }
    }

    pub fn field_id(&self) -> Option<NodeId> {
        match self {
            DbEvent::PropertySet { field_id, .. }
            | DbEvent::PropertyAdded { field_id, .. }
            | DbEvent::PropertyRemoved { field_id, .. } => Some(*field_id),
            _ => None,
        }
    }

    pub fn supertag_id(&self) -> Option<NodeId> {
        match self {
            DbEvent::SupertagAdded { supertag_id, .. }
            | DbEvent::SupertagRemoved { supertag_id, .. } => Some(*supertag_id),
            _ => None,
        }
    }
}

/// Subscription filter for [`super::bus::EventBus::subscribe`]. Fields
/// combine with AND semantics; an absent field does not constrain.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub types: Option<Vec<&'static str>>,
    pub node_ids: Option<Vec<NodeId>>,
    pub field_ids: Option<Vec<NodeId>>,
    pub supertag_ids: Option<Vec<NodeId>>,
}

impl EventFilter {
    pub fn matches(&self, event: &DbEvent) -> bool {
        if let Some(types) = &self.types
        && !types.contains(&event.type_name())
        {
            return false;
        }
        if let Some(node_ids) = &self.node_ids
        && !node_ids.contains(&event.node_id())
        {
            return false;
        }
        if let Some(field_ids) = &self.field_ids {
            match event.field_id() {
                Some(id) if field_ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(supertag_ids) = &self.supertag_ids {
            match event.supertag_id() {
                Some(id) if supertag_ids.contains(&id) => {}
                _ => return false,
            }
        }
        true
    }
}
