//! Derived-entity shapes : rendering conventions layered on top of
//! assembled nodes. None of these are stored; every call re-derives the
//! shape from whatever properties the node currently carries, so there is
//! nothing here to keep in sync.

use crate::core::{NodeId, PropertyValue};
use crate::node::model::AssembledNode;
use crate::node::NodeService;

/// `#Item` (and its descendants `#Tool`, `#Repo`): a node with content,
/// optional owner, and whatever supertags it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub id: NodeId,
    pub content: Option<String>,
    pub owner_id: Option<NodeId>,
    pub supertags: Vec<NodeId>,
}

/// `#Command`, owned by an item via `ownerId`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandView {
    pub id: NodeId,
    pub content: Option<String>,
    pub owner_id: Option<NodeId>,
}

/// `#Tag`, hierarchical via `field:parent`.
#[derive(Debug, Clone, PartialEq)]
pub struct TagView {
    pub id: NodeId,
    pub content: Option<String>,
    pub parent_id: Option<NodeId>,
}

/// `#Inbox` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntryView {
    pub id: NodeId,
    pub content: Option<String>,
    pub created_at: i64,
}

/// `#Automation`, surfacing just the bookkeeping fields the engine
/// maintains on the node (enabled flag, last fired timestamp); the trigger
/// and action live in the definition JSON and are not re-parsed here.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationView {
    pub id: NodeId,
    pub name: Option<String>,
    pub enabled: bool,
    pub last_fired_at: Option<i64>,
}

/// `#ComputedField`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedFieldView {
    pub id: NodeId,
    pub name: Option<String>,
    pub value: Option<PropertyValue>,
    pub updated_at: Option<i64>,
}

/// `#Query`: a saved query, named and persisted like any other node.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedQueryView {
    pub id: NodeId,
    pub name: Option<String>,
}

/// Resolves a system id to a property value on `node`, returning `None` if
/// either the field or the property is absent rather than erroring — a
/// view is best-effort by nature.
async fn property(node_service: &NodeService, node: &AssembledNode, field_system_id: &str) -> Option<PropertyValue> {
    let field_id = node_service.resolve_system_id(field_system_id).await.ok()?;
    node.property(field_id).cloned()
}

pub async fn as_item(node_service: &NodeService, node: &AssembledNode) -> ItemView {
    ItemView {
        id: node.id(),
        content: node.node.content.clone(),
        owner_id: node.node.owner_id,
        supertags: node.supertags.clone(),
    }
}

pub async fn as_command(_node_service: &NodeService, node: &AssembledNode) -> CommandView {
    CommandView {
        id: node.id(),
        content: node.node.content.clone(),
        owner_id: node.node.owner_id,
    }
}

pub async fn as_tag(node_service: &NodeService, node: &AssembledNode) -> TagView {
    let parent_id = property(node_service, node, crate::bootstrap::FIELD_PARENT)
        .await
        .and_then(|v| v.as_ref_id());
    TagView {
        id: node.id(),
        content: node.node.content.clone(),
        parent_id,
    }
}

pub async fn as_inbox_entry(_node_service: &NodeService, node: &AssembledNode) -> InboxEntryView {
    InboxEntryView {
        id: node.id(),
        content: node.node.content.clone(),
        created_at: node.node.created_at,
    }
}

pub async fn as_automation(node_service: &NodeService, node: &AssembledNode) -> AutomationView {
    let enabled = property(node_service, node, crate::automation::FIELD_AUTOMATION_ENABLED)
        .await
        .and_then(|v| match v {
            PropertyValue::Bool(b) => Some(b),
            _ => None,
    })
        .unwrap_or(false);
    let last_fired_at = property(node_service, node, crate::automation::FIELD_AUTOMATION_LAST_FIRED)
        .await
        .and_then(|v| v.as_number())
        .map(|n| n as i64);
    AutomationView {
        id: node.id(),
        name: node.node.content.clone(),
        enabled,
        last_fired_at,
    }
}

pub async fn as_computed_field(node_service: &NodeService, node: &AssembledNode) -> ComputedFieldView {
    let value = property(node_service, node, crate::computed::FIELD_COMPUTED_VALUE).await;
    let updated_at = property(node_service, node, crate::computed::FIELD_COMPUTED_UPDATED_AT)
        .await
        .and_then(|v| v.as_number())
        .map(|n| n as i64);
    ComputedFieldView {
        id: node.id(),
        name: node.node.content.clone(),
        value,
        updated_at,
    }
}

pub async fn as_saved_query(_node_service: &NodeService, node: &AssembledNode) -> SavedQueryView {
    SavedQueryView {
        id: node.id(),
        name: node.node.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{self, SUPERTAG_ITEM};
    use crate::clock::TestClock;
    use crate::events::EventBus;
    use crate::node::CreateNodeInput;
    use crate::storage::InMemoryPersistence;
    use std::sync::Arc;

    async fn service() -> NodeService {
        let svc = NodeService::new(
            Arc::new(InMemoryPersistence::new()),
            Arc::new(EventBus::new()),
            Arc::new(TestClock::default()),
        );
        bootstrap::bootstrap(&svc).await.unwrap();
        svc
    }

    #[tokio::test]
    async fn as_item_carries_owner_and_supertags() {
        let svc = service().await;
        let item_tag = svc.resolve_system_id(SUPERTAG_ITEM).await.unwrap();
        let id = svc
            .create_node(CreateNodeInput {
                content: Some("widget".into()),
                supertag: Some(item_tag.into()),
                ..Default::default()
        })
            .await
            .unwrap();
        let node = svc.get_node(id).await.unwrap().unwrap();
        let view = as_item(&svc, &node).await;
        assert_eq!(view.content.as_deref(), Some("widget"));
        assert!(view.supertags.contains(&item_tag));
    }

    #[tokio::test]
    async fn as_tag_reads_parent_field() {
        let svc = service().await;
        let parent = svc.create_node(CreateNodeInput::default()).await.unwrap();
        let child = svc.create_node(CreateNodeInput::default()).await.unwrap();
        svc.set_property(child, bootstrap::FIELD_PARENT, parent.into()).await.unwrap();
        let node = svc.get_node(child).await.unwrap().unwrap();
        let view = as_tag(&svc, &node).await;
        assert_eq!(view.parent_id, Some(parent));
    }
}
