use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::core::{CoreError, NodeId, NodeRef, PropertyValue, Result};
use crate::events::{DbEvent, EventBus};
use crate::node::cache::SystemNodeCache;
use crate::node::model::{AssembledNode, Node, Property};
use crate::storage::Persistence;

/// System id of the field that assigns a supertag to a node. Multi-valued:
/// a node may carry several `field:supertag` properties, one per assigned
/// supertag.
pub const FIELD_SUPERTAG: &str = "field:supertag";
/// System id of the field relating a supertag to its parent supertag.
pub const FIELD_EXTENDS: &str = "field:extends";
/// System id of the field classifying a field node's expected value shape.
pub const FIELD_TYPE: &str = "field:field_type";

/// Input to [`NodeService::create_node`].
#[derive(Debug, Clone, Default)]
pub struct CreateNodeInput {
    pub content: Option<String>,
    pub system_id: Option<String>,
    pub supertag: Option<NodeRef>,
    pub owner_id: Option<NodeId>,
}

/// Node CRUD, property mutation, and supertag assignment.
///
/// An async service wrapping shared state behind `Arc`, the same shape as
/// any other manager in this crate that owns a table and publishes events
/// about what it does to it.
pub struct NodeService {
    persistence: Arc<dyn Persistence>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    system_cache: SystemNodeCache,
}

impl NodeService {
    pub fn new(persistence: Arc<dyn Persistence>, events: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            persistence,
            events,
            clock,
            system_cache: SystemNodeCache::new(),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn clear_system_node_cache(&self) {
        self.system_cache.clear().await;
    }

    /// Resolves a `systemId` to its [`NodeId`], using (and populating) the
    /// system-node cache.
    pub async fn resolve_system_id(&self, system_id: &str) -> Result<NodeId> {
        if let Some(id) = self.system_cache.get(system_id).await {
            return Ok(id);
        }
        let node = self
            .persistence
            .find_node_by_system_id(system_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(system_id.to_string()))?;
        self.system_cache.put(system_id.to_string(), node.id).await;
        Ok(node.id)
    }

    pub async fn resolve_ref(&self, node_ref: &NodeRef) -> Result<NodeId> {
        match node_ref {
            NodeRef::Id(id) => Ok(*id),
            NodeRef::SystemId(system_id) => self.resolve_system_id(system_id).await,
        }
    }

    /// Like [`Self::resolve_system_id`] but creates an empty field node on
    /// demand when none exists yet (: implicit field auto-creation
    /// is allowed unconditionally).
    async fn ensure_field(&self, system_id: &str) -> Result<NodeId> {
        match self.resolve_system_id(system_id).await {
            Ok(id) => Ok(id),
            Err(CoreError::NotFound(_)) => {
                self.create_node(CreateNodeInput {
                        system_id: Some(system_id.to_string()),
                        ..Default::default()
                })
                    .await
            }
            Err(other) => Err(other),
        }
    }

    pub async fn create_node(&self, input: CreateNodeInput) -> Result<NodeId> {
        if let Some(system_id) = &input.system_id
        && self
            .persistence
            .find_node_by_system_id(system_id)
            .await?
            .is_some()
        {
            return Err(CoreError::DuplicateSystemId(system_id.clone()));
        }

        let now = self.clock.now_millis();
        let id = NodeId::new();
        let node = Node {
            id,
            content: input.content.clone(),
            content_plain: input.content.as_deref().map(|c| c.to_lowercase()),
            system_id: input.system_id,
            owner_id: input.owner_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.persistence.insert_node(node).await?;
        self.events
            .publish(DbEvent::NodeCreated {
                node_id: id,
                timestamp: now,
        })
            .await;

        if let Some(supertag) = &input.supertag {
            self.add_node_supertag(id, supertag.clone()).await?;
        }

        debug!(node_id = %id, "node created");
        Ok(id)
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Option<AssembledNode>> {
        let Some(node) = self.persistence.get_node(id).await? else {
            return Ok(None);
        };
        if node.is_deleted() {
            return Ok(None);
        }
        Ok(Some(self.assemble(node).await?))
    }

    pub async fn find_node(&self, node_ref: impl Into<NodeRef>) -> Result<Option<AssembledNode>> {
        let node_ref = node_ref.into();
        match node_ref {
            NodeRef::Id(id) => self.get_node(id).await,
            NodeRef::SystemId(system_id) => {
                let Some(node) = self.persistence.find_node_by_system_id(&system_id).await? else {
                    return Ok(None);
                };
                if node.is_deleted() {
                    return Ok(None);
                }
                self.system_cache.put(system_id, node.id).await;
                Ok(Some(self.assemble(node).await?))
            }
        }
    }

    pub(crate) async fn assemble(&self, node: Node) -> Result<AssembledNode> {
        let rows = self.persistence.properties_for_node(node.id).await?;
        let mut properties: BTreeMap<NodeId, Vec<PropertyValue>> = BTreeMap::new();
        let mut supertags = Vec::new();
        let supertag_field = self.resolve_system_id(FIELD_SUPERTAG).await.ok();

        for row in rows {
            if Some(row.field_node_id) == supertag_field
            && let Some(tag_id) = row.value.as_ref_id()
            {
                supertags.push(tag_id);
            }
            properties.entry(row.field_node_id).or_default().push(row.value);
        }

        Ok(AssembledNode {
                node,
                properties,
                supertags,
        })
    }

    pub async fn update_node_content(&self, id: NodeId, content: Option<String>) -> Result<()> {
        let mut node = self
            .persistence
            .get_node(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let before_content = node.content.clone();
        node.content_plain = content.as_deref().map(|c| c.to_lowercase());
        node.content = content.clone();
        node.updated_at = self.clock.now_millis();
        self.persistence.update_node(node).await?;
        self.events
            .publish(DbEvent::NodeUpdated {
                node_id: id,
                before_content,
                after_content: content,
        })
            .await;
        Ok(())
    }

    /// Upsert with scalar replace semantics: any prior value(s) for
    /// `(node_id, field)` are replaced by this single value at order 0.
    pub async fn set_property(
        &self,
        node_id: NodeId,
        field: impl Into<NodeRef>,
        value: PropertyValue,
    ) -> Result<()> {
        let field_ref = field.into();
        let (field_id, field_system_id) = self.resolve_field(&field_ref).await?;
        self.persistence.clear_property(node_id, field_id).await?;
        let now = self.clock.now_millis();
        let before_value = None;
        self.persistence
            .upsert_property(Property {
                node_id,
                field_node_id: field_id,
                value: value.clone(),
                order: 0,
                created_at: now,
                updated_at: now,
        })
            .await?;
        self.touch_updated_at(node_id, now).await?;
        self.events
            .publish(DbEvent::PropertySet {
                node_id,
                field_id,
                field_system_id,
                before_value,
                after_value: Some(value),
        })
            .await;
        Ok(())
    }

    /// Append semantics for multi-valued fields.
    pub async fn add_property_value(
        &self,
        node_id: NodeId,
        field: impl Into<NodeRef>,
        value: PropertyValue,
    ) -> Result<()> {
        let field_ref = field.into();
        let (field_id, field_system_id) = self.resolve_field(&field_ref).await?;
        let existing = self.persistence.properties_for_node(node_id).await?;
        let next_order = existing
            .iter()
            .filter(|p| p.field_node_id == field_id)
            .map(|p| p.order)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        let now = self.clock.now_millis();
        self.persistence
            .upsert_property(Property {
                node_id,
                field_node_id: field_id,
                value: value.clone(),
                order: next_order,
                created_at: now,
                updated_at: now,
        })
            .await?;
        self.touch_updated_at(node_id, now).await?;
        self.events
            .publish(DbEvent::PropertyAdded {
                node_id,
                field_id,
                field_system_id,
                after_value: value,
        })
            .await;
        Ok(())
    }

    pub async fn clear_property(&self, node_id: NodeId, field: impl Into<NodeRef>) -> Result<()> {
        let field_ref = field.into();
        let (field_id, field_system_id) = self.resolve_field(&field_ref).await?;
        self.persistence.clear_property(node_id, field_id).await?;
        self.touch_updated_at(node_id, self.clock.now_millis()).await?;
        self.events
            .publish(DbEvent::PropertyRemoved {
                node_id,
                field_id,
                field_system_id,
        })
            .await;
        Ok(())
    }

    pub async fn link_nodes(
        &self,
        source_id: NodeId,
        field: impl Into<NodeRef>,
        target_id: NodeId,
    ) -> Result<()> {
        self.set_property(source_id, field, PropertyValue::Ref(target_id)).await
    }

    pub async fn add_node_supertag(&self, node_id: NodeId, supertag: impl Into<NodeRef>) -> Result<()> {
        let supertag_id = self.resolve_ref(&supertag.into()).await?;
        let supertag_field = self.ensure_field(FIELD_SUPERTAG).await?;
        let now = self.clock.now_millis();
        let existing = self.persistence.properties_for_node(node_id).await?;
        let already = existing
            .iter()
            .any(|p| p.field_node_id == supertag_field && p.value.as_ref_id() == Some(supertag_id));
        if already {
            return Ok(());
        }
        let next_order = existing
            .iter()
            .filter(|p| p.field_node_id == supertag_field)
            .map(|p| p.order)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        self.persistence
            .upsert_property(Property {
                node_id,
                field_node_id: supertag_field,
                value: PropertyValue::Ref(supertag_id),
                order: next_order,
                created_at: now,
                updated_at: now,
        })
            .await?;
        self.touch_updated_at(node_id, now).await?;
        let supertag_system_id = self.persistence.get_node(supertag_id).await?.and_then(|n| n.system_id);
        self.events
            .publish(DbEvent::SupertagAdded {
                node_id,
                supertag_id,
                supertag_system_id,
        })
            .await;
        Ok(())
    }

    pub async fn remove_node_supertag(&self, node_id: NodeId, supertag: impl Into<NodeRef>) -> Result<()> {
        let supertag_id = self.resolve_ref(&supertag.into()).await?;
        let Ok(supertag_field) = self.resolve_system_id(FIELD_SUPERTAG).await else {
            return Ok(());
        };
        let existing = self.persistence.properties_for_node(node_id).await?;
        let had_it = existing
            .iter()
            .any(|p| p.field_node_id == supertag_field && p.value.as_ref_id() == Some(supertag_id));
        if !had_it {
            return Ok(());
        }
        // Rewrite the remaining supertag assignments, since clear_property
        // drops every property for the field.
        self.persistence.clear_property(node_id, supertag_field).await?;
        let now = self.clock.now_millis();
        let mut order = 0;
        for prop in existing
            .into_iter()
            .filter(|p| p.field_node_id == supertag_field && p.value.as_ref_id() != Some(supertag_id))
        {
            self.persistence
                .upsert_property(Property {
                    node_id,
                    field_node_id: supertag_field,
                    value: prop.value,
                    order,
                    created_at: prop.created_at,
                    updated_at: now,
            })
                .await?;
            order += 1;
        }
        self.touch_updated_at(node_id, now).await?;
        let supertag_system_id = self.persistence.get_node(supertag_id).await?.and_then(|n| n.system_id);
        self.events
            .publish(DbEvent::SupertagRemoved {
                node_id,
                supertag_id,
                supertag_system_id,
        })
            .await;
        Ok(())
    }

    pub async fn delete_node(&self, id: NodeId) -> Result<()> {
        let mut node = self
            .persistence
            .get_node(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        node.deleted_at = Some(self.clock.now_millis());
        self.persistence.update_node(node).await?;
        self.events.publish(DbEvent::NodeDeleted { node_id: id }).await;
        Ok(())
    }

    async fn resolve_field(&self, field_ref: &NodeRef) -> Result<(NodeId, Option<String>)> {
        match field_ref {
            NodeRef::Id(id) => {
                let system_id = self.persistence.get_node(*id).await?.and_then(|n| n.system_id);
                Ok((*id, system_id))
            }
            NodeRef::SystemId(system_id) => {
                let id = self.ensure_field(system_id).await?;
                Ok((id, Some(system_id.clone())))
            }
        }
    }

    async fn touch_updated_at(&self, node_id: NodeId, now: i64) -> Result<()> {
        if let Some(mut node) = self.persistence.get_node(node_id).await? {
            node.updated_at = now;
            self.persistence.update_node(node).await?;
        }
        Ok(())
    }
}
