use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::core::{NodeId, Result};
use crate::events::DbEvent;
use crate::node::{NodeService, FIELD_SUPERTAG};
use crate::query::filter::{QueryDefinition, QueryFilter, RelationType, SortField, TemporalField};

/// Identifies a live query registration with [`crate::subscription::SubscriptionService`].
pub type SubscriptionId = u64;

/// An opaque unit of invalidation. Field and supertag filters
/// register both the resolved [`NodeId`] form and the textual `systemId`
/// form, since a mutation event may surface either (a field created after a
/// subscription registers still matches via its system id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyKey {
    FieldId(NodeId),
    FieldSystemId(String),
    SupertagId(NodeId),
    Content,
    NodeMembership,
    AnySupertag,
    Owner,
    CreatedAt,
    UpdatedAt,
}

/// Maps live queries to the minimal set of mutation signals that could
/// change their result.
#[derive(Default)]
pub struct DependencyTracker {
    reverse_index: RwLock<HashMap<DependencyKey, HashSet<SubscriptionId>>>,
    forward_index: RwLock<HashMap<SubscriptionId, HashSet<DependencyKey>>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `definition`'s filter tree (and its `sort`) into a dependency
    /// set, resolving field/supertag system ids against `node_service` where
    /// possible.
    pub async fn keys_for_definition(
        &self,
        definition: &QueryDefinition,
        node_service: &NodeService,
    ) -> Result<HashSet<DependencyKey>> {
        let mut keys = HashSet::new();
        keys.insert(DependencyKey::NodeMembership);

        for filter in &definition.filters {
            Self::collect_filter_keys(filter, node_service, &mut keys).await?;
        }

        if let Some(sort) = &definition.sort {
            match &sort.field {
                SortField::Content => {
                    keys.insert(DependencyKey::Content);
                }
                SortField::CreatedAt => {
                    keys.insert(DependencyKey::CreatedAt);
                }
                SortField::UpdatedAt => {
                    keys.insert(DependencyKey::UpdatedAt);
                }
                SortField::Field(system_id) => {
                    Self::register_field_key(system_id, node_service, &mut keys).await;
                }
            }
        }

        Ok(keys)
    }

    fn collect_filter_keys<'a>(
        filter: &'a QueryFilter,
        node_service: &'a NodeService,
        keys: &'a mut HashSet<DependencyKey>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
                match filter {
                    QueryFilter::Supertag {
                        supertag_system_id,
                        include_inherited,
                    } => {
                        if let Ok(id) = node_service.resolve_system_id(supertag_system_id).await {
                            keys.insert(DependencyKey::SupertagId(id));
                        }
                        Self::register_field_key(FIELD_SUPERTAG, node_service, keys).await;
                        if *include_inherited {
                            keys.insert(DependencyKey::AnySupertag);
                        }
                    }
                    QueryFilter::Property { field_system_id, .. } | QueryFilter::HasField { field_system_id, .. } => {
                        Self::register_field_key(field_system_id, node_service, keys).await;
                    }
                    QueryFilter::Content { .. } => {
                        keys.insert(DependencyKey::Content);
                    }
                    QueryFilter::Temporal { field, .. } => {
                        keys.insert(match field {
                                TemporalField::CreatedAt => DependencyKey::CreatedAt,
                                TemporalField::UpdatedAt => DependencyKey::UpdatedAt,
                        });
                    }
                    QueryFilter::Relation {
                        relation_type,
                        field_system_id,
                        ..
                    } => match relation_type {
                        RelationType::ChildOf | RelationType::OwnedBy => {
                            keys.insert(DependencyKey::Owner);
                        }
                        RelationType::LinksTo | RelationType::LinkedFrom => match field_system_id {
                            Some(system_id) => Self::register_field_key(system_id, node_service, keys).await,
                            None => {
                                keys.insert(DependencyKey::NodeMembership);
                            }
                        },
                    },
                    QueryFilter::And { filters } | QueryFilter::Or { filters } | QueryFilter::Not { filters } => {
                        for child in filters {
                            Self::collect_filter_keys(child, node_service, keys).await?;
                        }
                    }
                }
                Ok(())
        })
    }

    async fn register_field_key(system_id: &str, node_service: &NodeService, keys: &mut HashSet<DependencyKey>) {
        keys.insert(DependencyKey::FieldSystemId(system_id.to_string()));
        if let Ok(id) = node_service.resolve_system_id(system_id).await {
            keys.insert(DependencyKey::FieldId(id));
        }
    }

    /// The dependency keys a mutation event touches ("Mutation → keys").
    pub fn keys_for_event(event: &DbEvent) -> HashSet<DependencyKey> {
        match event {
            DbEvent::NodeCreated { .. } | DbEvent::NodeDeleted { .. } => {
                HashSet::from([DependencyKey::NodeMembership, DependencyKey::AnySupertag])
            }
            DbEvent::NodeUpdated { .. } => HashSet::from([DependencyKey::Content, DependencyKey::UpdatedAt]),
            DbEvent::PropertySet {
                field_id,
                field_system_id,
                ..
            }
            | DbEvent::PropertyAdded {
                field_id,
                field_system_id,
                ..
            }
            | DbEvent::PropertyRemoved {
                field_id,
                field_system_id,
                ..
            } => {
                let mut keys = HashSet::from([DependencyKey::FieldId(*field_id), DependencyKey::UpdatedAt]);
                if let Some(system_id) = field_system_id {
                    keys.insert(DependencyKey::FieldSystemId(system_id.clone()));
                }
                keys
            }
            DbEvent::SupertagAdded { supertag_id, .. } | DbEvent::SupertagRemoved { supertag_id, .. } => HashSet::from([
                    DependencyKey::SupertagId(*supertag_id),
                    DependencyKey::AnySupertag,
                    DependencyKey::UpdatedAt,
            ]),
        }
    }

    /// Registers `subscription_id`'s dependency set, replacing any prior
    /// registration for the same id.
    pub async fn register(&self, subscription_id: SubscriptionId, keys: HashSet<DependencyKey>) {
        self.unregister(subscription_id).await;
        let mut reverse = self.reverse_index.write().await;
        for key in &keys {
            reverse.entry(key.clone()).or_default().insert(subscription_id);
        }
        self.forward_index.write().await.insert(subscription_id, keys);
    }

    pub async fn unregister(&self, subscription_id: SubscriptionId) {
        let Some(keys) = self.forward_index.write().await.remove(&subscription_id) else {
            return;
        };
        let mut reverse = self.reverse_index.write().await;
        for key in keys {
            if let Some(subs) = reverse.get_mut(&key) {
                subs.remove(&subscription_id);
                if subs.is_empty() {
                    reverse.remove(&key);
                }
            }
        }
    }

    /// Subscriptions whose dependency set intersects `event`'s keys.
    pub async fn affected_by_event(&self, event: &DbEvent) -> HashSet<SubscriptionId> {
        let keys = Self::keys_for_event(event);
        let reverse = self.reverse_index.read().await;
        let mut affected = HashSet::new();
        for key in &keys {
            if let Some(subs) = reverse.get(key) {
                affected.extend(subs.iter().copied());
            }
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::events::EventBus;
    use crate::node::CreateNodeInput;
    use crate::storage::{InMemoryPersistence, Persistence};
    use std::sync::Arc;

    async fn node_service() -> NodeService {
        let persistence: Arc<dyn Persistence> = Arc::new(InMemoryPersistence::new());
        NodeService::new(persistence, Arc::new(EventBus::new()), Arc::new(TestClock::default()))
    }

    #[tokio::test]
    async fn property_filter_registers_both_id_and_system_id_forms() {
        let svc = node_service().await;
        let field_id = svc
            .create_node(CreateNodeInput {
                system_id: Some("field:status".into()),
                ..Default::default()
        })
            .await
            .unwrap();

        let tracker = DependencyTracker::new();
        let definition = QueryDefinition {
            filters: vec![QueryFilter::Property {
                    field_system_id: "field:status".into(),
                    op: crate::query::filter::PropertyOp::Eq,
                    value: crate::core::PropertyValue::Text("done".into()),
            }],
            sort: None,
            limit: None,
        };
        let keys = tracker.keys_for_definition(&definition, &svc).await.unwrap();
        assert!(keys.contains(&DependencyKey::FieldId(field_id)));
        assert!(keys.contains(&DependencyKey::FieldSystemId("field:status".into())));
        assert!(keys.contains(&DependencyKey::NodeMembership));
    }

    #[tokio::test]
    async fn affected_by_event_only_returns_subscriptions_with_matching_keys() {
        let tracker = DependencyTracker::new();
        let field_a = NodeId::new();
        let field_b = NodeId::new();
        tracker.register(1, HashSet::from([DependencyKey::FieldId(field_a)])).await;
        tracker.register(2, HashSet::from([DependencyKey::FieldId(field_b)])).await;

        let affected = tracker
            .affected_by_event(&DbEvent::PropertySet {
                node_id: NodeId::new(),
                field_id: field_a,
                field_system_id: None,
                before_value: None,
                after_value: None,
        })
            .await;

        assert_eq!(affected, HashSet::from([1]));
    }

    #[tokio::test]
    async fn unregister_removes_stale_reverse_index_entries() {
        let tracker = DependencyTracker::new();
        let field = NodeId::new();
        tracker.register(1, HashSet::from([DependencyKey::FieldId(field)])).await;
        tracker.unregister(1).await;

        let affected = tracker
            .affected_by_event(&DbEvent::PropertySet {
                node_id: NodeId::new(),
                field_id: field,
                field_system_id: None,
                before_value: None,
                after_value: None,
        })
            .await;
        assert!(affected.is_empty());
    }
}
