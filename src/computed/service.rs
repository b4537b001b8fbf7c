use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::clock::Clock;
use crate::computed::definition::{Aggregation, ComputedFieldDefinition};
use crate::core::{CoreError, NodeId, PropertyValue, Result};
use crate::node::model::AssembledNode;
use crate::node::{CreateNodeInput, NodeService, FIELD_SUPERTAG};
use crate::subscription::{ChangeEvent, SubscriptionHandle, SubscriptionService};

pub const FIELD_COMPUTED_DEFINITION: &str = "computed_field_definition";
pub const FIELD_COMPUTED_VALUE: &str = "computed_field_value";
pub const FIELD_COMPUTED_UPDATED_AT: &str = "computed_field_updated_at";

pub type ValueListenerId = u64;
/// `ComputedFieldChangeCallback({ previous, current })`.
pub type ValueCallback = Box<dyn Fn(PropertyValue, PropertyValue) + Send + Sync>;

struct FieldState {
    definition: ComputedFieldDefinition,
    field_id: Option<NodeId>,
    current: HashMap<NodeId, AssembledNode>,
    value: PropertyValue,
    // kept alive for the lifetime of the computed field; dropping it would
    // unsubscribe the underlying live query.
    _query_handle: SubscriptionHandle,
}

struct Shared {
    fields: RwLock<HashMap<NodeId, FieldState>>,
    value_listeners: RwLock<HashMap<NodeId, Vec<(ValueListenerId, ValueCallback)>>>,
    next_listener_id: AtomicU64,
}

impl Shared {
    /// Applies one subscription diff to a field's cached result set,
    /// re-aggregates, and on a changed value persists it through and
    /// notifies threshold listeners.
    async fn apply_change(
        &self,
        computed_id: NodeId,
        change: ChangeEvent,
        node_service: &NodeService,
        clock: &dyn Clock,
    ) {
        let new_value = {
            let mut fields = self.fields.write().await;
            let Some(state) = fields.get_mut(&computed_id) else {
                return;
            };
            for removed in &change.removed {
                state.current.remove(&removed.id());
            }
            for node in change.added.iter().chain(change.changed.iter()) {
                state.current.insert(node.id(), node.clone());
            }
            let new_value = aggregate(&state.definition, state.field_id, &state.current);
            if new_value == state.value {
                None
            } else {
                state.value = new_value.clone();
                Some(new_value)
            }
        };
        let Some(new_value) = new_value else {
            return;
        };

        if let Err(err) = node_service
            .set_property(computed_id, FIELD_COMPUTED_VALUE, new_value.clone())
            .await
        {
            warn!(computed_field_id = %computed_id, error = %err, "failed to persist computed field value");
            return;
        }
        let _ = node_service
            .set_property(
            computed_id,
            FIELD_COMPUTED_UPDATED_AT,
            PropertyValue::Number(clock.now_millis() as f64),
        )
            .await;

        self.notify_value_listeners(computed_id, new_value).await;
    }

    async fn notify_value_listeners(&self, computed_id: NodeId, current: PropertyValue) {
        let listeners = self.value_listeners.read().await;
        let Some(list) = listeners.get(&computed_id) else {
            return;
        };
        for (_, callback) in list {
            let current = current.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| callback(PropertyValue::Null, current))).is_err() {
                warn!(computed_field_id = %computed_id, "computed field value listener panicked; isolated");
            }
        }
    }
}

fn aggregate(
    definition: &ComputedFieldDefinition,
    field_id: Option<NodeId>,
    nodes: &HashMap<NodeId, AssembledNode>,
) -> PropertyValue {
    if let Aggregation::Count = definition.aggregation {
        return PropertyValue::Number(nodes.len() as f64);
    }

    let values: Vec<f64> = field_id
        .map(|id| nodes.values().filter_map(|n| n.property(id).and_then(|v| v.as_number())).collect())
        .unwrap_or_default();
    if values.is_empty() {
        return PropertyValue::Null;
    }

    match definition.aggregation {
        Aggregation::Sum => PropertyValue::Number(values.iter().sum()),
        Aggregation::Avg => PropertyValue::Number(values.iter().sum::<f64>() / values.len() as f64),
        Aggregation::Min => PropertyValue::Number(values.iter().cloned().fold(f64::INFINITY, f64::min)),
        Aggregation::Max => PropertyValue::Number(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        Aggregation::Count => unreachable!(),
    }
}

/// Live aggregation over a sub-query, materialized onto a host node's
/// property. Rides subscription diffs for change notification rather than
/// re-running the full query on every mutation.
pub struct ComputedFieldService {
    node_service: Arc<NodeService>,
    subscriptions: Arc<SubscriptionService>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl ComputedFieldService {
    pub fn new(node_service: Arc<NodeService>, subscriptions: Arc<SubscriptionService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            node_service,
            subscriptions,
            clock,
            shared: Arc::new(Shared {
                    fields: RwLock::new(HashMap::new()),
                    value_listeners: RwLock::new(HashMap::new()),
                    next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates the computed field node, evaluates it once, and subscribes to
    /// its sub-query for incremental re-aggregation.
    pub async fn create(
        &self,
        name: Option<String>,
        definition: ComputedFieldDefinition,
    ) -> Result<NodeId> {
        if !definition.validate() {
            return Err(CoreError::InvalidDefinition(
                    "aggregation requires fieldId unless COUNT".into(),
            ));
        }
        if self.node_service.resolve_system_id(FIELD_SUPERTAG).await.is_err() {
            return Err(CoreError::NotBootstrapped);
        }

        let field_id = match &definition.field_system_id {
            Some(system_id) => Some(self.node_service.resolve_system_id(system_id).await?),
            None => None,
        };

        let node_id = self
            .node_service
            .create_node(CreateNodeInput {
                content: name,
                supertag: Some("supertag:computed_field".into()),
                ..Default::default()
        })
            .await?;

        self.node_service
            .set_property(
            node_id,
            FIELD_COMPUTED_DEFINITION,
            PropertyValue::Json(
                serde_json::to_value(&definition)
                    .map_err(|e| CoreError::InvalidDefinition(e.to_string()))?,
            ),
        )
            .await?;

        let shared = self.shared.clone();
        let node_service = self.node_service.clone();
        let clock = self.clock.clone();
        let callback: crate::subscription::ChangeCallback = Arc::new(move |change: ChangeEvent| {
                let shared = shared.clone();
                let node_service = node_service.clone();
                let clock = clock.clone();
                futures::executor::block_on(async move {
                        shared.apply_change(node_id, change, &node_service, clock.as_ref()).await;
                });
        });

        let query_handle = self.subscriptions.subscribe(definition.query.clone(), callback).await?;
        let current: HashMap<NodeId, AssembledNode> = query_handle
            .last_results()
            .await
            .into_iter()
            .map(|n| (n.id(), n))
            .collect();
        let value = aggregate(&definition, field_id, &current);

        self.node_service
            .set_property(node_id, FIELD_COMPUTED_VALUE, value.clone())
            .await?;
        self.node_service
            .set_property(
            node_id,
            FIELD_COMPUTED_UPDATED_AT,
            PropertyValue::Number(self.clock.now_millis() as f64),
        )
            .await?;

        self.shared.fields.write().await.insert(
            node_id,
            FieldState {
                definition,
                field_id,
                current,
                value,
                _query_handle: query_handle,
            },
        );

        Ok(node_id)
    }

    pub async fn current_value(&self, computed_field_id: NodeId) -> Option<PropertyValue> {
        self.shared
            .fields
            .read()
            .await
            .get(&computed_field_id)
            .map(|state| state.value.clone())
    }

    /// Registers `callback` for `{previous, current}` ticks on a computed
    /// field's value; used by the threshold trigger. `previous` is always
    /// `Null` here — edge detection against the prior value is the caller's
    /// responsibility (tracks its own latch), matching division of
    /// labor.
    pub async fn subscribe_to_value(&self, computed_field_id: NodeId, callback: ValueCallback) -> ValueListenerId {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .value_listeners
            .write()
            .await
            .entry(computed_field_id)
            .or_default()
            .push((id, callback));
        id
    }

    pub async fn unsubscribe_value(&self, computed_field_id: NodeId, listener_id: ValueListenerId) {
        if let Some(list) = self.shared.value_listeners.write().await.get_mut(&computed_field_id) {
            list.retain(|(id, _)| *id != listener_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::events::EventBus;
    use crate::deps::DependencyTracker;
    use crate::query::filter::{QueryDefinition, QueryFilter};
    use crate::query::QueryEvaluator;
    use crate::storage::{InMemoryPersistence, Persistence};
    use crate::supertag::SupertagResolver;
    use std::sync::Mutex as StdMutex;

    struct Fixture {
        node_service: Arc<NodeService>,
        computed_fields: ComputedFieldService,
    }

    async fn fixture() -> Fixture {
        let persistence: Arc<dyn Persistence> = Arc::new(InMemoryPersistence::new());
        let events = Arc::new(EventBus::new());
        let clock = Arc::new(TestClock::default());
        let node_service = Arc::new(NodeService::new(persistence.clone(), events.clone(), clock.clone()));
        node_service
            .create_node(CreateNodeInput {
                system_id: Some(FIELD_SUPERTAG.to_string()),
                ..Default::default()
        })
            .await
            .unwrap();
        let resolver = Arc::new(SupertagResolver::new(persistence.clone(), node_service.clone(), 16));
        let evaluator = Arc::new(QueryEvaluator::new(
                persistence,
                node_service.clone(),
                resolver,
                clock.clone(),
                500,
        ));
        let tracker = Arc::new(DependencyTracker::new());
        let subscriptions = Arc::new(SubscriptionService::new(evaluator, node_service.clone(), tracker, events));
        let computed_fields = ComputedFieldService::new(node_service.clone(), subscriptions, clock);
        Fixture {
            node_service,
            computed_fields,
        }
    }

    #[tokio::test]
    async fn count_starts_at_zero_and_tracks_added_nodes() {
        let fx = fixture().await;
        let definition = ComputedFieldDefinition {
            aggregation: Aggregation::Count,
            query: QueryDefinition {
                filters: vec![QueryFilter::Supertag {
                        supertag_system_id: "supertag:subscription".into(),
                        include_inherited: true,
                }],
                sort: None,
                limit: None,
            },
            field_system_id: None,
        };
        let field_id = fx.computed_fields.create(Some("sub count".into()), definition).await.unwrap();
        assert_eq!(
            fx.computed_fields.current_value(field_id).await,
            Some(PropertyValue::Number(0.0))
        );

        fx.node_service
            .create_node(CreateNodeInput {
                supertag: Some("supertag:subscription".into()),
                ..Default::default()
        })
            .await
            .unwrap();

        assert_eq!(
            fx.computed_fields.current_value(field_id).await,
            Some(PropertyValue::Number(1.0))
        );
    }

    #[tokio::test]
    async fn sum_skips_non_numeric_values() {
        let fx = fixture().await;
        let a = fx
            .node_service
            .create_node(CreateNodeInput {
                supertag: Some("supertag:item".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        fx.node_service
            .set_property(a, "field:amount", PropertyValue::Number(5.0))
            .await
            .unwrap();

        let definition = ComputedFieldDefinition {
            aggregation: Aggregation::Sum,
            query: QueryDefinition {
                filters: vec![QueryFilter::Supertag {
                        supertag_system_id: "supertag:item".into(),
                        include_inherited: true,
                }],
                sort: None,
                limit: None,
            },
            field_system_id: Some("field:amount".into()),
        };
        let field_id = fx.computed_fields.create(None, definition).await.unwrap();
        assert_eq!(
            fx.computed_fields.current_value(field_id).await,
            Some(PropertyValue::Number(5.0))
        );

        let b = fx
            .node_service
            .create_node(CreateNodeInput {
                supertag: Some("supertag:item".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        fx.node_service
            .set_property(b, "field:amount", PropertyValue::Text("not a number".into()))
            .await
            .unwrap();

        assert_eq!(
            fx.computed_fields.current_value(field_id).await,
            Some(PropertyValue::Number(5.0))
        );
    }

    #[tokio::test]
    async fn value_listener_fires_on_change() {
        let fx = fixture().await;
        let definition = ComputedFieldDefinition {
            aggregation: Aggregation::Count,
            query: QueryDefinition {
                filters: vec![QueryFilter::Supertag {
                        supertag_system_id: "supertag:subscription".into(),
                        include_inherited: true,
                }],
                sort: None,
                limit: None,
            },
            field_system_id: None,
        };
        let field_id = fx.computed_fields.create(None, definition).await.unwrap();

        let seen: Arc<StdMutex<Vec<PropertyValue>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        fx.computed_fields
            .subscribe_to_value(
            field_id,
            Box::new(move |_previous, current| seen_clone.lock().unwrap().push(current)),
        )
            .await;

        fx.node_service
            .create_node(CreateNodeInput {
                supertag: Some("supertag:subscription".into()),
                ..Default::default()
        })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![PropertyValue::Number(1.0)]);
    }
}
