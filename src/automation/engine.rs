use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::automation::definition::{
    Action, AutomationDefinition, AutomationState, QueryMembershipEvent, ThresholdCondition, Trigger,
};
use crate::clock::Clock;
use crate::computed::{ComputedFieldService, ValueListenerId};
use crate::core::{CoreError, NodeId, PropertyValue, Result};
use crate::node::{CreateNodeInput, NodeService, FIELD_SUPERTAG};
use crate::subscription::{ChangeEvent, SubscriptionHandle, SubscriptionService};

pub const FIELD_AUTOMATION_DEFINITION: &str = "automation_definition";
pub const FIELD_AUTOMATION_STATE: &str = "automation_state";
pub const FIELD_AUTOMATION_LAST_FIRED: &str = "automation_last_fired";
pub const FIELD_AUTOMATION_ENABLED: &str = "automation_enabled";

enum TriggerHandle {
    Query(SubscriptionHandle),
    Threshold {
        computed_field_id: NodeId,
        listener_id: ValueListenerId,
    },
}

/// Persists automations as nodes; subscribes them to their trigger source
/// and runs their action through when the trigger fires, bounding
/// re-entrant firing with a depth-limited active stack.
pub struct AutomationEngine {
    node_service: Arc<NodeService>,
    subscriptions: Arc<SubscriptionService>,
    computed_fields: Arc<ComputedFieldService>,
    clock: Arc<dyn Clock>,
    max_depth: usize,
    handles: RwLock<HashMap<NodeId, TriggerHandle>>,
    active_stack: RwLock<Vec<NodeId>>,
}

impl AutomationEngine {
    pub fn new(
        node_service: Arc<NodeService>,
        subscriptions: Arc<SubscriptionService>,
        computed_fields: Arc<ComputedFieldService>,
        clock: Arc<dyn Clock>,
        max_depth: usize,
    ) -> Self {
        Self {
            node_service,
            subscriptions,
            computed_fields,
            clock,
            max_depth,
            handles: RwLock::new(HashMap::new()),
            active_stack: RwLock::new(Vec::new()),
        }
    }

    /// Creates the automation node and, if `definition.enabled`, subscribes
    /// it to its trigger source.
    pub async fn create(self: &Arc<Self>, definition: AutomationDefinition) -> Result<NodeId> {
        if self.node_service.resolve_system_id(FIELD_SUPERTAG).await.is_err() {
            return Err(CoreError::NotBootstrapped);
        }

        let node_id = self
            .node_service
            .create_node(CreateNodeInput {
                content: Some(definition.name.clone()),
                supertag: Some("supertag:automation".into()),
                ..Default::default()
        })
            .await?;

        self.save_definition(node_id, &definition).await?;
        self.save_state(node_id, &AutomationState::default()).await?;
        self.node_service
            .set_property(node_id, FIELD_AUTOMATION_ENABLED, PropertyValue::Bool(definition.enabled))
            .await?;

        if definition.enabled {
            self.activate(node_id, &definition).await?;
        }

        Ok(node_id)
    }

    /// Toggles an automation's subscription without touching its definition
    /// otherwise.
    pub async fn set_enabled(self: &Arc<Self>, automation_id: NodeId, enabled: bool) -> Result<()> {
        let mut definition = self
            .load_definition(automation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(automation_id.to_string()))?;
        if definition.enabled == enabled {
            return Ok(());
        }

        definition.enabled = enabled;
        self.save_definition(automation_id, &definition).await?;
        self.node_service
            .set_property(automation_id, FIELD_AUTOMATION_ENABLED, PropertyValue::Bool(enabled))
            .await?;

        if enabled {
            self.activate(automation_id, &definition).await?;
        } else {
            self.deactivate(automation_id).await;
        }
        Ok(())
    }

    /// Unsubscribes and soft-deletes the automation node.
    pub async fn delete(&self, automation_id: NodeId) -> Result<()> {
        self.deactivate(automation_id).await;
        self.node_service.delete_node(automation_id).await
    }

    /// Manual invocation bypassing trigger matching; still subject to cycle
    /// detection.
    pub async fn trigger(&self, automation_id: NodeId, target_node_id: NodeId) -> Result<()> {
        if self.load_definition(automation_id).await?.is_none() {
            return Err(CoreError::NotFound(automation_id.to_string()));
        }
        self.fire(automation_id, target_node_id).await;
        Ok(())
    }

    /// Unsubscribes every active automation.
    pub async fn clear(&self) {
        let ids: Vec<NodeId> = self.handles.read().await.keys().copied().collect();
        for id in ids {
            self.deactivate(id).await;
        }
    }

    async fn activate(self: &Arc<Self>, automation_id: NodeId, definition: &AutomationDefinition) -> Result<()> {
        match &definition.trigger {
            Trigger::QueryMembership { query, event } => {
                let engine = self.clone();
                let event = *event;
                let callback: crate::subscription::ChangeCallback = Arc::new(move |change: ChangeEvent| {
                        let engine = engine.clone();
                        let targets: Vec<NodeId> = match event {
                            QueryMembershipEvent::OnEnter => change.added.iter().map(|n| n.id()).collect(),
                            QueryMembershipEvent::OnExit => change.removed.iter().map(|n| n.id()).collect(),
                            QueryMembershipEvent::OnChange => change.changed.iter().map(|n| n.id()).collect(),
                        };
                        futures::executor::block_on(async move {
                                for target in targets {
                                    engine.fire(automation_id, target).await;
                                }
                        });
                });
                let handle = self.subscriptions.subscribe(query.clone(), callback).await?;
                self.handles.write().await.insert(automation_id, TriggerHandle::Query(handle));
            }
            Trigger::Threshold {
                computed_field_id,
                condition,
                fire_once,
                target_node_id,
            } => {
                let engine = self.clone();
                let condition = condition.clone();
                let fire_once = *fire_once;
                let target_node_id = *target_node_id;
                let value_callback: crate::computed::ValueCallback =
                Box::new(move |_previous: PropertyValue, current: PropertyValue| {
                        let engine = engine.clone();
                        let condition = condition.clone();
                        futures::executor::block_on(async move {
                                engine
                                    .handle_threshold_tick(automation_id, &condition, fire_once, target_node_id, current)
                                    .await;
                        });
                });
                let listener_id = self
                    .computed_fields
                    .subscribe_to_value(*computed_field_id, value_callback)
                    .await;
                self.handles.write().await.insert(
                    automation_id,
                    TriggerHandle::Threshold {
                        computed_field_id: *computed_field_id,
                        listener_id,
                    },
                );
            }
        }
        Ok(())
    }

    async fn deactivate(&self, automation_id: NodeId) {
        let Some(handle) = self.handles.write().await.remove(&automation_id) else {
            return;
        };
        match handle {
            TriggerHandle::Query(handle) => handle.unsubscribe().await,
            TriggerHandle::Threshold {
                computed_field_id,
                listener_id,
            } => {
                self.computed_fields.unsubscribe_value(computed_field_id, listener_id).await;
            }
        }
    }

    async fn handle_threshold_tick(
        &self,
        automation_id: NodeId,
        condition: &ThresholdCondition,
        fire_once: bool,
        target_node_id: Option<NodeId>,
        current: PropertyValue,
    ) {
        let Some(value) = current.as_number() else {
            return;
        };
        let meets = condition.evaluate(value);
        let mut state = self.load_state(automation_id).await.unwrap_or_default();

        if !meets {
            if state.latched {
                state.latched = false;
                let _ = self.save_state(automation_id, &state).await;
            }
            return;
        }

        if fire_once && state.latched {
            return;
        }
        state.latched = true;
        let _ = self.save_state(automation_id, &state).await;

        match target_node_id {
            Some(target) => self.fire(automation_id, target).await,
            None => warn!(automation_id = %automation_id, "threshold automation has no target node; action is a no-op"),
        }
    }

    /// Runs `automation_id`'s action against `target_node_id`, guarded by
    /// the reentrant-depth cycle detector.
    async fn fire(&self, automation_id: NodeId, target_node_id: NodeId) {
        {
            let mut stack = self.active_stack.write().await;
            if stack.contains(&automation_id) || stack.len() >= self.max_depth {
                warn!(
                    automation_id = %automation_id,
                    depth = stack.len(),
                    "automation cycle detected; suppressing fire"
                );
                return;
            }
            stack.push(automation_id);
        }

        let definition = self.load_definition(automation_id).await;
        if let Ok(Some(definition)) = definition {
            if let Err(err) = self.run_action(target_node_id, &definition.action).await {
                warn!(automation_id = %automation_id, error = %err, "automation action failed");
            }
            let now = self.clock.now_millis();
            let _ = self
                .node_service
                .set_property(automation_id, FIELD_AUTOMATION_LAST_FIRED, PropertyValue::Number(now as f64))
                .await;
        }

        self.active_stack.write().await.pop();
    }

    async fn run_action(&self, target: NodeId, action: &Action) -> Result<()> {
        match action {
            Action::SetProperty { field_system_id, value } => {
                let resolved = value.resolve(self.clock.as_ref());
                self.node_service.set_property(target, field_system_id.as_str(), resolved).await
            }
            Action::AddSupertag { supertag_system_id } => {
                self.node_service.add_node_supertag(target, supertag_system_id.as_str()).await
            }
            Action::RemoveSupertag { supertag_system_id } => {
                self.node_service
                    .remove_node_supertag(target, supertag_system_id.as_str())
                    .await
            }
        }
    }

    async fn load_definition(&self, automation_id: NodeId) -> Result<Option<AutomationDefinition>> {
        let Some(node) = self.node_service.get_node(automation_id).await? else {
            return Ok(None);
        };
        let Ok(field_id) = self.node_service.resolve_system_id(FIELD_AUTOMATION_DEFINITION).await else {
            return Ok(None);
        };
        let Some(PropertyValue::Json(json)) = node.property(field_id).cloned() else {
            return Ok(None);
        };
        let definition =
        serde_json::from_value(json).map_err(|e| CoreError::InvalidDefinition(e.to_string()))?;
        Ok(Some(definition))
    }

    async fn save_definition(&self, automation_id: NodeId, definition: &AutomationDefinition) -> Result<()> {
        self.node_service
            .set_property(
            automation_id,
            FIELD_AUTOMATION_DEFINITION,
            PropertyValue::Json(
                serde_json::to_value(definition).map_err(|e| CoreError::InvalidDefinition(e.to_string()))?,
            ),
        )
            .await
    }

    async fn load_state(&self, automation_id: NodeId) -> Option<AutomationState> {
        let node = self.node_service.get_node(automation_id).await.ok().flatten()?;
        let field_id = self.node_service.resolve_system_id(FIELD_AUTOMATION_STATE).await.ok()?;
        match node.property(field_id).cloned() {
            Some(PropertyValue::Json(json)) => serde_json::from_value(json).ok(),
            _ => None,
        }
    }

    async fn save_state(&self, automation_id: NodeId, state: &AutomationState) -> Result<()> {
        self.node_service
            .set_property(
            automation_id,
            FIELD_AUTOMATION_STATE,
            PropertyValue::Json(
                serde_json::to_value(state).map_err(|e| CoreError::InvalidDefinition(e.to_string()))?,
            ),
        )
            .await
    }
}
