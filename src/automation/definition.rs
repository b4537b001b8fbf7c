use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::core::{NodeId, PropertyValue};
use crate::query::QueryDefinition;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QueryMembershipEvent {
    OnEnter,
    OnExit,
    OnChange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCondition {
    pub operator: ThresholdOperator,
    pub value: f64,
}

impl ThresholdCondition {
    pub fn evaluate(&self, value: f64) -> bool {
        match self.operator {
            ThresholdOperator::Eq => value == self.value,
            ThresholdOperator::Ne => value != self.value,
            ThresholdOperator::Gt => value > self.value,
            ThresholdOperator::Gte => value >= self.value,
            ThresholdOperator::Lt => value < self.value,
            ThresholdOperator::Lte => value <= self.value,
        }
    }
}

/// An automation's trigger source : either membership in a live query
/// or a computed field crossing a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    QueryMembership {
        query: QueryDefinition,
        event: QueryMembershipEvent,
    },
    Threshold {
        computed_field_id: NodeId,
        condition: ThresholdCondition,
        #[serde(default)]
        fire_once: bool,
        /// Node the action applies to. Required for threshold triggers,
        /// since unlike `query_membership` there is no matched node to fall
        /// back on.
        #[serde(default)]
        target_node_id: Option<NodeId>,
    },
}

/// A `{$now: true}` marker, resolved to the firing time when the action
/// runs, or a literal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Now(NowMarker),
    Literal(PropertyValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowMarker {
    #[serde(rename = "$now")]
    pub now: bool,
}

impl ActionValue {
    pub fn resolve(&self, clock: &dyn Clock) -> PropertyValue {
        match self {
            ActionValue::Now(_) => PropertyValue::Number(clock.now_millis() as f64),
            ActionValue::Literal(value) => value.clone(),
        }
    }
}

/// An automation's action, always resolved against a target node at
/// fire time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Action {
    SetProperty { field_system_id: String, value: ActionValue },
    AddSupertag { supertag_system_id: String },
    RemoveSupertag { supertag_system_id: String },
}

/// `automation_definition`: `{ name, enabled, trigger, action }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDefinition {
    pub name: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub action: Action,
}

/// `automation_state`: engine-managed bookkeeping, currently just the
/// threshold latch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationState {
    #[serde(default)]
    pub latched: bool,
}
