pub mod definition;
pub mod engine;

pub use definition::{
    Action, ActionValue, AutomationDefinition, AutomationState, NowMarker, QueryMembershipEvent, ThresholdCondition,
    ThresholdOperator, Trigger,
};
pub use engine::{
    AutomationEngine, FIELD_AUTOMATION_DEFINITION, FIELD_AUTOMATION_ENABLED, FIELD_AUTOMATION_LAST_FIRED,
    FIELD_AUTOMATION_STATE,
};
