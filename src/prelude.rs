//! Single flat import for the common case: `use supernode::prelude::*;`.
//!
//! One facade, one flat list: there's no separate query-builder surface to
//! keep apart from the executor types.

pub use crate::automation::{
    Action, ActionValue, AutomationDefinition, AutomationState, NowMarker, QueryMembershipEvent, ThresholdCondition,
    ThresholdOperator, Trigger,
};
pub use crate::computed::{Aggregation, ComputedFieldDefinition};
pub use crate::config::{DatabaseConfig, DatabaseConfigBuilder};
pub use crate::core::{CoreError, NodeId, NodeRef, PropertyValue, Result};
pub use crate::database::Database;
pub use crate::node::{AssembledNode, CreateNodeInput, Node, Property};
pub use crate::query::{
    PropertyOp, QueryDefinition, QueryFilter, QueryResult, RelationType, SortDirection, SortField, SortSpec,
    TemporalField, TemporalOp,
};
pub use crate::subscription::{ChangeCallback, ChangeEvent, SubscriptionHandle};
