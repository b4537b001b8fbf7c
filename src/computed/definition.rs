use serde::{Deserialize, Serialize};

use crate::query::QueryDefinition;

/// The aggregation a computed field performs over its sub-query's result set
///. `Count` never touches `field_system_id`; every other variant
/// requires it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// `computed_field_definition` : `{ aggregation, query, fieldId? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedFieldDefinition {
    pub aggregation: Aggregation,
    pub query: QueryDefinition,
    #[serde(default)]
    pub field_system_id: Option<String>,
}

impl ComputedFieldDefinition {
    /// `Sum`/`Avg`/`Min`/`Max` are meaningless without a field to aggregate.
    pub fn validate(&self) -> bool {
        matches!(self.aggregation, Aggregation::Count) || self.field_system_id.is_some()
    }
}
