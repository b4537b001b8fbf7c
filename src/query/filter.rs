use serde::{Deserialize, Serialize};

use crate::core::{NodeId, PropertyValue};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PropertyOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    ChildOf,
    OwnedBy,
    LinksTo,
    LinkedFrom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TemporalField {
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TemporalOp {
    Before,
    After,
    Within,
}

fn default_true() -> bool {
    true
}

/// A node in the filter tree. `And`/`Or`/`Not` compose the leaf
/// kinds; `Not` treats its children as an implicit `Or` and negates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryFilter {
    Supertag {
        supertag_system_id: String,
        #[serde(default = "default_true")]
        include_inherited: bool,
    },
    Property {
        field_system_id: String,
        op: PropertyOp,
        value: PropertyValue,
    },
    Content {
        query: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Relation {
        relation_type: RelationType,
        #[serde(default)]
        field_system_id: Option<String>,
        #[serde(default)]
        target_node_id: Option<NodeId>,
    },
    Temporal {
        field: TemporalField,
        op: TemporalOp,
        #[serde(default)]
        date: Option<i64>,
        #[serde(default)]
        days: Option<i64>,
    },
    HasField {
        field_system_id: String,
        #[serde(default)]
        negate: bool,
    },
    And {
        filters: Vec<QueryFilter>,
    },
    Or {
        filters: Vec<QueryFilter>,
    },
    Not {
        filters: Vec<QueryFilter>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Content,
    CreatedAt,
    UpdatedAt,
    Field(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

/// `QueryDefinition = { filters, sort?, limit? }`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryDefinition {
    pub filters: Vec<QueryFilter>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
}
