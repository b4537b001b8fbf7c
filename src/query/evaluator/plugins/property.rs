use async_trait::async_trait;

use crate::core::{PropertyValue, Result};
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::{PropertyOp, QueryFilter};

pub struct PropertyEvaluator;

#[async_trait]
impl FilterEvaluator for PropertyEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::Property { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::Property {
            field_system_id,
            op,
            value,
        } = filter
        else {
            unreachable!()
        };

        let Ok(field_id) = ctx.node_service.resolve_system_id(field_system_id).await else {
            return Ok(false);
        };
        let Some(actual) = node.property(field_id) else {
            return Ok(false);
        };

        Ok(match op {
                PropertyOp::Eq => actual == value,
                PropertyOp::Ne => actual != value,
                PropertyOp::Gt => actual.compare(value) == std::cmp::Ordering::Greater,
                PropertyOp::Gte => actual.compare(value) != std::cmp::Ordering::Less,
                PropertyOp::Lt => actual.compare(value) == std::cmp::Ordering::Less,
                PropertyOp::Lte => actual.compare(value) != std::cmp::Ordering::Greater,
                PropertyOp::Contains => match (actual.as_text(), value.as_text()) {
                    (Some(a), Some(b)) => a.contains(b),
                    _ => false,
                },
                PropertyOp::StartsWith => match (actual.as_text(), value.as_text()) {
                    (Some(a), Some(b)) => a.starts_with(b),
                    _ => false,
                },
                PropertyOp::EndsWith => match (actual.as_text(), value.as_text()) {
                    (Some(a), Some(b)) => a.ends_with(b),
                    _ => false,
                },
                PropertyOp::In => match value {
                    PropertyValue::Refs(candidates) => {
                        actual.as_ref_id().is_some_and(|id| candidates.contains(&id))
                    }
                    PropertyValue::Json(serde_json::Value::Array(items)) => items
                        .iter()
                        .any(|item| PropertyValue::from_stored(&item.to_string()) == *actual),
                    _ => false,
                },
        })
    }
}
