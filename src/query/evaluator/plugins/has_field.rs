use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::QueryFilter;

pub struct HasFieldEvaluator;

#[async_trait]
impl FilterEvaluator for HasFieldEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::HasField { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::HasField { field_system_id, negate } = filter else {
            unreachable!()
        };

        let has = match ctx.node_service.resolve_system_id(field_system_id).await {
            Ok(field_id) => node.has_field(field_id),
            Err(_) => false,
        };

        Ok(if *negate { !has } else { has })
    }
}
