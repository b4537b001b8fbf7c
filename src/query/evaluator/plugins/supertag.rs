use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::QueryFilter;

pub struct SupertagEvaluator;

#[async_trait]
impl FilterEvaluator for SupertagEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::Supertag { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::Supertag {
            supertag_system_id,
            include_inherited,
        } = filter
        else {
            unreachable!()
        };

        let Ok(supertag_id) = ctx.node_service.resolve_system_id(supertag_system_id).await else {
            return Ok(false);
        };

        if !*include_inherited {
            return Ok(node.has_supertag(supertag_id));
        }

        let inherited = ctx.supertag_resolver.resolve_inherited(supertag_id).await?;
        Ok(node.supertags.iter().any(|t| inherited.contains(t)))
    }
}
