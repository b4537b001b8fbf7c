use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::QueryFilter;

/// Handles `and`/`or`/`not`. `not` treats its children as an implicit `or`
/// and negates the result.
pub struct LogicalEvaluator;

#[async_trait]
impl FilterEvaluator for LogicalEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::And { .. } | QueryFilter::Or { .. } | QueryFilter::Not { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        match filter {
            QueryFilter::And { filters } => {
                for child in filters {
                    if !ctx.evaluate(child, node).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            QueryFilter::Or { filters } => {
                for child in filters {
                    if ctx.evaluate(child, node).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            QueryFilter::Not { filters } => {
                for child in filters {
                    if ctx.evaluate(child, node).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => unreachable!(),
        }
    }
}
