use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::{QueryFilter, TemporalField, TemporalOp};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct TemporalEvaluator;

#[async_trait]
impl FilterEvaluator for TemporalEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::Temporal { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::Temporal { field, op, date, days } = filter else {
            unreachable!()
        };

        let actual = match field {
            TemporalField::CreatedAt => node.node.created_at,
            TemporalField::UpdatedAt => node.node.updated_at,
        };

        Ok(match op {
                TemporalOp::Before => date.is_some_and(|d| actual < d),
                TemporalOp::After => date.is_some_and(|d| actual > d),
                TemporalOp::Within => {
                    let threshold = days.map(|d| ctx.clock.now_millis() - d * MILLIS_PER_DAY);
                    threshold.is_some_and(|t| actual >= t)
                }
        })
    }
}
