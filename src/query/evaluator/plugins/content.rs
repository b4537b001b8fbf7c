use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::QueryFilter;

pub struct ContentEvaluator;

#[async_trait]
impl FilterEvaluator for ContentEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::Content { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, _ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::Content { query, case_sensitive } = filter else {
            unreachable!()
        };

        Ok(if *case_sensitive {
                node.node
                    .content
                    .as_deref()
                    .is_some_and(|c| c.contains(query.as_str()))
            } else {
                let needle = query.to_lowercase();
                node.node
                    .content_plain
                    .as_deref()
                    .is_some_and(|c| c.contains(&needle))
        })
    }
}
