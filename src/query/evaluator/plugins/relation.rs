use async_trait::async_trait;

use crate::core::Result;
use crate::node::model::AssembledNode;
use crate::query::evaluator::{EvalContext, FilterEvaluator};
use crate::query::filter::{QueryFilter, RelationType};

pub struct RelationEvaluator;

#[async_trait]
impl FilterEvaluator for RelationEvaluator {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool {
        matches!(filter, QueryFilter::Relation { .. })
    }

    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool> {
        let QueryFilter::Relation {
            relation_type,
            field_system_id,
            target_node_id,
        } = filter
        else {
            unreachable!()
        };

        match relation_type {
            RelationType::ChildOf | RelationType::OwnedBy => Ok(match target_node_id {
                    Some(target) => node.node.owner_id == Some(*target),
                    None => node.node.owner_id.is_some(),
            }),
            RelationType::LinksTo => {
                let Some(target) = target_node_id else {
                    return Ok(false);
                };
                let field_id = match field_system_id {
                    Some(system_id) => ctx.node_service.resolve_system_id(system_id).await.ok(),
                    None => None,
                };
                Ok(node.properties.iter().any(|(field, values)| {
                            (field_id.is_none() || field_id == Some(*field))
                            && values.iter().any(|v| v.as_ref_id() == Some(*target))
                }))
            }
            RelationType::LinkedFrom => {
                let field_id = match field_system_id {
                    Some(system_id) => ctx.node_service.resolve_system_id(system_id).await.ok(),
                    None => None,
                };
                let referencing = ctx
                    .persistence
                    .properties_referencing(field_id, node.id())
                    .await?;
                Ok(match target_node_id {
                        Some(target) => referencing.iter().any(|p| p.node_id == *target),
                        None => !referencing.is_empty(),
                })
            }
        }
    }
}
