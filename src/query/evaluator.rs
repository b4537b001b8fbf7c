pub mod plugins;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::core::{CoreError, NodeId, Result};
use crate::node::model::AssembledNode;
use crate::node::{NodeService, FIELD_SUPERTAG};
use crate::query::filter::{QueryDefinition, QueryFilter, SortField};
use crate::storage::Persistence;
use crate::supertag::SupertagResolver;

/// One filter-kind handler, dispatched by variant rather than by
/// downcasting, through a registry of evaluators keyed by what
/// [`FilterEvaluator::can_evaluate`] accepts.
#[async_trait]
pub trait FilterEvaluator: Send + Sync {
    fn can_evaluate(&self, filter: &QueryFilter) -> bool;
    async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode, ctx: &EvalContext<'_>) -> Result<bool>;
}

/// Carries whatever a filter evaluator needs to resolve system ids,
/// supertag inheritance, and the current time, plus a way to recurse back
/// into the registry for composed filters (`and`/`or`/`not`).
pub struct EvalContext<'a> {
    registry: &'a FilterRegistry,
    pub node_service: &'a NodeService,
    pub supertag_resolver: &'a SupertagResolver,
    pub clock: &'a dyn Clock,
    pub persistence: &'a dyn Persistence,
}

impl<'a> EvalContext<'a> {
    pub async fn evaluate(&self, filter: &QueryFilter, node: &AssembledNode) -> Result<bool> {
        if let Some(evaluator) = self.registry.find_evaluator(filter) {
            return evaluator.evaluate(filter, node, self).await;
        }
        Err(CoreError::InvalidDefinition(format!(
                    "no evaluator registered for filter: {filter:?}"
        )))
    }
}

pub struct FilterRegistry {
    evaluators: Vec<Box<dyn FilterEvaluator>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    pub fn register(&mut self, evaluator: Box<dyn FilterEvaluator>) {
        self.evaluators.push(evaluator);
    }

    pub fn with_default_evaluators() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(plugins::supertag::SupertagEvaluator));
        registry.register(Box::new(plugins::property::PropertyEvaluator));
        registry.register(Box::new(plugins::content::ContentEvaluator));
        registry.register(Box::new(plugins::relation::RelationEvaluator));
        registry.register(Box::new(plugins::temporal::TemporalEvaluator));
        registry.register(Box::new(plugins::has_field::HasFieldEvaluator));
        registry.register(Box::new(plugins::logical::LogicalEvaluator));
        registry
    }

    fn find_evaluator(&self, filter: &QueryFilter) -> Option<&dyn FilterEvaluator> {
        self.evaluators
            .iter()
            .find(|ev| ev.can_evaluate(filter))
            .map(|boxed| &**boxed)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_default_evaluators()
    }
}

/// Result of a single query evaluation. `total_count` is the match
/// count before `limit` truncation.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub nodes: Vec<AssembledNode>,
    pub total_count: usize,
    pub evaluated_at: i64,
}

/// Walks a filter tree against assembled nodes, applies sort/limit.
pub struct QueryEvaluator {
    persistence: Arc<dyn Persistence>,
    node_service: Arc<NodeService>,
    supertag_resolver: Arc<SupertagResolver>,
    clock: Arc<dyn Clock>,
    registry: FilterRegistry,
    default_limit: usize,
}

impl QueryEvaluator {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        node_service: Arc<NodeService>,
        supertag_resolver: Arc<SupertagResolver>,
        clock: Arc<dyn Clock>,
        default_limit: usize,
    ) -> Self {
        Self {
            persistence,
            node_service,
            supertag_resolver,
            clock,
            registry: FilterRegistry::with_default_evaluators(),
            default_limit,
        }
    }

    pub async fn evaluate(&self, definition: &QueryDefinition) -> Result<QueryResult> {
        let candidates = self.seed_candidates(definition).await?;
        let ctx = EvalContext {
            registry: &self.registry,
            node_service: &self.node_service,
            supertag_resolver: &self.supertag_resolver,
            clock: self.clock.as_ref(),
            persistence: self.persistence.as_ref(),
        };

        let mut matched = Vec::new();
        for node in candidates {
            if node.node.is_deleted() {
                continue;
            }
            let mut pass = true;
            for filter in &definition.filters {
                if !ctx.evaluate(filter, &node).await? {
                    pass = false;
                    break;
                }
            }
            if pass {
                matched.push(node);
            }
        }

        if let Some(sort) = &definition.sort {
            self.sort_nodes(&mut matched, sort).await?;
        } else {
            matched.sort_by_key(|n| n.node.id);
        }

        let total_count = matched.len();
        let limit = definition.limit.unwrap_or(self.default_limit);
        matched.truncate(limit);

        Ok(QueryResult {
                nodes: matched,
                total_count,
                evaluated_at: self.clock.now_millis(),
        })
    }

    /// Seeds candidates from the supertag reverse index when the top-level
    /// conjunction names a supertag filter, keeping typical query cost
    /// linear in matching-node count rather than total-node count.
    /// Falls back to a full scan otherwise.
    async fn seed_candidates(&self, definition: &QueryDefinition) -> Result<Vec<AssembledNode>> {
        let top_level_supertag = definition.filters.iter().find_map(|f| match f {
                QueryFilter::Supertag {
                    supertag_system_id,
                    include_inherited,
                } => Some((supertag_system_id.clone(), *include_inherited)),
                _ => None,
        });

        let Some((supertag_system_id, include_inherited)) = top_level_supertag else {
            return self.assemble_all().await;
        };

        let Ok(supertag_id) = self.node_service.resolve_system_id(&supertag_system_id).await else {
            return Ok(Vec::new());
        };
        let supertag_set: HashSet<NodeId> = if include_inherited {
            self.supertag_resolver.resolve_inherited(supertag_id).await?
        } else {
            HashSet::from([supertag_id])
        };

        let Ok(supertag_field) = self.node_service.resolve_system_id(FIELD_SUPERTAG).await else {
            return Ok(Vec::new());
        };

        let mut node_ids: HashSet<NodeId> = HashSet::new();
        for tag in &supertag_set {
            for prop in self
                .persistence
                .properties_referencing(Some(supertag_field), *tag)
                .await?
            {
                node_ids.insert(prop.node_id);
            }
        }

        let mut candidates = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            if let Some(node) = self.persistence.get_node(id).await? {
                candidates.push(self.node_service_assemble(node).await?);
            }
        }
        Ok(candidates)
    }

    async fn assemble_all(&self) -> Result<Vec<AssembledNode>> {
        let mut out = Vec::new();
        for node in self.persistence.all_nodes().await? {
            out.push(self.node_service_assemble(node).await?);
        }
        Ok(out)
    }

    async fn node_service_assemble(&self, node: crate::node::Node) -> Result<AssembledNode> {
        self.node_service.assemble(node).await
    }

    async fn sort_nodes(
        &self,
        nodes: &mut [AssembledNode],
        sort: &crate::query::filter::SortSpec,
    ) -> Result<()> {
        let field_id = match &sort.field {
            SortField::Field(system_id) => self.node_service.resolve_system_id(system_id).await.ok(),
            _ => None,
        };

        nodes.sort_by(|a, b| {
                let ordering = match &sort.field {
                    SortField::Content => a.node.content.cmp(&b.node.content),
                    SortField::CreatedAt => a.node.created_at.cmp(&b.node.created_at),
                    SortField::UpdatedAt => a.node.updated_at.cmp(&b.node.updated_at),
                    SortField::Field(_) => match field_id {
                        Some(id) => match (a.property(id), b.property(id)) {
                            (Some(av), Some(bv)) => av.compare(bv),
                            (Some(_), None) => Ordering::Less,
                            (None, Some(_)) => Ordering::Greater,
                            (None, None) => Ordering::Equal,
                        },
                        None => Ordering::Equal,
                    },
                };
                let ordering = match sort.direction {
                    crate::query::filter::SortDirection::Asc => ordering,
                    crate::query::filter::SortDirection::Desc => ordering.reverse(),
                };
                ordering.then_with(|| a.node.id.cmp(&b.node.id))
        });
        Ok(())
    }
}
