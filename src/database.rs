//! The facade that wires through together, analogous to the base
//! crate's `facade::InMemoryDB` (`src/facade/database.rs`): one struct that
//! owns every service and exposes the handful of operations most callers
//! actually need, while still handing out the individual services for
//! anyone who wants the finer-grained API.

use std::sync::Arc;

use tracing::info;

use crate::automation::{AutomationDefinition, AutomationEngine};
use crate::bootstrap;
use crate::clock::{Clock, SystemClock};
use crate::computed::{ComputedFieldDefinition, ComputedFieldService};
use crate::config::DatabaseConfig;
use crate::core::{NodeId, NodeRef, PropertyValue, Result};
use crate::deps::DependencyTracker;
use crate::events::EventBus;
use crate::node::model::AssembledNode;
use crate::node::{CreateNodeInput, NodeService};
use crate::query::{QueryDefinition, QueryEvaluator, QueryResult};
use crate::storage::{InMemoryPersistence, Persistence};
use crate::subscription::{ChangeCallback, SubscriptionHandle, SubscriptionService};
use crate::supertag::SupertagResolver;

/// A fully-wired reactive node-property store.
///
/// Construction order mirrors the dependency graph: storage, the event bus
/// and the clock come first since nothing else works without them, then
/// `NodeService` (needs all three), then supertag resolution and the query
/// evaluator (need `NodeService`), then the dependency tracker, then
/// subscriptions (need the evaluator and tracker), then computed fields and
/// automations last since both ride on subscriptions.
pub struct Database {
    persistence: Arc<dyn Persistence>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    nodes: Arc<NodeService>,
    supertags: Arc<SupertagResolver>,
    evaluator: Arc<QueryEvaluator>,
    tracker: Arc<DependencyTracker>,
    subscriptions: Arc<SubscriptionService>,
    computed_fields: Arc<ComputedFieldService>,
    automations: Arc<AutomationEngine>,
}

impl Database {
    /// Opens an in-memory database, running the bootstrap contract first
    /// unless `config.bootstrap_on_open` is `false`.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        Self::open_with(config, Arc::new(InMemoryPersistence::new()), Arc::new(SystemClock)).await
    }

    /// Like [`Self::open`] but with an injected persistence layer and
    /// clock, for tests that need deterministic time or a custom backend.
    pub async fn open_with(
        config: DatabaseConfig,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let nodes = Arc::new(NodeService::new(persistence.clone(), events.clone(), clock.clone()));
        let supertags = Arc::new(SupertagResolver::new(
                persistence.clone(),
                nodes.clone(),
                config.max_inheritance_depth,
        ));
        let evaluator = Arc::new(QueryEvaluator::new(
                persistence.clone(),
                nodes.clone(),
                supertags.clone(),
                clock.clone(),
                config.default_query_limit,
        ));
        let tracker = Arc::new(DependencyTracker::new());
        let subscriptions = Arc::new(SubscriptionService::new(
                evaluator.clone(),
                nodes.clone(),
                tracker.clone(),
                events.clone(),
        ));
        let computed_fields = Arc::new(ComputedFieldService::new(nodes.clone(), subscriptions.clone(), clock.clone()));
        let automations = Arc::new(AutomationEngine::new(
                nodes.clone(),
                subscriptions.clone(),
                computed_fields.clone(),
                clock.clone(),
                config.max_automation_depth,
        ));

        let db = Self {
            persistence,
            events,
            clock,
            nodes,
            supertags,
            evaluator,
            tracker,
            subscriptions,
            computed_fields,
            automations,
        };

        if config.bootstrap_on_open {
            bootstrap::bootstrap(&db.nodes).await?;
            info!("database bootstrapped");
        }

        Ok(db)
    }

    pub fn nodes(&self) -> &Arc<NodeService> {
        &self.nodes
    }

    pub fn supertags(&self) -> &Arc<SupertagResolver> {
        &self.supertags
    }

    pub fn evaluator(&self) -> &Arc<QueryEvaluator> {
        &self.evaluator
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionService> {
        &self.subscriptions
    }

    pub fn computed_fields(&self) -> &Arc<ComputedFieldService> {
        &self.computed_fields
    }

    pub fn automations(&self) -> &Arc<AutomationEngine> {
        &self.automations
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub async fn create_node(&self, input: CreateNodeInput) -> Result<NodeId> {
        self.nodes.create_node(input).await
    }

    pub async fn find_node(&self, node_ref: impl Into<NodeRef>) -> Result<Option<AssembledNode>> {
        self.nodes.find_node(node_ref).await
    }

    pub async fn set_property(&self, node_id: NodeId, field: impl Into<NodeRef>, value: PropertyValue) -> Result<()> {
        self.nodes.set_property(node_id, field, value).await
    }

    pub async fn query(&self, definition: QueryDefinition) -> Result<QueryResult> {
        self.evaluator.evaluate(&definition).await
    }

    pub async fn subscribe(
        self: &Arc<Self>,
        definition: QueryDefinition,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        self.subscriptions.subscribe(definition, callback).await
    }

    pub async fn create_automation(self: &Arc<Self>, definition: AutomationDefinition) -> Result<NodeId> {
        self.automations.create(definition).await
    }

    pub async fn create_computed_field(
        &self,
        name: Option<String>,
        definition: ComputedFieldDefinition,
    ) -> Result<NodeId> {
        self.computed_fields.create(name, definition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::SUPERTAG_ITEM;

    #[tokio::test]
    async fn open_runs_bootstrap_by_default() {
        let db = Database::open(DatabaseConfig::default()).await.unwrap();
        assert!(db.nodes.resolve_system_id(SUPERTAG_ITEM).await.is_ok());
    }

    #[tokio::test]
    async fn open_skips_bootstrap_when_disabled() {
        let config = DatabaseConfig::builder().bootstrap_on_open(false).build();
        let db = Database::open(config).await.unwrap();
        assert!(db.nodes.resolve_system_id(SUPERTAG_ITEM).await.is_err());
    }

    #[tokio::test]
    async fn create_and_query_a_node() {
        let db = Database::open(DatabaseConfig::default()).await.unwrap();
        let id = db
            .create_node(CreateNodeInput {
                content: Some("hello".into()),
                supertag: Some(SUPERTAG_ITEM.into()),
                ..Default::default()
        })
            .await
            .unwrap();
        let result = db
            .query(QueryDefinition {
                filters: vec![crate::query::QueryFilter::Supertag {
                        supertag_system_id: SUPERTAG_ITEM.to_string(),
                        include_inherited: true,
                }],
                sort: None,
                limit: None,
        })
            .await
            .unwrap();
        assert_eq!(result.nodes.iter().map(|n| n.id()).collect::<Vec<_>>(), vec![id]);
    }
}
