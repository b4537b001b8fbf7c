use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::core::{NodeId, Result};
use crate::node::{NodeService, FIELD_EXTENDS};
use crate::storage::Persistence;

/// Resolves supertag inheritance through the `field:extends` chain. Not
/// cached across writes: adding an `extends` edge must be immediately
/// visible to the next query.
pub struct SupertagResolver {
    persistence: Arc<dyn Persistence>,
    node_service: Arc<NodeService>,
    max_depth: usize,
}

impl SupertagResolver {
    pub fn new(persistence: Arc<dyn Persistence>, node_service: Arc<NodeService>, max_depth: usize) -> Self {
        Self {
            persistence,
            node_service,
            max_depth,
        }
    }

    /// Returns `{supertag_id}` plus every supertag whose `extends` chain
    /// reaches `supertag_id`, via an iterative, visited-set-guarded reverse
    /// walk, never recursive, since `extends` chains are untrusted graph
    /// data that could contain a cycle.
    pub async fn resolve_inherited(&self, supertag_id: NodeId) -> Result<HashSet<NodeId>> {
        let extends_field = match self.node_service.resolve_system_id(FIELD_EXTENDS).await {
            Ok(id) => id,
            Err(_) => return Ok(HashSet::from([supertag_id])),
        };

        let mut reached = HashSet::from([supertag_id]);
        let mut frontier = vec![supertag_id];
        let mut depth = 0;

        while !frontier.is_empty() && depth < self.max_depth {
            let mut next_frontier = Vec::new();
            for member in &frontier {
                let referencing = self
                    .persistence
                    .properties_referencing(Some(extends_field), *member)
                    .await?;
                for prop in referencing {
                    if reached.insert(prop.node_id) {
                        next_frontier.push(prop.node_id);
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }

        if depth == self.max_depth && !frontier.is_empty() {
            warn!(supertag_id = %supertag_id, "inheritance traversal hit depth cap; possible cycle");
        }

        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::events::EventBus;
    use crate::node::CreateNodeInput;
    use crate::storage::InMemoryPersistence;

    async fn resolver() -> (Arc<NodeService>, SupertagResolver) {
        let persistence: Arc<dyn Persistence> = Arc::new(InMemoryPersistence::new());
        let events = Arc::new(EventBus::new());
        let clock = Arc::new(TestClock::default());
        let node_service = Arc::new(NodeService::new(persistence.clone(), events, clock));
        let resolver = SupertagResolver::new(persistence, node_service.clone(), 16);
        (node_service, resolver)
    }

    #[tokio::test]
    async fn child_supertag_is_included_when_it_extends_the_target() {
        let (svc, resolver) = resolver().await;
        let item = svc
            .create_node(CreateNodeInput {
                system_id: Some("supertag:item".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        let task = svc
            .create_node(CreateNodeInput {
                system_id: Some("supertag:task".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        svc.set_property(task, "field:extends", item.into()).await.unwrap();

        let reached = resolver.resolve_inherited(item).await.unwrap();
        assert!(reached.contains(&item));
        assert!(reached.contains(&task));
    }

    #[tokio::test]
    async fn extends_cycle_terminates_instead_of_looping() {
        let (svc, resolver) = resolver().await;
        let a = svc
            .create_node(CreateNodeInput {
                system_id: Some("supertag:a".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        let b = svc
            .create_node(CreateNodeInput {
                system_id: Some("supertag:b".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        svc.set_property(a, "field:extends", b.into()).await.unwrap();
        svc.set_property(b, "field:extends", a.into()).await.unwrap();

        let reached = resolver.resolve_inherited(a).await.unwrap();
        assert_eq!(reached.len(), 2);
    }
}
