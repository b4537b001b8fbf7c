use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::core::{NodeId, Result};
use crate::deps::{DependencyTracker, SubscriptionId};
use crate::events::{DbEvent, EventBus, EventFilter, ListenerId};
use crate::node::model::AssembledNode;
use crate::node::NodeService;
use crate::query::{QueryDefinition, QueryEvaluator};

/// `{added, removed, changed, totalCount}` delivered to a subscription's
/// callback. `totalCount` reflects the freshly re-evaluated query,
/// before `limit` truncation.
#[derive(Debug, Clone, Default)]
pub struct ChangeEvent {
    pub added: Vec<AssembledNode>,
    pub removed: Vec<AssembledNode>,
    pub changed: Vec<AssembledNode>,
    pub total_count: usize,
}

impl ChangeEvent {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

struct Entry {
    definition: QueryDefinition,
    last_results: Vec<AssembledNode>,
    callback: ChangeCallback,
}

/// State shared between [`SubscriptionService`] and the single [`EventBus`]
/// listener it registers lazily on the first subscription.
struct Shared {
    evaluator: Arc<QueryEvaluator>,
    node_service: Arc<NodeService>,
    tracker: Arc<DependencyTracker>,
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Re-evaluates and diffs every subscription affected by `event`,
    /// invoking callbacks for non-empty diffs. Isolated per-subscription: a
    /// re-evaluation error or a panicking callback is logged and does not
    /// stop the remaining affected subscriptions from being processed.
    ///
    /// The `entries` write guard is dropped before any callback runs. A
    /// callback's action may re-enter the store (C8's actions, C9's
    /// materialization) and publish further events, which dispatch back into
    /// this same function on the same call stack; holding the guard across
    /// the callback would make that reentrant call deadlock on its own lock.
    async fn handle_event(self: &Arc<Self>, event: &DbEvent) {
        let affected = self.tracker.affected_by_event(event).await;
        if affected.is_empty() {
            return;
        }

        let mut due: Vec<(SubscriptionId, ChangeEvent, ChangeCallback)> = Vec::new();
        {
            let mut entries = self.entries.write().await;
            for id in affected {
                let Some(entry) = entries.get_mut(&id) else {
                    continue;
                };
                let result = match self.evaluator.evaluate(&entry.definition).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(subscription_id = id, error = %err, "subscription re-evaluation failed");
                        continue;
                    }
                };

                let change = diff(&entry.last_results, &result.nodes, result.total_count);
                entry.last_results = result.nodes;
                if change.is_empty() {
                    continue;
                }
                due.push((id, change, entry.callback.clone()));
            }
        }

        for (id, change, callback) in due {
            if panic::catch_unwind(AssertUnwindSafe(|| (callback)(change))).is_err() {
                warn!(subscription_id = id, "subscription callback panicked; isolated");
            }
        }
    }
}

/// Diffs two result sets by node id. "Changed" is precise: a retained node
/// is only reported when its freshly assembled view differs bytewise from
/// the cached one, rather than conservatively flagging every retained node
/// whenever any mutation touches the query.
fn diff(old: &[AssembledNode], new: &[AssembledNode], total_count: usize) -> ChangeEvent {
    let old_by_id: HashMap<NodeId, &AssembledNode> = old.iter().map(|n| (n.id(), n)).collect();
    let new_by_id: HashMap<NodeId, &AssembledNode> = new.iter().map(|n| (n.id(), n)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for node in new {
        match old_by_id.get(&node.id()) {
            None => added.push(node.clone()),
            Some(prev) => {
                if *prev != node {
                    changed.push(node.clone());
                }
            }
        }
    }

    let removed = old
        .iter()
        .filter(|node| !new_by_id.contains_key(&node.id()))
        .cloned()
        .collect();

    ChangeEvent {
        added,
        removed,
        changed,
        total_count,
    }
}

/// Maintains live queries: evaluates once on subscribe, then diffs on every
/// relevant mutation event and delivers `{added, removed, changed}`.
/// Subscribes exactly once to the event bus regardless of how many live
/// queries are registered.
pub struct SubscriptionService {
    shared: Arc<Shared>,
    events: Arc<EventBus>,
    bus_listener_id: RwLock<Option<ListenerId>>,
}

impl SubscriptionService {
    pub fn new(
        evaluator: Arc<QueryEvaluator>,
        node_service: Arc<NodeService>,
        tracker: Arc<DependencyTracker>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                    evaluator,
                    node_service,
                    tracker,
                    entries: RwLock::new(HashMap::new()),
                    next_id: AtomicU64::new(1),
            }),
            events,
            bus_listener_id: RwLock::new(None),
        }
    }

    /// Evaluates `definition` once, registers its dependency set with the
    /// tracker, and delivers further changes to `callback`. The initial
    /// result is available via [`SubscriptionHandle::last_results`], not the
    /// callback.
    pub async fn subscribe(
        self: &Arc<Self>,
        definition: QueryDefinition,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        let result = self.shared.evaluator.evaluate(&definition).await?;
        let keys = self
            .shared
            .tracker
            .keys_for_definition(&definition, &self.shared.node_service)
            .await?;

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.tracker.register(id, keys).await;

        let mut entries = self.shared.entries.write().await;
        let first_subscription = entries.is_empty();
        entries.insert(
            id,
            Entry {
                definition,
                last_results: result.nodes,
                callback,
            },
        );
        drop(entries);

        if first_subscription {
            self.ensure_bus_listener().await;
        }

        Ok(SubscriptionHandle {
                id,
                service: self.clone(),
        })
    }

    async fn ensure_bus_listener(self: &Arc<Self>) {
        let mut listener_id = self.bus_listener_id.write().await;
        if listener_id.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let new_id = self
            .events
            .subscribe(EventFilter::default(), move |event: &DbEvent| {
                let shared = shared.clone();
                let event = event.clone();
                futures::executor::block_on(async move {
                        shared.handle_event(&event).await;
                });
        })
            .await;
        *listener_id = Some(new_id);
    }

    /// Idempotent. Unregisters from the dependency tracker; if this was the
    /// last live subscription, unsubscribes from the event bus as well.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.tracker.unregister(id).await;
        let mut entries = self.shared.entries.write().await;
        entries.remove(&id);
        let is_empty = entries.is_empty();
        drop(entries);

        if is_empty {
            let mut listener_id = self.bus_listener_id.write().await;
            if let Some(bus_id) = listener_id.take() {
                self.events.unsubscribe(bus_id).await;
            }
        }
    }

    pub async fn last_results(&self, id: SubscriptionId) -> Vec<AssembledNode> {
        self.shared
            .entries
            .read()
            .await
            .get(&id)
            .map(|entry| entry.last_results.clone())
            .unwrap_or_default()
    }

}

/// `{id, unsubscribe, getLastResults}`.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    service: Arc<SubscriptionService>,
}

impl SubscriptionHandle {
    pub async fn unsubscribe(&self) {
        self.service.unsubscribe(self.id).await;
    }

    pub async fn last_results(&self) -> Vec<AssembledNode> {
        self.service.last_results(self.id).await
    }
}
