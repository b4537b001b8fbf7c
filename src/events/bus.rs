use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::events::event::{DbEvent, EventFilter};

pub type ListenerId = u64;

type ListenerFn = dyn Fn(&DbEvent) + Send + Sync;

struct Listener {
    id: ListenerId,
    filter: EventFilter,
    callback: Box<ListenerFn>,
}

/// Publishes mutation events to filtered listeners.
///
/// Listener invocation is synchronous and inline: a write call does not
/// return until every matching listener has run. The listener list is
/// snapshotted via an `Arc` swap before each dispatch, a copy-on-write
/// idiom that lets a listener subscribe or unsubscribe during delivery
/// without affecting anything but the *next* event — never the one in
/// flight.
pub struct EventBus {
    listeners: RwLock<Arc<Vec<Listener>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn subscribe<F>(&self, filter: EventFilter, callback: F) -> ListenerId
    where
    F: Fn(&DbEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.listeners.write().await;
        let mut updated = (**guard).clone();
        updated.push(Listener {
                id,
                filter,
                callback: Box::new(callback),
        });
        *guard = Arc::new(updated);
        id
    }

    pub async fn unsubscribe(&self, id: ListenerId) {
        let mut guard = self.listeners.write().await;
        let mut updated = (**guard).clone();
        updated.retain(|l| l.id != id);
        *guard = Arc::new(updated);
    }

    /// Dispatches `event` to every listener whose filter matches, in
    /// registration order. A listener that panics is caught and logged here
    /// so the fault never reaches the emitter and every other matching
    /// listener still runs for this event (`ListenerFailed`).
    pub async fn publish(&self, event: DbEvent) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners.iter() {
            if listener.filter.matches(&event)
            && panic::catch_unwind(AssertUnwindSafe(|| (listener.callback)(&event))).is_err()
            {
                self.warn_listener_failed(listener.id, &event, "listener panicked").await;
            }
        }
    }

    pub async fn warn_listener_failed(&self, listener_id: ListenerId, event: &DbEvent, cause: &str) {
        warn!(
            listener_id,
            event = event.type_name(),
            cause,
            "listener failed; isolated"
        );
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;
    use std::sync::Mutex;

    #[tokio::test]
    async fn listener_only_receives_events_matching_its_filter() {
        let bus = EventBus::new();
        let node_id = NodeId::new();
        let other_id = NodeId::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.subscribe(
            EventFilter {
                node_ids: Some(vec![node_id]),
                ..Default::default()
            },
            move |event| seen_clone.lock().unwrap().push(event.node_id()),
        )
            .await;

        bus.publish(DbEvent::NodeCreated {
                node_id: other_id,
                timestamp: 0,
        })
            .await;
        bus.publish(DbEvent::NodeCreated {
                node_id,
                timestamp: 0,
        })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![node_id]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        let id = bus
            .subscribe(EventFilter::default(), move |_| {
                *count_clone.lock().unwrap() += 1;
        })
            .await;

        bus.publish(DbEvent::NodeDeleted {
                node_id: NodeId::new(),
        })
            .await;
        bus.unsubscribe(id).await;
        bus.publish(DbEvent::NodeDeleted {
                node_id: NodeId::new(),
        })
            .await;

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
