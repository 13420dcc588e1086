//! # Query Listeners
//!
//! Observers of executed statements, scoped to one [`Database`](crate::Database).
//!
//! ## Subscription Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Listener Registry                                    │
//! │                                                                         │
//! │  repo.with_query_collection()                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  QueryListeners::subscribe(f) ──► Subscription { id }                  │
//! │       │                                  │                              │
//! │       │                                  │ drop                         │
//! │       ▼                                  ▼                              │
//! │  ┌────────────────────────┐     entry removed from registry           │
//! │  │ id-1 → collector A     │                                            │
//! │  │ id-2 → collector B     │ ◄── every executed statement is            │
//! │  └────────────────────────┘     dispatched to every live entry         │
//! │                                                                         │
//! │  Each caller gets its own handle: collectors never steal each          │
//! │  other's output and detach independently.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use lightrepo_core::QueryEvent;
use tracing::debug;
use uuid::Uuid;

type Listener = Arc<dyn Fn(&QueryEvent) + Send + Sync>;
type Registry = RwLock<HashMap<Uuid, Listener>>;

/// Registry of statement listeners. Clones share the same registry.
#[derive(Clone, Default)]
pub struct QueryListeners {
    inner: Arc<Registry>,
}

impl QueryListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Arc::new(listener));

        debug!(subscription = %id, "Query listener registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every registered listener.
    ///
    /// Listeners run after the registry lock is released, so a listener may
    /// itself subscribe or drop subscriptions.
    pub fn dispatch(&self, event: &QueryEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for QueryListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryListeners")
            .field("subscriptions", &self.len())
            .finish()
    }
}

/// Handle for one registered listener. Dropping it unregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.id);
            debug!(subscription = %self.id, "Query listener removed");
        }
    }
}

// =============================================================================
// Query Collector
// =============================================================================

/// Collects every statement executed while it is alive.
///
/// ## Usage
/// ```rust,ignore
/// let collector = repo.with_query_collection();
/// repo.find_by(Some(&Condition::eq([("name", "x")])), None, &Columns::All).await?;
///
/// for query in collector.queries() {
///     println!("{} {:?} ({} ms)", query.sql, query.bindings, query.time_ms);
/// }
/// ```
#[derive(Debug)]
pub struct QueryCollector {
    collected: Arc<Mutex<Vec<QueryEvent>>>,
    subscription: Subscription,
}

impl QueryCollector {
    pub(crate) fn attach(listeners: &QueryListeners) -> Self {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);

        let subscription = listeners.subscribe(move |event: &QueryEvent| {
            sink.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(event.clone());
        });

        QueryCollector {
            collected,
            subscription,
        }
    }

    /// Snapshot of the statements collected so far.
    pub fn queries(&self) -> Vec<QueryEvent> {
        self.collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything collected so far; collection continues.
    pub fn clear(&self) {
        self.collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Collected statements as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.queries())
    }

    /// Stops collecting and returns what was gathered.
    pub fn finish(self) -> Vec<QueryEvent> {
        let QueryCollector {
            collected,
            subscription,
        } = self;
        drop(subscription);

        let mut queries = collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *queries)
    }

    pub fn subscription_id(&self) -> Uuid {
        self.subscription.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(sql: &str) -> QueryEvent {
        QueryEvent {
            sql: sql.to_string(),
            bindings: vec![],
            time_ms: 0.1,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let listeners = QueryListeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let subscription = listeners.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(listeners.len(), 1);

        listeners.dispatch(&event("SELECT 1"));
        drop(subscription);
        listeners.dispatch(&event("SELECT 2"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_collectors_are_independent() {
        let listeners = QueryListeners::new();

        let first = QueryCollector::attach(&listeners);
        listeners.dispatch(&event("SELECT 1"));

        let second = QueryCollector::attach(&listeners);
        listeners.dispatch(&event("SELECT 2"));

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second.queries()[0].sql, "SELECT 2");

        let gathered = first.finish();
        assert_eq!(gathered.len(), 2);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_finish_detaches_and_returns_everything_gathered() {
        let listeners = QueryListeners::new();
        let collector = QueryCollector::attach(&listeners);

        listeners.dispatch(&event("SELECT 1"));
        listeners.dispatch(&event("SELECT 2"));
        let gathered = collector.finish();
        listeners.dispatch(&event("SELECT 3"));

        let sql: Vec<_> = gathered.iter().map(|e| e.sql.as_str()).collect();
        assert_eq!(sql, vec!["SELECT 1", "SELECT 2"]);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_collector_json_and_clear() {
        let listeners = QueryListeners::new();
        let collector = QueryCollector::attach(&listeners);

        listeners.dispatch(&event("DELETE FROM \"users\""));
        let json = collector.to_json().unwrap();
        assert!(json.contains("DELETE FROM"));

        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let listeners = QueryListeners::new();
        let subscription = listeners.subscribe(|_| {});
        drop(listeners);
        drop(subscription);
    }
}
