//! In-memory anonymous events store.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::AnonymousEventsStore;
use crate::domain::AnalyticsEvent;
use crate::store::DEFAULT_TTL;

/// Default cap on events remembered per anonymous id
const DEFAULT_MAX_EVENTS: usize = 100;

/// Default cap on anonymous ids remembered at once
const DEFAULT_MAX_IDS: usize = 100_000;

/// Minimum time between two sweeps of expired ids
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Key = (String, String);

struct Remembered {
    events: Vec<AnalyticsEvent>,
    expires: Instant,
}

struct Inner {
    ids: HashMap<Key, Remembered>,
    next_sweep: Instant,
}

/// Anonymous events keyed by `(workspace, anonymous id)`.
///
/// Oldest events are discarded once an id holds `max_events`. An id expires
/// `ttl` after its last event; expired ids are swept on write. Once
/// `max_ids` ids are held, the one closest to expiry is evicted.
pub struct MemoryAnonymousEventsStore {
    inner: Mutex<Inner>,
    max_events: usize,
    max_ids: usize,
    ttl: Duration,
}

impl Default for MemoryAnonymousEventsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAnonymousEventsStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_EVENTS, DEFAULT_MAX_IDS, DEFAULT_TTL)
    }

    pub fn with_max_events(max_events: usize) -> Self {
        Self::with_limits(max_events, DEFAULT_MAX_IDS, DEFAULT_TTL)
    }

    pub fn with_limits(max_events: usize, max_ids: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ids: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
            max_events,
            max_ids: max_ids.max(1),
            ttl,
        }
    }

    /// Number of anonymous ids currently remembered
    pub async fn len(&self) -> usize {
        self.inner.lock().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Inner {
    fn sweep(&mut self, now: Instant) {
        if now < self.next_sweep {
            return;
        }
        self.ids.retain(|_, r| r.expires > now);
        self.next_sweep = now + SWEEP_INTERVAL;
    }

    fn evict_soonest(&mut self) {
        let soonest = self
            .ids
            .iter()
            .min_by_key(|(_, r)| r.expires)
            .map(|(k, _)| k.clone());
        if let Some(key) = soonest {
            self.ids.remove(&key);
        }
    }
}

#[async_trait]
impl AnonymousEventsStore for MemoryAnonymousEventsStore {
    async fn add_event(
        &self,
        workspace_id: &str,
        anonymous_id: &str,
        event: &AnalyticsEvent,
    ) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.sweep(now);

        let key = (workspace_id.to_string(), anonymous_id.to_string());
        if !inner.ids.contains_key(&key) && inner.ids.len() >= self.max_ids {
            inner.evict_soonest();
        }

        let remembered = inner.ids.entry(key).or_insert_with(|| Remembered {
            events: Vec::new(),
            expires: now,
        });
        if remembered.expires <= now {
            remembered.events.clear();
        }
        remembered.expires = now + self.ttl;

        // Redelivered events are remembered once
        if let Some(message_id) = event.message_id() {
            if remembered
                .events
                .iter()
                .any(|e| e.message_id().as_deref() == Some(message_id.as_str()))
            {
                return Ok(());
            }
        }

        let list = &mut remembered.events;
        list.push(event.clone());
        if list.len() > self.max_events {
            let excess = list.len() - self.max_events;
            list.drain(..excess);
        }
        Ok(())
    }

    async fn take_events(&self, workspace_id: &str, anonymous_id: &str) -> Result<Vec<AnalyticsEvent>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .ids
            .remove(&(workspace_id.to_string(), anonymous_id.to_string()))
            .filter(|r| r.expires > Instant::now())
            .map(|r| r.events)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent::from_value(json!({ "event": name })).unwrap()
    }

    fn event_with_id(name: &str, message_id: &str) -> AnalyticsEvent {
        AnalyticsEvent::from_value(json!({ "event": name, "messageId": message_id })).unwrap()
    }

    fn names(events: &[AnalyticsEvent]) -> Vec<String> {
        events.iter().filter_map(|e| e.event_name()).collect()
    }

    #[tokio::test]
    async fn test_take_drains_events() {
        let store = MemoryAnonymousEventsStore::new();
        store.add_event("ws", "anon-1", &event("a")).await.unwrap();
        store.add_event("ws", "anon-1", &event("b")).await.unwrap();
        store.add_event("other", "anon-1", &event("c")).await.unwrap();

        let taken = store.take_events("ws", "anon-1").await.unwrap();
        assert_eq!(names(&taken), vec!["a", "b"]);

        assert!(store.take_events("ws", "anon-1").await.unwrap().is_empty());
        assert_eq!(store.take_events("other", "anon-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oldest_events_are_discarded() {
        let store = MemoryAnonymousEventsStore::with_max_events(2);
        for name in ["a", "b", "c"] {
            store.add_event("ws", "anon", &event(name)).await.unwrap();
        }

        let taken = store.take_events("ws", "anon").await.unwrap();
        assert_eq!(names(&taken), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_redelivered_event_is_kept_once() {
        let store = MemoryAnonymousEventsStore::new();
        store.add_event("ws", "anon", &event_with_id("a", "m-1")).await.unwrap();
        store.add_event("ws", "anon", &event_with_id("a", "m-1")).await.unwrap();
        store.add_event("ws", "anon", &event_with_id("b", "m-2")).await.unwrap();

        let taken = store.take_events("ws", "anon").await.unwrap();
        assert_eq!(names(&taken), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ids_are_dropped() {
        let store = MemoryAnonymousEventsStore::with_limits(10, 1_000, Duration::from_secs(600));
        for i in 0..50 {
            store
                .add_event("ws", &format!("anon-{}", i), &event("visit"))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 50);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(store.take_events("ws", "anon-0").await.unwrap().is_empty());

        // the next write sweeps every expired id
        store.add_event("ws", "fresh", &event("visit")).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_capacity_evicts_oldest() {
        let store = MemoryAnonymousEventsStore::with_limits(10, 2, Duration::from_secs(600));
        store.add_event("ws", "first", &event("a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        store.add_event("ws", "second", &event("b")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        store.add_event("ws", "third", &event("c")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.take_events("ws", "first").await.unwrap().is_empty());
        assert_eq!(names(&store.take_events("ws", "third").await.unwrap()), vec!["c"]);
    }
}
