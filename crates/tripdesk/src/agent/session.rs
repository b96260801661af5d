//! In-memory conversation store with capacity-triggered eviction.
//!
//! Conversations are created lazily on first access, seeded with the system
//! preamble, and live until an eviction pass removes them. The store is
//! shared by every request; each conversation also has its own async lock so
//! that two turns on the same id run one after the other.

use crate::Message;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Which conversations an eviction pass removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Remove the lowest ids in ascending string order.
    #[default]
    IdOrder,
    /// Remove the conversations touched longest ago.
    LeastRecentlyUsed,
}

#[derive(Debug)]
struct Entry {
    messages: Vec<Message>,
    last_touched: DateTime<Utc>,
    /// Store-wide touch counter; orders touches that share a timestamp.
    generation: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, Entry>,
    locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    clock: u64,
}

impl StoreInner {
    fn touch(&mut self, id: &str, messages: Vec<Message>) {
        self.clock += 1;
        self.entries.insert(
            id.to_string(),
            Entry {
                messages,
                last_touched: Utc::now(),
                generation: self.clock,
            },
        );
    }
}

/// Map from conversation id to its message sequence.
#[derive(Debug)]
pub struct SessionStore {
    inner: Mutex<StoreInner>,
    system_prompt: String,
}

impl SessionStore {
    /// Create an empty store seeding new conversations with `system_prompt`.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            system_prompt: system_prompt.into(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        // The guarded maps are never left half-updated; a panic elsewhere
        // does not invalidate them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The messages of conversation `id`, creating it if unseen.
    pub fn get_or_create(&self, id: &str) -> Vec<Message> {
        let mut inner = self.inner();
        let messages = match inner.entries.get(id) {
            Some(entry) => entry.messages.clone(),
            None => {
                debug!("Creating conversation {id}");
                vec![Message::system(self.system_prompt.clone())]
            }
        };
        inner.touch(id, messages.clone());
        messages
    }

    /// Replace the messages of conversation `id`.
    pub fn put(&self, id: &str, messages: Vec<Message>) {
        self.inner().touch(id, messages);
    }

    /// The messages of conversation `id`, if it exists. Does not touch it.
    pub fn get(&self, id: &str) -> Option<Vec<Message>> {
        self.inner().entries.get(id).map(|e| e.messages.clone())
    }

    /// When conversation `id` was last read or written.
    pub fn last_touched(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner().entries.get(id).map(|e| e.last_touched)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().entries.is_empty()
    }

    /// All conversation ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for exclusive access to conversation `id`.
    ///
    /// Hold the guard for the whole turn: read, model calls, write back.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .inner()
            .locks
            .entry(id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Shrink the store to `target` conversations once it holds more than
    /// `max`. Returns the number of conversations removed.
    ///
    /// The `target` newest conversations under `policy` survive. A
    /// conversation whose lock is held or awaited is never removed.
    pub fn maybe_evict(&self, max: usize, target: usize, policy: EvictionPolicy) -> usize {
        let mut inner = self.inner();
        let size = inner.entries.len();
        if size <= max {
            return 0;
        }

        let mut candidates: Vec<(String, u64)> = inner
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.generation))
            .collect();
        match policy {
            EvictionPolicy::IdOrder => candidates.sort_by(|a, b| a.0.cmp(&b.0)),
            EvictionPolicy::LeastRecentlyUsed => candidates.sort_by_key(|c| c.1),
        }

        let excess = size - target.min(size);
        let mut removed = 0;
        let mut skipped = 0;
        for (id, _) in candidates {
            if removed == excess {
                break;
            }
            let busy = inner
                .locks
                .get(&id)
                .is_some_and(|lock| Arc::strong_count(lock) > 1);
            if busy {
                skipped += 1;
                continue;
            }
            inner.entries.remove(&id);
            inner.locks.remove(&id);
            removed += 1;
        }

        info!(
            "Evicted {removed} conversations ({policy:?}): {size} -> {}",
            inner.entries.len()
        );
        if skipped > 0 {
            warn!("Kept {skipped} conversations with turns in progress");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store_with(ids: impl IntoIterator<Item = String>) -> SessionStore {
        let store = SessionStore::new("sys");
        for id in ids {
            store.put(&id, vec![Message::user(format!("hello from {id}"))]);
        }
        store
    }

    #[test]
    fn new_conversations_are_seeded() {
        let store = SessionStore::new("You are a travel assistant.");
        let msgs = store.get_or_create("abc");
        assert_eq!(msgs, vec![Message::system("You are a travel assistant.")]);
        assert!(store.contains("abc"));
        assert!(store.last_touched("abc").is_some());
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = SessionStore::new("sys");
        let msgs = vec![Message::system("sys"), Message::user("hi")];
        store.put("c1", msgs.clone());
        assert_eq!(store.get_or_create("c1"), msgs);
        assert_eq!(store.get("c1"), Some(msgs));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn no_eviction_at_or_below_capacity() {
        let store = store_with((0..100).map(|i| format!("{i:04}")));
        assert_eq!(store.maybe_evict(100, 50, EvictionPolicy::IdOrder), 0);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn id_order_eviction_keeps_highest_ids() {
        let store = store_with((0..=100).map(|i| format!("{i:04}")));
        assert_eq!(store.len(), 101);

        let removed = store.maybe_evict(100, 50, EvictionPolicy::IdOrder);
        assert_eq!(removed, 51);
        assert_eq!(store.len(), 50);
        for i in 0..=50 {
            assert!(!store.contains(&format!("{i:04}")), "{i:04} should be evicted");
        }
        for i in 51..=100 {
            assert!(store.contains(&format!("{i:04}")), "{i:04} should remain");
        }
    }

    #[test]
    fn lru_eviction_keeps_recently_touched() {
        let store = store_with((0..10).map(|i| format!("{i:04}")));
        // Touch the oldest ids so they become the most recent.
        store.get_or_create("0000");
        store.get_or_create("0001");

        store.maybe_evict(5, 3, EvictionPolicy::LeastRecentlyUsed);
        assert_eq!(store.ids(), vec!["0000", "0001", "0009"]);
    }

    #[tokio::test]
    async fn held_conversations_survive_eviction() {
        let store = store_with((0..10).map(|i| format!("{i:04}")));
        let guard = store.lock("0000").await;

        store.maybe_evict(5, 2, EvictionPolicy::IdOrder);
        assert!(store.contains("0000"));
        assert_eq!(store.len(), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn lock_serializes_same_id() {
        let store = Arc::new(SessionStore::new("sys"));
        let guard = store.lock("c1").await;

        let other = store.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("c1").await;
            other.put("c1", vec![Message::user("second")]);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.put("c1", vec![Message::user("first")]);
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(store.get("c1"), Some(vec![Message::user("second")]));
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let store = SessionStore::new("sys");
        let _a = store.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), store.lock("b")).await;
        assert!(b.is_ok());
    }
}
