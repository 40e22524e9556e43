//! Keyed cache of observable slots with single-flight fetches.
//!
//! The first lookup of a key registers a `Loading` slot and spawns its fetch;
//! later lookups return the same slot without touching the backend. Entries
//! are never evicted. A cache lives as long as the repository that owns it,
//! which is one signed-in session of the app.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use plotpot_types::UiState;

use crate::slot::{Slot, Ticket};

pub struct KeyedCache<K, T> {
    slots: Arc<Mutex<HashMap<K, Slot<T>>>>,
}

impl<K, T> Clone for KeyedCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K, T> Default for KeyedCache<K, T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<T>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The slot for `key`, fetching it first if the key has never been seen.
    ///
    /// `fetch` is only invoked for an unseen key. Must be called from within a
    /// Tokio runtime.
    pub fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Slot<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = UiState<T>> + Send + 'static,
    {
        let (slot, ticket) = {
            let mut slots = self.lock();
            if let Some(slot) = slots.get(&key) {
                return slot.clone();
            }

            let slot = Slot::new();
            let ticket = slot.begin();
            slots.insert(key.clone(), slot.clone());
            (slot, ticket)
        };

        debug!("Cache miss for {:?}, fetching", key);
        spawn_into(slot.clone(), ticket, fetch());
        slot
    }

    /// Re-run the fetch for `key` into its existing slot, registering one if
    /// needed. Observers of the old slot see the new result.
    pub fn refresh<F, Fut>(&self, key: K, fetch: F) -> Slot<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = UiState<T>> + Send + 'static,
    {
        let slot = self.lock().entry(key).or_default().clone();
        let ticket = slot.begin();
        spawn_into(slot.clone(), ticket, fetch());
        slot
    }

    pub fn get(&self, key: &K) -> Option<Slot<T>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn spawn_into<T, Fut>(slot: Slot<T>, ticket: Ticket, fetch: Fut)
where
    T: Send + Sync + 'static,
    Fut: Future<Output = UiState<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let state = fetch.await;
        slot.finish(ticket, state);
    });
}
