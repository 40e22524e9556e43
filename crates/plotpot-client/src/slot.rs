//! Observable UI-state slots.
//!
//! A [`Slot`] holds the latest [`UiState`] of one logical operation and
//! notifies subscribers on every change. Publishing into a slot nobody
//! observes is a no-op.
//!
//! Overlapping operations on the same slot are ordered by issue time: each
//! [`Slot::begin`] hands out a [`Ticket`], and [`Slot::finish`] only publishes
//! if no newer operation started in the meantime. A slow early request can
//! therefore never overwrite the result of a later one.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::debug;

use plotpot_types::UiState;

/// Generation stamp of one operation started on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

pub struct Slot<T> {
    inner: Arc<SlotInner<T>>,
}

struct SlotInner<T> {
    tx: watch::Sender<UiState<T>>,
    generation: AtomicU64,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self::with_state(UiState::Initial)
    }

    pub fn with_state(state: UiState<T>) -> Self {
        let (tx, _) = watch::channel(state);
        Self {
            inner: Arc::new(SlotInner {
                tx,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Receiver that observes every subsequent change. The current state is
    /// available immediately through `borrow()`.
    pub fn subscribe(&self) -> watch::Receiver<UiState<T>> {
        self.inner.tx.subscribe()
    }

    /// True if both handles refer to the same slot instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start a new operation: publishes `Loading` and supersedes every
    /// operation started before.
    pub fn begin(&self) -> Ticket {
        let mut ticket = Ticket(0);
        self.inner.tx.send_modify(|state| {
            ticket = Ticket(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
            *state = UiState::Loading;
        });
        ticket
    }

    /// Settle the operation identified by `ticket`. Returns false, leaving the
    /// slot untouched, if a newer operation has begun since.
    pub fn finish(&self, ticket: Ticket, state: UiState<T>) -> bool {
        let published = self.inner.tx.send_if_modified(|current| {
            if self.inner.generation.load(Ordering::SeqCst) != ticket.0 {
                return false;
            }
            *current = state;
            true
        });

        if !published {
            debug!("Discarded stale completion (ticket {})", ticket.0);
        }
        published
    }

    /// Publish `state` as the outcome of a new, already finished operation.
    pub fn set(&self, state: UiState<T>) {
        self.inner.tx.send_modify(|current| {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            *current = state;
        });
    }
}

impl<T: Clone> Slot<T> {
    pub fn get(&self) -> UiState<T> {
        self.inner.tx.borrow().clone()
    }

    /// Wait until the slot holds `Success` or `Error`.
    ///
    /// Resolves immediately if it already does. A slot left in `Initial`
    /// never settles on its own.
    pub async fn settled(&self) -> UiState<T> {
        let mut rx = self.subscribe();
        match rx.wait_for(UiState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.get(),
        }
    }
}
