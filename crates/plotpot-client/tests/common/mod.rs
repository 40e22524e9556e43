//! A call-counting wrapper around the in-memory local backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use plotpot_client::PlotPot;
use plotpot_db::LocalBackend;
use plotpot_types::api::Identity;
use plotpot_types::{Backend, BackendError, Filter, Query, Table};

pub const PASSWORD: &str = "secret1";

#[derive(Default)]
pub struct Calls {
    pub select: AtomicUsize,
    pub insert: AtomicUsize,
    pub update: AtomicUsize,
    pub sign_up: AtomicUsize,
    pub sign_in: AtomicUsize,
    pub sign_out: AtomicUsize,
}

/// Records every call before forwarding it to a fresh in-memory store.
/// Selects can be slowed down one by one with [`SpyBackend::delay_next_selects`].
pub struct SpyBackend {
    inner: LocalBackend,
    pub calls: Calls,
    select_delays: Mutex<VecDeque<Duration>>,
}

impl SpyBackend {
    pub fn new() -> Self {
        Self {
            inner: LocalBackend::open_in_memory("test-secret").unwrap(),
            calls: Calls::default(),
            select_delays: Mutex::new(VecDeque::new()),
        }
    }

    pub fn selects(&self) -> usize {
        self.calls.select.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.calls.insert.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    /// Every call that would have reached the remote store.
    pub fn total(&self) -> usize {
        [
            &self.calls.select,
            &self.calls.insert,
            &self.calls.update,
            &self.calls.sign_up,
            &self.calls.sign_in,
            &self.calls.sign_out,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn delay_next_selects(&self, delays: &[Duration]) {
        self.select_delays.lock().unwrap().extend(delays.iter().copied());
    }
}

impl Backend for SpyBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.calls.select.fetch_add(1, Ordering::SeqCst);
        let delay = self.select_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.select(query).await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        self.calls.insert.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: Table, filters: &[Filter], changes: Value) -> Result<Vec<Value>, BackendError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.inner.update(table, filters, changes).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.calls.sign_up.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.calls.sign_in.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_out().await
    }

    fn current_identity(&self) -> Option<Identity> {
        self.inner.current_identity()
    }
}

pub fn client() -> (PlotPot<SpyBackend>, Arc<SpyBackend>) {
    let backend = Arc::new(SpyBackend::new());
    (PlotPot::with_backend(Arc::clone(&backend)), backend)
}

/// A client with `username` signed up and signed in.
pub async fn signed_in(username: &str) -> (PlotPot<SpyBackend>, Arc<SpyBackend>) {
    let (app, backend) = client();
    app.auth
        .sign_up(&format!("{}@plotpot.app", username), PASSWORD, username)
        .await
        .unwrap();
    (app, backend)
}
