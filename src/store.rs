//! Record store adapter boundary.
//!
//! The store is a generic keyed JSON document store with `get`/`set`/
//! `delete`/`subscribe` semantics and **no** compare-and-swap or multi-key
//! atomicity. Every session manager operation is a single read, a local
//! derivation, and a single unconditional write against this boundary; if a
//! future backend offers conditional writes, only this trait grows — the
//! state machine above it does not change.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Store or ledger backend error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Store error: {} at {}:{}", message, file, line)]
pub struct StoreError {
    /// Error message.
    pub message: String,
    /// Line number where the error was raised.
    pub line: u32,
    /// Source file where the error was raised.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new store error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// One delivery on a subscription: the key's current document (`None` when
/// the record is absent or deleted), or a terminal backend failure.
pub type RecordEvent = Result<Option<Value>, StoreError>;

/// Handle for an active subscription to one key.
///
/// Deliveries preserve the store's per-key write order. Dropping the handle
/// detaches the listener deterministically; no deliveries are observable
/// after the drop returns.
pub struct RecordWatch {
    rx: mpsc::UnboundedReceiver<RecordEvent>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl RecordWatch {
    /// Builds a watch from a receiver and a detach action run on drop.
    pub fn new(rx: mpsc::UnboundedReceiver<RecordEvent>, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            detach: Some(Box::new(detach)),
        }
    }

    /// Receives the next event; `None` once the store side has closed.
    pub async fn recv(&mut self) -> Option<RecordEvent> {
        self.rx.recv().await
    }

    /// Polls for the next event.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<RecordEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for RecordWatch {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for RecordWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWatch").finish_non_exhaustive()
    }
}

/// Keyed JSON document store shared by all session participants.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads the document at `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Unconditionally overwrites the document at `key`.
    ///
    /// There is no conditional variant: concurrent writers race and the
    /// later write wins in full.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deletes the document at `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Attaches a listener to `key`.
    ///
    /// The current snapshot is delivered immediately, then one snapshot per
    /// subsequent write to the key.
    fn subscribe(&self, key: &str) -> RecordWatch;
}

struct Watcher {
    id: u64,
    tx: mpsc::UnboundedSender<RecordEvent>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Value>,
    watchers: HashMap<String, Vec<Watcher>>,
    next_watcher_id: u64,
}

/// In-process [`RecordStore`] for tests and single-process use.
///
/// Clones share one underlying map, so two `SessionManager`s built over
/// clones of the same `MemoryStore` behave like two clients of one remote
/// backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners currently attached to `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.watchers.get(key).map_or(0, Vec::len)
    }

    /// Injects a backend failure into every active subscription for `key`.
    ///
    /// Each listener receives one terminal `Err` and is detached, mirroring
    /// a remote backend cancelling subscriptions on transport or
    /// authorization failure. Pending operations and other keys are
    /// unaffected.
    #[instrument(skip(self))]
    pub fn fail_watchers(&self, key: &str, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(watchers) = inner.watchers.remove(key) {
            warn!(key, count = watchers.len(), "Failing watchers");
            for watcher in watchers {
                let _ = watcher.tx.send(Err(StoreError::new(message)));
            }
        }
    }
}

impl Inner {
    /// Sends the key's current snapshot to every listener, pruning any
    /// whose receiver has been dropped.
    fn notify(&mut self, key: &str) {
        let snapshot = self.records.get(key).cloned();
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|w| w.tx.send(Ok(snapshot.clone())).is_ok());
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.records.insert(key.to_string(), value);
        inner.notify(key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.records.remove(key);
        inner.notify(key);
        Ok(())
    }

    #[instrument(skip(self))]
    fn subscribe(&self, key: &str) -> RecordWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();

        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;

        // Listeners see the current snapshot immediately on attach.
        let _ = tx.send(Ok(inner.records.get(key).cloned()));
        inner
            .watchers
            .entry(key.to_string())
            .or_default()
            .push(Watcher { id, tx });
        debug!(key, watcher_id = id, "Listener attached");

        let weak = Arc::downgrade(&self.inner);
        let detach_key = key.to_string();
        RecordWatch::new(rx, move || detach_watcher(&weak, &detach_key, id))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

/// Removes one listener from the store, if the store still exists.
fn detach_watcher(inner: &Weak<Mutex<Inner>>, key: &str, id: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = inner.lock().unwrap();
    if let Some(watchers) = inner.watchers.get_mut(key) {
        watchers.retain(|w| w.id != id);
        if watchers.is_empty() {
            inner.watchers.remove(key);
        }
    }
    debug!(key, watcher_id = id, "Listener detached");
}
