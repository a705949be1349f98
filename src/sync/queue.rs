//! Optimistic state container for the queue domain
//!
//! Queue edits (remove, move, clear) apply to the local item list
//! immediately and keep the whole previous list as their rollback baseline:
//! queue commands fail atomically on the server, so rollback restores the
//! list as it was at issuance.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};

use crate::error::SyncError;
use crate::model::decode::{self, QueueDelta};
use crate::model::{QueueItem, QueueSnapshot};
use crate::transport::{EventDomain, Transport};

use super::optimistic::{FieldLedger, Resolution};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum QueueField {
    Items,
    CurrentIndex,
}

#[derive(Clone, Debug)]
enum QueueValue {
    Items(Vec<QueueItem>),
    CurrentIndex(Option<usize>),
}

struct Inner {
    snapshot: QueueSnapshot,
    ledger: FieldLedger<QueueField, QueueValue>,
    field_locks: HashMap<QueueField, Arc<Mutex<()>>>,
}

impl Inner {
    fn read_field(&self, field: QueueField) -> QueueValue {
        match field {
            QueueField::Items => QueueValue::Items(self.snapshot.items.clone()),
            QueueField::CurrentIndex => QueueValue::CurrentIndex(self.snapshot.current_index),
        }
    }

    fn write_field(&mut self, value: QueueValue) {
        match value {
            QueueValue::Items(items) => self.snapshot.items = items,
            QueueValue::CurrentIndex(index) => self.snapshot.current_index = index,
        }
    }

    fn field_lock(&mut self, field: QueueField) -> Arc<Mutex<()>> {
        self.field_locks.entry(field).or_default().clone()
    }

    fn selected_queue_id(&self) -> Option<String> {
        self.snapshot.queue_id.clone()
    }
}

/// Owner of the queue domain's observable state.
#[derive(Clone)]
pub struct QueueContainer {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<Inner>>,
    snapshot_tx: Arc<watch::Sender<QueueSnapshot>>,
    error_tx: Arc<watch::Sender<Option<SyncError>>>,
    generation: Arc<AtomicU64>,
}

impl QueueContainer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (snapshot_tx, _) = watch::channel(QueueSnapshot::default());
        let (error_tx, _) = watch::channel(None);
        Self {
            transport,
            inner: Arc::new(Mutex::new(Inner {
                snapshot: QueueSnapshot::default(),
                ledger: FieldLedger::default(),
                field_locks: HashMap::new(),
            })),
            snapshot_tx: Arc::new(snapshot_tx),
            error_tx: Arc::new(error_tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn last_error(&self) -> watch::Receiver<Option<SyncError>> {
        self.error_tx.subscribe()
    }

    pub fn clear_error(&self) {
        self.error_tx.send_replace(None);
    }

    /// Target a queue: replace all queue state, restart the event
    /// subscription and pull the queue's current contents.
    pub async fn select_queue(&self, queue_id: String) -> Result<(), SyncError> {
        tracing::info!(queue_id = %queue_id, "Selecting queue");
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut guard = self.inner.lock().await;
            guard.snapshot = QueueSnapshot {
                queue_id: Some(queue_id.clone()),
                ..QueueSnapshot::default()
            };
            guard.ledger = FieldLedger::default();
            self.snapshot_tx.send_replace(guard.snapshot.clone());
        }
        self.spawn_event_loop(generation, queue_id);
        self.refresh().await
    }

    /// Pull the queue contents and merge them in.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let queue_id = {
            let guard = self.inner.lock().await;
            guard
                .selected_queue_id()
                .ok_or(SyncError::NoActiveSelection("queue"))?
        };
        match self
            .transport
            .fetch_query("queue/items", json!({ "queue_id": queue_id }))
            .await
        {
            Ok(payload) => {
                let delta = decode::decode_queue_delta(&payload);
                let mut guard = self.inner.lock().await;
                Self::merge_delta(&mut guard, delta);
                self.snapshot_tx.send_replace(guard.snapshot.clone());
                Ok(())
            }
            Err(err) => {
                let err = SyncError::from_transport("queue/items", err);
                self.error_tx.send_replace(Some(err.clone()));
                Err(err)
            }
        }
    }

    fn spawn_event_loop(&self, generation: u64, queue_id: String) {
        let mut events = self.transport.subscribe(EventDomain::Queue);
        let container = self.clone();
        tokio::spawn(async move {
            tracing::debug!(generation, queue_id = %queue_id, "Queue event loop started");
            while let Some(event) = events.recv().await {
                if container.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                if event.target_id.as_deref() != Some(queue_id.as_str()) {
                    continue;
                }
                let delta = decode::decode_queue_delta(&event.payload);
                let mut guard = container.inner.lock().await;
                if container.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                Self::merge_delta(&mut guard, delta);
                container.snapshot_tx.send_replace(guard.snapshot.clone());
            }
            tracing::debug!(generation, "Queue event loop ended");
        });
    }

    /// Merge server truth. A field with a pending edit keeps its local value
    /// for now; the server value is recorded and takes over once the edit's
    /// command confirms.
    fn merge_delta(inner: &mut Inner, delta: QueueDelta) {
        if let Some(items) = delta.items {
            if inner.ledger.is_pending(QueueField::Items) {
                inner.ledger.observe(QueueField::Items, QueueValue::Items(items));
            } else {
                inner.snapshot.items = items;
            }
        }
        if let Some(index) = delta.current_index {
            if inner.ledger.is_pending(QueueField::CurrentIndex) {
                inner
                    .ledger
                    .observe(QueueField::CurrentIndex, QueueValue::CurrentIndex(index));
            } else {
                inner.snapshot.current_index = index;
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Jump playback to the item at `index`.
    pub async fn play_index(&self, index: usize) -> Result<(), SyncError> {
        let within = {
            let guard = self.inner.lock().await;
            index < guard.snapshot.items.len()
        };
        if !within {
            return Ok(());
        }
        self.apply_field(
            QueueField::CurrentIndex,
            QueueValue::CurrentIndex(Some(index)),
            "queue/play_index",
            json!({ "index": index }),
        )
        .await
    }

    /// Remove one item by its queue-scoped id.
    pub async fn remove_item(&self, queue_item_id: &str) -> Result<(), SyncError> {
        let items = {
            let guard = self.inner.lock().await;
            let mut items = guard.snapshot.items.clone();
            items.retain(|item| item.queue_item_id != queue_item_id);
            if items.len() == guard.snapshot.items.len() {
                // Unknown id: nothing to do, nothing to send.
                return Ok(());
            }
            items
        };
        self.apply_field(
            QueueField::Items,
            QueueValue::Items(items),
            "queue/remove",
            json!({ "queue_item_id": queue_item_id }),
        )
        .await
    }

    /// Reorder: move the item at `from` to sit at `to`.
    pub async fn move_item(&self, from: usize, to: usize) -> Result<(), SyncError> {
        let items = {
            let guard = self.inner.lock().await;
            let len = guard.snapshot.items.len();
            if from >= len || to >= len || from == to {
                return Ok(());
            }
            let mut items = guard.snapshot.items.clone();
            let item = items.remove(from);
            items.insert(to, item);
            items
        };
        self.apply_field(
            QueueField::Items,
            QueueValue::Items(items),
            "queue/move",
            json!({ "from": from, "to": to }),
        )
        .await
    }

    /// Drop every item.
    pub async fn clear_queue(&self) -> Result<(), SyncError> {
        self.apply_field(
            QueueField::Items,
            QueueValue::Items(Vec::new()),
            "queue/clear",
            json!({}),
        )
        .await
    }

    /// Append a track. Not optimistic: the server assigns the queue item id
    /// and pushes the updated list.
    pub async fn add_track(&self, track_id: &str) -> Result<(), SyncError> {
        let queue_id = {
            let guard = self.inner.lock().await;
            guard
                .selected_queue_id()
                .ok_or(SyncError::NoActiveSelection("queue"))?
        };
        let container = self.clone();
        let args = json!({ "queue_id": queue_id, "track_id": track_id });
        tokio::spawn(async move {
            if let Err(err) = container.transport.issue_command("queue/add", args).await {
                tracing::warn!(error = %err, "queue/add failed");
                container
                    .error_tx
                    .send_replace(Some(SyncError::from_transport("queue/add", err)));
            }
        });
        Ok(())
    }

    // ========================================================================
    // Optimistic plumbing
    // ========================================================================

    async fn apply_field(
        &self,
        field: QueueField,
        value: QueueValue,
        command: &'static str,
        mut args: Value,
    ) -> Result<(), SyncError> {
        let token = {
            let mut guard = self.inner.lock().await;
            let queue_id = guard
                .selected_queue_id()
                .ok_or(SyncError::NoActiveSelection("queue"))?;
            let baseline = guard.read_field(field);
            let token = guard.ledger.begin(field, baseline);
            guard.write_field(value);
            self.snapshot_tx.send_replace(guard.snapshot.clone());
            args["queue_id"] = Value::String(queue_id);
            token
        };
        let container = self.clone();
        tokio::spawn(async move {
            container.send_field_command(field, token, command, args).await;
        });
        Ok(())
    }

    async fn send_field_command(&self, field: QueueField, token: u64, command: &str, args: Value) {
        let lock = {
            let mut guard = self.inner.lock().await;
            guard.field_lock(field)
        };
        let _serialized = lock.lock().await;

        let proceed = {
            let mut guard = self.inner.lock().await;
            guard.ledger.mark_in_flight(field, token)
        };
        if !proceed {
            return;
        }

        let result = self.transport.issue_command(command, args).await;
        let mut guard = self.inner.lock().await;
        match result {
            Ok(()) => match guard.ledger.resolve_success(field, token) {
                Resolution::Observed(server) => {
                    tracing::debug!(?field, command, "Queue command confirmed, applying value observed mid-flight");
                    guard.write_field(server);
                    self.snapshot_tx.send_replace(guard.snapshot.clone());
                }
                Resolution::Confirmed => {
                    tracing::debug!(?field, command, "Queue command confirmed");
                }
                Resolution::Superseded => {}
            },
            Err(err) => {
                if let Some(baseline) = guard.ledger.resolve_failure(field, token) {
                    tracing::warn!(?field, command, error = %err, "Queue command failed, rolling back");
                    guard.write_field(baseline);
                    self.snapshot_tx.send_replace(guard.snapshot.clone());
                    self.error_tx
                        .send_replace(Some(SyncError::from_transport(command, err)));
                }
            }
        }
    }
}
