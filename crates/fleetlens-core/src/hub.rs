// ── Subscription hub ──
//
// Fan-out to subscriber sinks. Delivery is best-effort and never blocks:
// a slow subscriber drops that update, a closed one is pruned. Neither
// affects the others or the ingestion path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::Update;
use crate::store::MergeStore;

/// Opaque handle identifying one connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct SubscriptionHub {
    store: Arc<MergeStore>,
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<Update>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl SubscriptionHub {
    pub fn new(store: Arc<MergeStore>, buffer: usize) -> Self {
        Self {
            store,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
            buffer: buffer.max(1),
        }
    }

    /// Connect a new subscriber.
    ///
    /// The current full snapshot is pushed immediately, before any
    /// subsequent publish can reach the channel.
    pub fn connect(&self) -> (SubscriberId, mpsc::Receiver<Arc<Update>>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);

        let snapshot = Update::Snapshot(self.store.all().as_ref().clone());
        // Buffer is at least 1 and the receiver is brand new, so the
        // snapshot always fits.
        let _ = tx.try_send(Arc::new(snapshot));

        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber = id.0, total = self.subscribers.len(), "subscriber connected");
        (id, rx)
    }

    /// Remove a subscriber. No further obligations to it.
    pub fn disconnect(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = id.0, "subscriber disconnected");
        }
    }

    /// Deliver an update to every connected subscriber, fire-and-forget.
    pub fn publish(&self, update: Arc<Update>) {
        let mut closed = Vec::new();

        for entry in &self.subscribers {
            match entry.value().try_send(Arc::clone(&update)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = entry.key().0, "subscriber lagging, update dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(*entry.key());
                }
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber = id.0, "subscriber channel closed, pruned");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
