// ── Pipeline worker and engine handle ──
//
// Transports push RawFrames onto one intake channel; a single worker
// task drains it, running decode → extract → resolve → merge →
// broadcast synchronously per frame. Serializing every merge through
// the one worker is what keeps last-write-wins per field sound under
// concurrent producers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broadcast::{BroadcastPolicy, ChangeBroadcaster};
use crate::decode;
use crate::error::CoreError;
use crate::extract::{extract_candidates, incoming_fields, resolve_identity};
use crate::hub::{SubscriberId, SubscriptionHub};
use crate::model::{DecodedMessage, RawFrame, SourceTag, Update};
use crate::profile::ExtractionProfile;
use crate::store::MergeStore;

const DEFAULT_INTAKE_CAPACITY: usize = 256;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

// ── Configuration ────────────────────────────────────────────────────

/// Wires one source tag to its extraction profile and broadcast policy.
#[derive(Debug, Clone)]
pub struct SourceRoute {
    pub tag: SourceTag,
    pub profile: ExtractionProfile,
    pub policy: BroadcastPolicy,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on the intake channel. Guards memory only — there is no
    /// real backpressure between sources and the pipeline.
    pub intake_capacity: usize,
    /// Per-subscriber delivery buffer.
    pub subscriber_buffer: usize,
    pub routes: Vec<SourceRoute>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            routes: Vec::new(),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. Owns the MergeStore and SubscriptionHub, hands out
/// the intake sender to transports, and manages the worker task
/// lifecycle. Call [`start()`](Self::start) to begin draining frames.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<MergeStore>,
    hub: Arc<SubscriptionHub>,
    routes: HashMap<String, SourceRoute>,
    intake_tx: mpsc::Sender<RawFrame>,
    intake_rx: Mutex<Option<mpsc::Receiver<RawFrame>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(MergeStore::new());
        let hub = Arc::new(SubscriptionHub::new(
            Arc::clone(&store),
            config.subscriber_buffer,
        ));
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity.max(1));

        let routes = config
            .routes
            .into_iter()
            .map(|route| (route.tag.as_str().to_owned(), route))
            .collect();

        Self {
            inner: Arc::new(EngineInner {
                store,
                hub,
                routes,
                intake_tx,
                intake_rx: Mutex::new(Some(intake_rx)),
                cancel: CancellationToken::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Spawn the pipeline worker. Frames pushed before this call queue up
    /// on the intake channel and are drained once the worker runs.
    pub async fn start(&self) {
        let Some(rx) = self.inner.intake_rx.lock().await.take() else {
            return; // already started
        };

        let store = Arc::clone(&self.inner.store);
        let hub = Arc::clone(&self.inner.hub);
        let routes = self.inner.routes.clone();
        let cancel = self.inner.cancel.clone();

        let handle = tokio::spawn(pipeline_worker(store, hub, routes, rx, cancel));
        *self.inner.worker.lock().await = Some(handle);
    }

    /// Sender that transports push raw frames into.
    pub fn intake(&self) -> mpsc::Sender<RawFrame> {
        self.inner.intake_tx.clone()
    }

    /// Push one frame directly, for in-process producers.
    pub async fn push(&self, frame: RawFrame) -> Result<(), CoreError> {
        self.inner
            .intake_tx
            .send(frame)
            .await
            .map_err(|_| CoreError::EngineClosed)
    }

    /// The canonical store (read access).
    pub fn store(&self) -> &Arc<MergeStore> {
        &self.inner.store
    }

    /// Connect a subscriber; the current snapshot arrives first.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Arc<Update>>) {
        self.inner.hub.connect()
    }

    pub fn disconnect(&self, id: SubscriberId) {
        self.inner.hub.disconnect(id);
    }

    /// Stop the worker and wait for it to drain.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

// ── Worker ───────────────────────────────────────────────────────────

async fn pipeline_worker(
    store: Arc<MergeStore>,
    hub: Arc<SubscriptionHub>,
    routes: HashMap<String, SourceRoute>,
    mut intake: mpsc::Receiver<RawFrame>,
    cancel: CancellationToken,
) {
    let mut broadcaster = ChangeBroadcaster::new(hub);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = intake.recv() => {
                let Some(frame) = frame else { break };
                process_frame(&frame, &routes, &store, &mut broadcaster);
            }
        }
    }

    debug!("pipeline worker exiting");
}

/// One frame, end to end. Nothing here escalates: a bad frame is logged
/// and the next one proceeds.
fn process_frame(
    frame: &RawFrame,
    routes: &HashMap<String, SourceRoute>,
    store: &MergeStore,
    broadcaster: &mut ChangeBroadcaster,
) {
    let Some(route) = routes.get(frame.source.as_str()) else {
        warn!(source = %frame.source, "frame from unregistered source dropped");
        return;
    };

    let Some(message) = decode::decode(frame) else {
        return;
    };

    if let DecodedMessage::Event { name, .. } = &message {
        debug!(source = %frame.source, event = %name, "tagged event");
    }

    let candidates = extract_candidates(message.body(), &route.profile);
    let mut changed = Vec::new();

    for candidate in &candidates {
        match resolve_identity(candidate, &route.profile) {
            Some(id) => {
                let fields = incoming_fields(candidate, &route.profile);
                let (entity, did_change) = store.merge(&id, fields);
                if did_change {
                    changed.push(entity);
                }
            }
            None => {
                let keys: Vec<&str> = candidate.keys().map(String::as_str).collect();
                debug!(source = %frame.source, ?keys, "unresolved candidate dropped");
            }
        }
    }

    let sent = broadcaster.publish_batch(frame.source.as_str(), route.policy, &changed, store);
    if !candidates.is_empty() {
        debug!(
            source = %frame.source,
            candidates = candidates.len(),
            merged = changed.len(),
            published = sent,
            "frame processed"
        );
    }
}
