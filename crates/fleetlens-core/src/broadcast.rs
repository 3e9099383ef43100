// ── Change broadcaster ──
//
// Decides whether a batch of merges produced observable change and, if
// so, publishes through the hub. The last payload serialization sent on
// each channel is remembered; an identical consecutive payload is
// suppressed. This protects against transports re-delivering or echoing
// the same frame.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hub::SubscriptionHub;
use crate::model::{Entity, Update};
use crate::store::MergeStore;

/// What a source publishes after a batch of merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastPolicy {
    /// The refreshed full snapshot (location-style upstreams).
    Snapshot,
    /// Each changed entity on its own (order-style upstreams).
    Entity,
}

/// Owned by the pipeline worker; not shared, so no locking.
pub struct ChangeBroadcaster {
    hub: Arc<SubscriptionHub>,
    /// channel name → stable serialization of the last payload sent.
    last_sent: HashMap<String, String>,
}

impl ChangeBroadcaster {
    pub fn new(hub: Arc<SubscriptionHub>) -> Self {
        Self {
            hub,
            last_sent: HashMap::new(),
        }
    }

    /// Publish the outcome of one decoded message's merges.
    ///
    /// `changed` holds the entities whose merge reported a difference; an
    /// empty batch publishes nothing. Returns how many payloads actually
    /// went out (after duplicate elision).
    pub fn publish_batch(
        &mut self,
        channel: &str,
        policy: BroadcastPolicy,
        changed: &[Arc<Entity>],
        store: &MergeStore,
    ) -> usize {
        if changed.is_empty() {
            return 0;
        }

        let mut sent = 0;
        match policy {
            BroadcastPolicy::Snapshot => {
                let update = Update::Snapshot(store.all().as_ref().clone());
                sent += usize::from(self.send_deduped(channel, update));
            }
            BroadcastPolicy::Entity => {
                for entity in changed {
                    let update = Update::Entity(Arc::clone(entity));
                    sent += usize::from(self.send_deduped(channel, update));
                }
            }
        }

        sent
    }

    /// Serialize, compare against the channel's previous payload, and
    /// publish only when different.
    ///
    /// Serialization is stable: `serde_json` maps are key-ordered and the
    /// store snapshot is id-ordered, so equal states always produce equal
    /// strings.
    fn send_deduped(&mut self, channel: &str, update: Update) -> bool {
        let serialized = match serde_json::to_string(&update) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(channel, error = %e, "payload serialization failed");
                return false;
            }
        };

        if self.last_sent.get(channel) == Some(&serialized) {
            tracing::trace!(channel, "duplicate payload suppressed");
            return false;
        }

        self.hub.publish(Arc::new(update));
        self.last_sent.insert(channel.to_owned(), serialized);
        true
    }
}
