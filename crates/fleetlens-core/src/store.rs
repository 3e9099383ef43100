// ── Canonical merge store ──
//
// One authoritative record per resolved id. Merges are non-destructive:
// a later partial update overwrites only the keys it supplies. The store
// is an owned handle passed explicitly to the pipeline — no ambient
// global state — and all mutation flows through the single pipeline
// worker.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::model::Entity;

/// The canonical store: resolved id → merged [`Entity`].
///
/// Reads are concurrent and return `Arc` snapshots; callers must not
/// assume a returned entity stays live. A `watch`-based full snapshot is
/// rebuilt on every observable change for cheap subscriber replay.
pub struct MergeStore {
    entities: DashMap<String, Arc<Entity>>,

    /// Version counter, bumped on every observable change.
    version: watch::Sender<u64>,

    /// Full snapshot ordered by id, rebuilt on change.
    snapshot: watch::Sender<Arc<Vec<Arc<Entity>>>>,
}

impl MergeStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            entities: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Merge a partial field map into the entity for `id`, creating it on
    /// first sight. Returns the resulting entity and whether anything
    /// observable changed.
    ///
    /// Keys absent from `incoming` are left untouched; a field, once set,
    /// is only ever overwritten, never cleared.
    pub fn merge(&self, id: &str, incoming: Map<String, Value>) -> (Arc<Entity>, bool) {
        // Clone out of the map guard before re-inserting; holding a
        // shard reference across `insert` would deadlock.
        let existing = self.entities.get(id).map(|r| Arc::clone(r.value()));

        let entity = match existing {
            None => Arc::new(Entity::new(id, incoming)),
            Some(existing) => {
                let mut fields = existing.fields.clone();
                let mut changed = false;
                for (key, value) in incoming {
                    if fields.get(&key) != Some(&value) {
                        fields.insert(key, value);
                        changed = true;
                    }
                }

                if !changed {
                    return (existing, false);
                }

                Arc::new(Entity {
                    id: existing.id.clone(),
                    fields,
                    last_updated: Utc::now(),
                })
            }
        };

        self.entities.insert(id.to_owned(), Arc::clone(&entity));
        self.rebuild_snapshot();
        self.version.send_modify(|v| *v += 1);

        (entity, true)
    }

    /// Look up one entity by resolved id.
    pub fn get(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities.get(id).map(|r| Arc::clone(r.value()))
    }

    /// All entities, ordered by id. Cheap `Arc` clone of the snapshot.
    pub fn all(&self) -> Arc<Vec<Arc<Entity>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Entity>>>> {
        self.snapshot.subscribe()
    }

    /// Current version counter value.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Rebuild the ordered snapshot and notify watchers. Id order keeps
    /// snapshot serialization stable across otherwise-equal states.
    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Entity>> =
            self.entities.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for MergeStore {
    fn default() -> Self {
        Self::new()
    }
}
