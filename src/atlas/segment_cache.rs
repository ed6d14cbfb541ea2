//! SegmentCache - reference-counted segment storage shared by all sessions.
//!
//! Each segment is loaded once from the [`SegmentStore`] and kept while at
//! least one session holds it:
//! - `refcount(segment)` equals the number of sessions holding it
//! - loading is idempotent per `(session, segment)` pair
//! - a segment is evicted when its refcount drops to zero
//!
//! All bookkeeping sits behind one `parking_lot::Mutex`. Segment files are
//! read outside the lock; segments are `Arc`-shared and immutable, so
//! readers never need the lock after `load` returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::ids::{SegmentId, SessionId};
use super::segment::{FloorMap, Segment};
use crate::io::SegmentStore;

/// Rounds of fetch-then-insert before a segment that keeps getting evicted
/// concurrently is given up on for this call.
const MAX_FETCH_ROUNDS: usize = 3;

struct CacheEntry {
    segment: Arc<Segment>,
    refcount: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<SegmentId, CacheEntry>,
    /// Segments each session currently holds.
    holdings: HashMap<SessionId, HashSet<SegmentId>>,
}

impl CacheInner {
    fn release_one(&mut self, session_id: &str, segment_id: &SegmentId) {
        let held = match self.holdings.get_mut(session_id) {
            Some(held) => held.remove(segment_id),
            None => false,
        };
        if !held {
            return;
        }
        if let Some(entry) = self.entries.get_mut(segment_id) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                self.entries.remove(segment_id);
                debug!("Evicted segment {}", segment_id);
            }
        }
    }

    fn drop_empty_holding(&mut self, session_id: &str) {
        if self
            .holdings
            .get(session_id)
            .is_some_and(|held| held.is_empty())
        {
            self.holdings.remove(session_id);
        }
    }
}

/// Process-wide segment cache.
pub struct SegmentCache {
    store: Arc<dyn SegmentStore>,
    inner: Mutex<CacheInner>,
}

impl SegmentCache {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Load `segment_ids` on behalf of `session_id` and merge them.
    ///
    /// Unreadable segments are skipped. The returned map covers the floor
    /// of the first segment that could be loaded; segments of other floors
    /// are still held for the session. Returns `None` when nothing loaded.
    pub fn load(&self, session_id: &str, segment_ids: &[SegmentId]) -> Option<FloorMap> {
        let mut requested: Vec<SegmentId> = Vec::with_capacity(segment_ids.len());
        for id in segment_ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }

        let mut resolved: HashMap<SegmentId, Arc<Segment>> = HashMap::new();
        let mut failed: HashSet<SegmentId> = HashSet::new();
        let mut pending = requested.clone();

        for _ in 0..MAX_FETCH_ROUNDS {
            if pending.is_empty() {
                break;
            }

            let missing: Vec<SegmentId> = {
                let inner = self.inner.lock();
                pending
                    .iter()
                    .filter(|id| !inner.entries.contains_key(*id))
                    .cloned()
                    .collect()
            };

            let mut fetched: HashMap<SegmentId, Arc<Segment>> = HashMap::new();
            for id in missing {
                match self.store.fetch(&id) {
                    Ok(segment) => {
                        debug!("Read segment {} ({} frames)", id, segment.frames.len());
                        fetched.insert(id, Arc::new(segment));
                    }
                    Err(e) => {
                        warn!("Skipping segment {}: {}", id, e);
                        failed.insert(id);
                    }
                }
            }

            let mut inner = self.inner.lock();
            let mut still_pending = Vec::new();
            for id in pending.drain(..) {
                if failed.contains(&id) {
                    continue;
                }
                if !inner.entries.contains_key(&id) {
                    match fetched.remove(&id) {
                        Some(segment) => {
                            inner.entries.insert(
                                id.clone(),
                                CacheEntry {
                                    segment,
                                    refcount: 0,
                                },
                            );
                        }
                        None => {
                            // Evicted by another session since the check above.
                            still_pending.push(id);
                            continue;
                        }
                    }
                }

                let newly_held = inner
                    .holdings
                    .entry(session_id.to_string())
                    .or_default()
                    .insert(id.clone());
                if let Some(entry) = inner.entries.get_mut(&id) {
                    if newly_held {
                        entry.refcount += 1;
                    }
                    resolved.insert(id, Arc::clone(&entry.segment));
                }
            }
            pending = still_pending;
        }

        if !pending.is_empty() {
            warn!("Gave up loading {} segments after repeated eviction", pending.len());
        }

        let mut merged: Option<FloorMap> = None;
        for id in &requested {
            let Some(segment) = resolved.get(id) else {
                continue;
            };
            match merged.as_mut() {
                None => merged = Some(FloorMap::from_segment(segment)),
                Some(map) if map.floor == segment.floor => map.merge(segment),
                Some(_) => {}
            }
        }
        merged
    }

    /// Release `segment_ids` held by `session_id`.
    ///
    /// Ids the session does not hold are ignored, so repeated releases are
    /// harmless.
    pub fn release(&self, session_id: &str, segment_ids: &[SegmentId]) {
        let mut inner = self.inner.lock();
        for id in segment_ids {
            inner.release_one(session_id, id);
        }
        inner.drop_empty_holding(session_id);
    }

    /// Release every segment held by `session_id`.
    pub fn release_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        let held: Vec<SegmentId> = match inner.holdings.get(session_id) {
            Some(held) => held.iter().cloned().collect(),
            None => return,
        };
        for id in &held {
            inner.release_one(session_id, id);
        }
        inner.holdings.remove(session_id);
    }

    /// Number of sessions holding `segment_id` (0 if not cached).
    pub fn refcount(&self, segment_id: &SegmentId) -> usize {
        self.inner
            .lock()
            .entries
            .get(segment_id)
            .map(|e| e.refcount)
            .unwrap_or(0)
    }

    pub fn contains(&self, segment_id: &SegmentId) -> bool {
        self.inner.lock().entries.contains_key(segment_id)
    }

    /// Segments currently held by `session_id`, sorted.
    pub fn held_by(&self, session_id: &str) -> Vec<SegmentId> {
        let inner = self.inner.lock();
        let mut held: Vec<SegmentId> = inner
            .holdings
            .get(session_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    /// Number of cached segments.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
