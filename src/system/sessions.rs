//! Session registry.
//!
//! Each client session is one [`Session`] behind an `Arc`:
//! - requests of one session are serialized by its `Mutex`
//! - frames are stamped with an arrival number before waiting on the lock,
//!   so a frame overtaken by a later one can be dropped
//! - `terminated` is flipped without the lock, letting an in-flight frame
//!   notice the session is gone
//! - segments are held in the cache under `cache_key`, unique per session
//!   object, so a client reconnecting under the same id never shares
//!   holdings with the session it replaced

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::atlas::SessionId;
use crate::navigation::DestinationPaths;
use crate::tracking::Tracker;

/// Mutable state of one session.
#[derive(Debug)]
pub struct SessionInner {
    pub tracker: Tracker,
    pub destination: Option<DestinationPaths>,
    /// Arrival number of the last frame applied to `tracker`.
    pub last_applied: u64,
}

/// Source of per-session cache key generations.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// One client session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Holder key of this session's segments in the cache.
    pub cache_key: String,
    arrivals: AtomicU64,
    terminated: AtomicBool,
    pub inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, implicit_num: usize) -> Self {
        let id = id.into();
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        Self {
            cache_key: format!("{}#{}", id, generation),
            id,
            arrivals: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                tracker: Tracker::new(implicit_num),
                destination: None,
                last_applied: 0,
            }),
        }
    }

    /// Stamp an incoming frame. Numbers start at 1.
    pub fn next_arrival(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// All live sessions, keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    implicit_num: usize,
}

impl SessionRegistry {
    /// `implicit_num` is the temporal window capacity of new sessions.
    pub fn new(implicit_num: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            implicit_num,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                info!("Session {} created", id);
                Arc::new(Session::new(id, self.implicit_num))
            })
            .clone()
    }

    /// Remove `id` from the registry and mark it terminated.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().remove(id)?;
        session.mark_terminated();
        info!("Session {} terminated", id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_reuses_session() {
        let registry = SessionRegistry::new(5);
        let a = registry.get_or_create("s1");
        let b = registry.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_recreated_session_gets_new_cache_key() {
        let registry = SessionRegistry::new(5);
        let old = registry.get_or_create("s1");
        registry.remove("s1");
        let new = registry.get_or_create("s1");
        assert_eq!(old.id, new.id);
        assert_ne!(old.cache_key, new.cache_key);
        assert!(new.cache_key.starts_with("s1#"));
    }

    #[test]
    fn test_arrivals_are_increasing() {
        let session = Session::new("s1", 5);
        assert_eq!(session.next_arrival(), 1);
        assert_eq!(session.next_arrival(), 2);
        assert_eq!(session.inner.lock().last_applied, 0);
    }

    #[test]
    fn test_remove_marks_terminated() {
        let registry = SessionRegistry::new(5);
        let session = registry.get_or_create("s1");
        assert!(!session.is_terminated());

        let removed = registry.remove("s1").unwrap();
        assert!(Arc::ptr_eq(&session, &removed));
        assert!(session.is_terminated());
        assert!(registry.is_empty());
        assert!(registry.remove("s1").is_none());
    }
}
