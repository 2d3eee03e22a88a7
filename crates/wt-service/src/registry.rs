//! Concurrent store of active online sessions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use wt_optimizer::OnlineOptimizer;
use wt_types::{SessionError, SessionId, WtResult};

/// One registered session.
///
/// The tokio mutex serializes every mutation of the optimizer; waiters are
/// served in FIFO order. The tombstone is set once the session is deleted
/// so that work finishing afterwards is dropped instead of reported.
pub struct SessionSlot {
    id: SessionId,
    signal_ids: Vec<String>,
    created_at: DateTime<Utc>,
    optimizer: Arc<AsyncMutex<OnlineOptimizer>>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("id", &self.id)
            .field("signal_ids", &self.signal_ids)
            .field("created_at", &self.created_at)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

impl SessionSlot {
    fn new(id: SessionId, optimizer: OnlineOptimizer) -> Self {
        let signal_ids = optimizer.space().signal_ids().map(str::to_string).collect();
        Self {
            id,
            signal_ids,
            created_at: Utc::now(),
            optimizer: Arc::new(AsyncMutex::new(optimizer)),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn signal_ids(&self) -> &[String] {
        &self.signal_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wait for exclusive access. The guard can be moved onto a worker
    /// thread and keeps the session locked until it is dropped there.
    pub async fn lock(&self) -> OwnedMutexGuard<OnlineOptimizer> {
        Arc::clone(&self.optimizer).lock_owned().await
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// `NotFound` once the tombstone is set.
    pub fn ensure_live(&self) -> WtResult<()> {
        if self.is_deleted() {
            return Err(not_found(self.id).into());
        }
        Ok(())
    }
}

pub(crate) fn not_found(id: SessionId) -> SessionError {
    SessionError::NotFound {
        session_id: id.to_string(),
    }
}

/// Session id to slot map with a hard capacity.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    max_sessions: usize,
    create_lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            create_lock: Mutex::new(()),
        }
    }

    /// Register a fully constructed optimizer under a fresh id.
    pub fn insert(&self, optimizer: OnlineOptimizer) -> WtResult<SessionId> {
        // Capacity check and insert must not interleave with another create.
        let _guard = self.create_lock.lock();
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityReached {
                limit: self.max_sessions,
            }
            .into());
        }

        let id = Uuid::new_v4();
        let slot = SessionSlot::new(id, optimizer);
        info!(session = %id, signals = slot.signal_ids.len(), "session created");
        self.sessions.insert(id, Arc::new(slot));
        Ok(id)
    }

    pub fn get(&self, id: &SessionId) -> WtResult<Arc<SessionSlot>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| not_found(*id).into())
    }

    /// Unregister and tombstone the slot. In-flight holders of the slot
    /// observe the tombstone when their work completes.
    pub fn remove(&self, id: &SessionId) -> WtResult<Arc<SessionSlot>> {
        let (_, slot) = self.sessions.remove(id).ok_or_else(|| not_found(*id))?;
        slot.mark_deleted();
        info!(session = %id, "session deleted");
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time copy of all slots, oldest first.
    pub fn slots(&self) -> Vec<Arc<SessionSlot>> {
        let mut slots: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        slots.sort_by_key(|slot| slot.created_at);
        slots
    }
}
