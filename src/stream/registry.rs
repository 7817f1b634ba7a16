//! Open stream connections and summary counters.
//!
//! # Responsibilities
//! - Generate unique connection IDs for logging
//! - Register a connection on open, deregister when its guard drops
//! - Count opened/closed connections, batches, records and errors
//!
//! The map is one coarse lock touched only on register, deregister and
//! listing. Counters are atomics so the tick loop never takes the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::observability::metrics;
use crate::stream::envelope::StreamKind;

/// Relaxed ordering is enough; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub kind: StreamKind,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    closed: AtomicU64,
    batches: AtomicU64,
    records: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the registry counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub active: usize,
    pub opened: u64,
    pub closed: u64,
    pub batches: u64,
    pub records: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionInfo>>,
    counters: Counters,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionInfo>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new connection. Returns a guard that deregisters on drop.
    pub fn register(self: &Arc<Self>, kind: StreamKind) -> StreamGuard {
        let info = ConnectionInfo {
            id: ConnectionId::new(),
            kind,
            opened_at: Utc::now(),
        };
        let id = info.id;
        self.lock().insert(id, info);
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        metrics::record_stream_opened(kind);
        tracing::debug!(connection_id = %id, stream = %kind, "Stream registered");

        StreamGuard {
            registry: Arc::clone(self),
            id,
            kind,
        }
    }

    fn deregister(&self, id: ConnectionId, kind: StreamKind) {
        if self.lock().remove(&id).is_some() {
            self.counters.closed.fetch_add(1, Ordering::Relaxed);
            metrics::record_stream_closed(kind);
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of open connections, oldest first.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<ConnectionInfo> = self.lock().values().cloned().collect();
        list.sort_by_key(|c| c.id.as_u64());
        list
    }

    pub fn record_batch(&self, kind: StreamKind, records: usize) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters.records.fetch_add(records as u64, Ordering::Relaxed);
        metrics::record_stream_batch(kind, records);
    }

    pub fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            active: self.active_count(),
            opened: self.counters.opened.load(Ordering::Relaxed),
            closed: self.counters.closed.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            records: self.counters.records.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

/// Keeps a connection registered for its lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    registry: Arc<StreamRegistry>,
    id: ConnectionId,
    kind: StreamKind,
}

impl StreamGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id, self.kind);
        tracing::debug!(connection_id = %self.id, "Stream deregistered");
    }
}
