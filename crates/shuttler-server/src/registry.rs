//! Registry of authenticated connections.
//!
//! Maps a server-issued connection id to the handle used to push messages
//! to that connection and the token it authenticated with. Ids start at 1,
//! strictly increase and are never reused; 0 means "not registered".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Connection id that is never issued.
pub const UNREGISTERED: u64 = 0;

/// Push handle into a live session.
///
/// Messages sent through the handle are written to the peer by the session
/// that owns the receiving end.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the owning session drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message for the peer without waiting. Returns `false` when the
    /// session is gone or its queue is full.
    pub fn try_push(&self, data: Vec<u8>) -> bool {
        self.tx.try_send(data).is_ok()
    }
}

/// A registered, authenticated connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: u64,
    pub handle: ConnectionHandle,
    /// Token the connection authenticated with.
    pub token: String,
    pub registered_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    /// Last id handed out.
    last_id: u64,
    records: HashMap<u64, ConnectionRecord>,
}

impl Inner {
    fn insert(&mut self, handle: ConnectionHandle, token: String) -> u64 {
        self.last_id += 1;
        let id = self.last_id;
        self.records.insert(
            id,
            ConnectionRecord {
                id,
                handle,
                token,
                registered_at: Instant::now(),
            },
        );
        id
    }
}

/// Process-wide registry of authenticated connections.
///
/// Every read and write goes through one mutex, so enumeration never sees
/// a record half inserted or half removed. Critical sections are O(1) map
/// operations (enumeration aside) and never await.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection and return its new id.
    pub fn insert(&self, handle: ConnectionHandle, token: String) -> u64 {
        let (id, total) = {
            let mut inner = self.lock();
            let id = inner.insert(handle, token);
            (id, inner.records.len())
        };
        info!(conn_id = id, total, "connection registered");
        id
    }

    /// Swap the record at `previous` for a new one under a single lock.
    ///
    /// Used when an already registered session authenticates again. The new
    /// record always gets a fresh id.
    pub fn replace(&self, previous: u64, handle: ConnectionHandle, token: String) -> u64 {
        let id = {
            let mut inner = self.lock();
            inner.records.remove(&previous);
            inner.insert(handle, token)
        };
        info!(previous, conn_id = id, "connection re-registered");
        id
    }

    /// Remove a connection. Absent ids, including [`UNREGISTERED`], are a no-op.
    ///
    /// Returns whether a record was removed. The registry's copy of the
    /// handle is dropped here.
    pub fn remove(&self, id: u64) -> bool {
        if id == UNREGISTERED {
            return false;
        }
        let removed = self.lock().records.remove(&id);
        match removed {
            Some(_) => {
                debug!(conn_id = id, "connection deregistered");
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, id: u64) -> Option<ConnectionRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Snapshot of all registered connections, ordered by id.
    pub fn enumerate(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> = self.lock().records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A session's membership in the registry.
///
/// Holds the id bound to the session (or [`UNREGISTERED`]) and removes it
/// from the registry when dropped, whichever way the session ends.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl Registration {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            id: UNREGISTERED,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.id != UNREGISTERED
    }

    /// Register the session, replacing any record it already owns.
    pub fn bind(&mut self, handle: ConnectionHandle, token: String) -> u64 {
        self.id = if self.is_registered() {
            self.registry.replace(self.id, handle, token)
        } else {
            self.registry.insert(handle, token)
        };
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        self.id = UNREGISTERED;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::channel(1).0
    }

    #[test]
    fn insert_then_lookup() {
        let registry = ConnectionRegistry::new();
        let id = registry.insert(handle(), "tok-A".into());
        assert_eq!(id, 1);
        let record = registry.lookup(id).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.token, "tok-A");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let registry = ConnectionRegistry::new();
        let a = registry.insert(handle(), "a".into());
        assert!(registry.remove(a));
        let b = registry.insert(handle(), "b".into());
        assert!(b > a);
        assert!(registry.lookup(a).is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let keep = registry.insert(handle(), "keep".into());
        let id = registry.insert(handle(), "gone".into());
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(keep).is_some());
    }

    #[test]
    fn remove_unregistered_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.insert(handle(), "a".into());
        assert!(!registry.remove(UNREGISTERED));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_releases_handle() {
        let registry = ConnectionRegistry::new();
        let (h, mut rx) = ConnectionHandle::channel(4);
        let id = registry.insert(h, "a".into());
        assert!(registry.lookup(id).unwrap().handle.try_push(b"hi".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), b"hi".to_vec());

        registry.remove(id);
        // The registry held the last sender; the receiver now sees closure.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn replace_swaps_record() {
        let registry = ConnectionRegistry::new();
        let old = registry.insert(handle(), "old".into());
        let new = registry.replace(old, handle(), "new".into());
        assert!(new > old);
        assert!(registry.lookup(old).is_none());
        assert_eq!(registry.lookup(new).unwrap().token, "new");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn enumerate_is_ordered_snapshot() {
        let registry = ConnectionRegistry::new();
        for token in ["a", "b", "c"] {
            registry.insert(handle(), token.into());
        }
        registry.remove(2);
        let tokens: Vec<String> = registry.enumerate().into_iter().map(|r| r.token).collect();
        assert_eq!(tokens, vec!["a", "c"]);
    }

    #[test]
    fn registration_binds_and_cleans_up() {
        let registry = Arc::new(ConnectionRegistry::new());
        {
            let mut reg = Registration::new(registry.clone());
            assert!(!reg.is_registered());
            let first = reg.bind(handle(), "a".into());
            let second = reg.bind(handle(), "b".into());
            assert!(second > first);
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.lookup(reg.id()).unwrap().token, "b");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn unbound_registration_drop_is_harmless() {
        let registry = Arc::new(ConnectionRegistry::new());
        let other = registry.insert(handle(), "other".into());
        drop(Registration::new(registry.clone()));
        assert!(registry.lookup(other).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_get_distinct_ids() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..200 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.insert(handle(), format!("tok-{i}"))
            }));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            assert!(ids.insert(task.await.unwrap()));
        }
        assert_eq!(ids.len(), 200);
        assert_eq!(registry.len(), 200);
        assert!(ids.iter().all(|id| *id >= 1 && *id <= 200));

        for record in registry.enumerate() {
            let i: usize = record.token.trim_start_matches("tok-").parse().unwrap();
            assert!(i < 200);
            assert_eq!(registry.lookup(record.id).unwrap().token, record.token);
        }
    }
}
