// store/memory.rs

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::change_source::ChangeSource;
use super::identity::{AuthEvent, IdentityProvider};
use super::object_storage::{ObjectStorage, StorageError};
use super::types::{
    is_server_timestamp, Doc, Filter, QueryDescriptor, SnapshotEvent, SortDir, StoreError,
    Subscription,
};

struct Watcher {
    query: QueryDescriptor,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

/// In-memory change source. Every write or update re-evaluates the registered
/// watchers for that collection and pushes each a fresh full snapshot, the
/// same fan-out shape as a broadcast connection registry. The server clock is
/// strictly monotonic so that rapid successive writes keep a total order.
#[derive(Clone)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<(Uuid, Value)>>>>,
    watchers: Arc<Mutex<Vec<Watcher>>>,
    clock: Arc<Mutex<DateTime<Utc>>>,
    fail_write: Arc<AtomicBool>,
    fail_update: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            watchers: Arc::new(Mutex::new(Vec::new())),
            clock: Arc::new(Mutex::new(Utc::now())),
            fail_write: Arc::new(AtomicBool::new(false)),
            fail_update: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Next server timestamp. Ties with the previous issue are bumped forward
    /// one millisecond so commit order is always observable in `time` fields.
    fn server_now(&self) -> DateTime<Utc> {
        let mut last = lock_ignore_poison(&self.clock);
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::milliseconds(1);
        }
        *last = now;
        now
    }

    fn resolve_server_timestamps(&self, data: &mut Value) {
        if let Value::Object(map) = data {
            let now = self.server_now();
            for value in map.values_mut() {
                if is_server_timestamp(value) {
                    *value = serde_json::to_value(now).unwrap_or(Value::Null);
                }
            }
        }
    }

    fn eval_query(&self, query: &QueryDescriptor) -> Vec<Doc> {
        let collections = read_ignore_poison(&self.collections);
        let mut docs: Vec<Doc> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.filters.iter().all(|f| matches_filter(data, f)))
                    .map(|(id, data)| Doc {
                        id: *id,
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, dir)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_json(
                    a.data.get(field).unwrap_or(&Value::Null),
                    b.data.get(field).unwrap_or(&Value::Null),
                );
                match dir {
                    SortDir::Asc => ord,
                    SortDir::Desc => ord.reverse(),
                }
            });
        }

        docs
    }

    /// Pushes a fresh snapshot to every live watcher of `collection`, pruning
    /// watchers whose receiver has been dropped.
    fn notify(&self, collection: &str) {
        let mut watchers = lock_ignore_poison(&self.watchers);
        watchers.retain(|w| {
            if w.query.collection != collection {
                return !w.tx.is_closed();
            }
            let docs = self.eval_query(&w.query);
            w.tx.send(SnapshotEvent::Snapshot(docs)).is_ok()
        });
    }

    /// Test hook: the next `write` fails with a backend error.
    pub fn fail_next_write(&self) {
        self.fail_write.store(true, AtomicOrdering::SeqCst);
    }

    /// Test hook: the next `update` fails with a backend error.
    pub fn fail_next_update(&self) {
        self.fail_update.store(true, AtomicOrdering::SeqCst);
    }

    /// Test hook: delivers a listen failure to every watcher of `collection`.
    /// The watchers stay registered; later changes resume normal delivery.
    pub fn fail_subscriptions(&self, collection: &str, message: &str) {
        let watchers = lock_ignore_poison(&self.watchers);
        for w in watchers.iter() {
            if w.query.collection == collection {
                let _ = w.tx.send(SnapshotEvent::Error(message.to_string()));
            }
        }
    }
}

impl ChangeSource for MemoryStore {
    fn subscribe(&self, query: QueryDescriptor) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SnapshotEvent::Snapshot(self.eval_query(&query)));
        lock_ignore_poison(&self.watchers).push(Watcher { query, tx });
        rx
    }

    async fn get_once(&self, query: QueryDescriptor) -> Result<Vec<Doc>, StoreError> {
        Ok(self.eval_query(&query))
    }

    async fn write(
        &self,
        collection: &str,
        id: Option<Uuid>,
        mut data: Value,
    ) -> Result<Uuid, StoreError> {
        if self.fail_write.swap(false, AtomicOrdering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }

        let id = id.unwrap_or_else(Uuid::new_v4);
        self.resolve_server_timestamps(&mut data);

        {
            let mut collections = write_ignore_poison(&self.collections);
            let docs = collections.entry(collection.to_string()).or_default();
            match docs.iter_mut().find(|(doc_id, _)| *doc_id == id) {
                Some((_, existing)) => *existing = data,
                None => docs.push((id, data)),
            }
        }

        self.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: Uuid, mut patch: Value) -> Result<(), StoreError> {
        if self.fail_update.swap(false, AtomicOrdering::SeqCst) {
            return Err(StoreError::Backend("injected update failure".into()));
        }

        self.resolve_server_timestamps(&mut patch);

        {
            let mut collections = write_ignore_poison(&self.collections);
            let docs = collections
                .get_mut(collection)
                .ok_or_else(|| StoreError::NotFound(collection.to_string(), id))?;
            let (_, existing) = docs
                .iter_mut()
                .find(|(doc_id, _)| *doc_id == id)
                .ok_or_else(|| StoreError::NotFound(collection.to_string(), id))?;

            match (existing, patch) {
                (Value::Object(existing), Value::Object(patch)) => {
                    for (key, value) in patch {
                        existing.insert(key, value);
                    }
                }
                (existing, patch) => *existing = patch,
            }
        }

        self.notify(collection);
        Ok(())
    }
}

fn matches_filter(data: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(field, expected) => data.get(field) == Some(expected),
        Filter::ArrayContains(field, expected) => data
            .get(field)
            .and_then(Value::as_array)
            .map(|items| items.contains(expected))
            .unwrap_or(false),
    }
}

/// Value comparison for order-by clauses. Timestamps are compared as
/// instants, not strings; RFC 3339 text with differing fractional precision
/// does not sort lexicographically.
fn compare_json(a: &Value, b: &Value) -> Ordering {
    if let (Value::String(a), Value::String(b)) = (a, b) {
        if let (Ok(a), Ok(b)) = (
            DateTime::parse_from_rfc3339(a),
            DateTime::parse_from_rfc3339(b),
        ) {
            return a.cmp(&b);
        }
    }
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// In-memory object storage. Uploads land in a map keyed by object key and
/// resolve to a `memory://` URL. Progress is emitted per chunk.
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, Bytes>>,
    fail_next: AtomicBool,
}

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Test hook: the next `put` fails with a transport error.
    pub fn fail_next_upload(&self) {
        self.fail_next.store(true, AtomicOrdering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        read_ignore_poison(&self.objects).get(key).cloned()
    }
}

impl ObjectStorage for MemoryObjectStorage {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        progress: watch::Sender<u8>,
    ) -> Result<String, StorageError> {
        if self.fail_next.swap(false, AtomicOrdering::SeqCst) {
            return Err(StorageError::Transport("injected upload failure".into()));
        }

        let total = data.len();
        let mut sent = 0usize;
        while sent < total {
            sent += UPLOAD_CHUNK_BYTES.min(total - sent);
            let pct = (sent * 100 / total) as u8;
            let _ = progress.send(pct);
            tokio::task::yield_now().await;
        }
        if total == 0 {
            let _ = progress.send(100);
        }

        write_ignore_poison(&self.objects).insert(key.to_string(), data);
        Ok(format!("memory://{key}"))
    }
}

/// In-memory identity provider. New subscribers immediately receive the
/// current auth state, then every later transition.
#[derive(Default)]
pub struct MemoryIdentity {
    current: Mutex<Option<Uuid>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AuthEvent>>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: Uuid) {
        *lock_ignore_poison(&self.current) = Some(user_id);
        self.broadcast(AuthEvent::SignedIn(user_id));
    }

    pub fn sign_out(&self) {
        *lock_ignore_poison(&self.current) = None;
        self.broadcast(AuthEvent::SignedOut);
    }

    fn broadcast(&self, event: AuthEvent) {
        lock_ignore_poison(&self.subscribers).retain(|tx| tx.send(event).is_ok());
    }
}

impl IdentityProvider for MemoryIdentity {
    fn subscribe_auth(&self) -> mpsc::UnboundedReceiver<AuthEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = *lock_ignore_poison(&self.current);
        let _ = tx.send(match current {
            Some(id) => AuthEvent::SignedIn(id),
            None => AuthEvent::SignedOut,
        });
        lock_ignore_poison(&self.subscribers).push(tx);
        rx
    }
}

// A poisoned lock means a holder panicked mid-section; the stored state is
// still the last consistent snapshot, which is exactly what callers want.
fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_ignore_poison<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_ignore_poison<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
