//! In-process document store for tests and offline use

use async_trait::async_trait;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::{Document, DocumentStore, FieldUpdate, Fields, Query};
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::subscription::Subscription;

const CHANGE_CAPACITY: usize = 256;
const DEFAULT_BUFFER: usize = 16;

#[derive(Debug, Clone)]
enum Change {
    /// A collection was written to
    Collection(String),

    /// Live queries on the collection should report a failure
    Fault(String, String),
}

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    data: Fields,
}

type Collections = HashMap<String, HashMap<String, Stored>>;

/// Document store that keeps collections in memory.
///
/// Live queries re-evaluate on every write to their collection and push a
/// snapshot only when the result changed. Results keep insertion order
/// unless the query orders them.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<Change>,
    next_seq: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    buffer: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
            next_seq: Arc::new(AtomicU64::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Set how many undelivered snapshots each live query buffers
    pub fn with_snapshot_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Make every subsequent call fail as if the backend were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Push a failure into every live query on `collection`
    pub fn inject_fault(&self, collection: &str, message: &str) {
        let _ = self
            .changes
            .send(Change::Fault(collection.to_string(), message.to_string()));
    }

    /// Number of read calls (get, query, watch) made so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls (upsert, add, update, delete) made so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::database("backend unavailable"));
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    fn begin_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn notify(&self, collection: &str) {
        trace!("Collection {} changed", collection);
        // No receivers just means nobody is watching.
        let _ = self.changes.send(Change::Collection(collection.to_string()));
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let collections = self.read_lock();
        let mut rows: Vec<(u64, Document)> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, stored)| (stored.seq, Document::new(id, stored.data.clone())))
                    .filter(|(_, doc)| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        rows.sort_by_key(|(seq, _)| *seq);
        let mut docs: Vec<Document> = rows.into_iter().map(|(_, doc)| doc).collect();
        query.sort(&mut docs);
        docs
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn authorized(&self, _session: &Session) -> Arc<dyn DocumentStore> {
        Arc::new(self.clone())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.begin_read()?;
        let collections = self.read_lock();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|stored| Document::new(id, stored.data.clone())))
    }

    async fn upsert(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        self.begin_write()?;
        let seq = self.next_seq();
        {
            let mut collections = self.write_lock();
            let docs = collections.entry(collection.to_string()).or_default();
            match docs.get_mut(id) {
                Some(stored) => stored.data.extend(data),
                None => {
                    docs.insert(id.to_string(), Stored { seq, data });
                }
            }
        }
        debug!("Upserted {}/{}", collection, id);
        self.notify(collection);
        Ok(())
    }

    async fn add(&self, collection: &str, mut data: Fields) -> Result<Document> {
        self.begin_write()?;
        data.remove("id");
        let id = Uuid::new_v4().to_string();
        let seq = self.next_seq();
        self.write_lock()
            .entry(collection.to_string())
            .or_default()
            .insert(
                id.clone(),
                Stored {
                    seq,
                    data: data.clone(),
                },
            );
        debug!("Added {}/{}", collection, id);
        self.notify(collection);
        Ok(Document::new(&id, data))
    }

    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        self.begin_write()?;
        {
            let mut collections = self.write_lock();
            let stored = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
            for update in &updates {
                update.apply(&mut stored.data);
            }
        }
        debug!("Updated {}/{} ({} fields)", collection, id, updates.len());
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.begin_write()?;
        let removed = self
            .write_lock()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if !removed {
            return Err(Error::NotFound(format!("{}/{}", collection, id)));
        }
        debug!("Deleted {}/{}", collection, id);
        self.notify(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.begin_read()?;
        Ok(self.snapshot(query))
    }

    async fn watch(&self, query: Query) -> Result<Subscription<Document>> {
        self.begin_read()?;
        let mut changes = self.changes.subscribe();
        let (tx, rx) = Subscription::channel(self.buffer);
        let store = self.clone();
        let mut last = Arc::new(self.snapshot(&query));

        let task = tokio::spawn(async move {
            if tx.send(Ok(last.clone())).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(Change::Collection(name)) if name != query.collection => continue,
                    Ok(Change::Fault(name, message)) => {
                        if name == query.collection {
                            warn!("Live query on {} failed: {}", name, message);
                            if tx.send(Err(Error::database(message))).await.is_err() {
                                break;
                            }
                        }
                        continue;
                    }
                    Ok(Change::Collection(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        trace!("Live query lagged by {} changes, re-reading", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }

                let next = store.snapshot(&query);
                if next == *last {
                    continue;
                }
                last = Arc::new(next);
                if tx.send(Ok(last.clone())).await.is_err() {
                    break;
                }
            }
            trace!("Live query on {} finished", query.collection);
        });

        Ok(Subscription::new(rx, task))
    }
}
