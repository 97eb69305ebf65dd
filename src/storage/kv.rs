use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::{Cas, DocumentStore, PushKeyGenerator, StoreError, StoreResult, Versioned, Write};

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PersistenceSettings {
    /// Enable snapshotting to `<dir>/snapshot.bin`
    #[serde(default)]
    pub enabled: bool,
    pub dir: PathBuf,
    /// Interval in milliseconds between snapshots
    #[serde(default = "PersistenceSettings::default_interval_ms")]
    pub interval_ms: u64,
}

impl PersistenceSettings {
    fn default_interval_ms() -> u64 { 5_000 }

    pub fn at(dir: impl Into<PathBuf>, interval_ms: u64) -> Self {
        Self { enabled: interval_ms > 0, dir: dir.into(), interval_ms }
    }

    pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms) }
}

#[derive(Clone, Debug)]
struct Doc {
    value: JsonValue,
    version: u64,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Doc>,
    /// Last version handed out; shared by all keys so a deleted and re-created
    /// key never reuses a version.
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn put(&mut self, key: String, value: JsonValue) {
        let version = self.tick();
        self.docs.insert(key, Doc { value, version });
    }

    fn children(&self, prefix: &str) -> Vec<(String, JsonValue)> {
        let start = format!("{}/", prefix.trim_end_matches('/'));
        self.docs
            .range(start.clone()..)
            .take_while(|(k, _)| k.starts_with(&start))
            .map(|(k, d)| (k.clone(), d.value.clone()))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapDoc { key: String, json: Vec<u8>, version: u64 }

#[derive(Serialize, Deserialize)]
struct Snapshot { format: u32, created_ms: i64, clock: u64, docs: Vec<SnapDoc> }

/// In-process document store: an ordered map behind a reader/writer lock,
/// optionally snapshotted to disk.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    push_keys: Arc<PushKeyGenerator>,
    persistence: Option<PersistenceSettings>,
    dirty: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    /// A store that lives only in memory.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            push_keys: Arc::new(PushKeyGenerator::new()),
            persistence: None,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a store with persistence; loads an existing snapshot if present.
    pub fn open(settings: PersistenceSettings) -> StoreResult<Self> {
        std::fs::create_dir_all(&settings.dir).map_err(|e| StoreError::Io(format!("{}: {}", settings.dir.display(), e)))?;
        let mut s = Self::new();
        let enabled = settings.enabled;
        s.persistence = Some(settings);
        if enabled {
            s.load_snapshot()?;
        }
        Ok(s)
    }

    pub fn persistence(&self) -> Option<&PersistenceSettings> { self.persistence.as_ref() }

    fn snapshot_path(&self) -> Option<PathBuf> {
        self.persistence.as_ref().filter(|p| p.enabled).map(|p| p.dir.join("snapshot.bin"))
    }

    pub fn len(&self) -> usize { self.inner.read().docs.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Write the snapshot if anything changed since the last one. Returns
    /// whether a snapshot was written.
    pub fn save_snapshot(&self) -> StoreResult<bool> {
        let Some(path) = self.snapshot_path() else { return Ok(false); };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let created_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let snap = {
            let r = self.inner.read();
            let mut docs = Vec::with_capacity(r.docs.len());
            for (k, d) in r.docs.iter() {
                let json = serde_json::to_vec(&d.value).map_err(|e| StoreError::Encoding(e.to_string()))?;
                docs.push(SnapDoc { key: k.clone(), json, version: d.version });
            }
            Snapshot { format: 1, created_ms, clock: r.clock, docs }
        };
        let bytes = bincode::serialize(&snap).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let tmp = path.with_extension("bin.tmp");
        let write = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, &path));
        if let Err(e) = write {
            // keep the store marked dirty so the next tick retries
            self.dirty.store(true, Ordering::Release);
            return Err(StoreError::Io(format!("{}: {}", path.display(), e)));
        }
        debug!(target: "service_hours::store", docs = snap.docs.len(), "snapshot written");
        Ok(true)
    }

    fn load_snapshot(&self) -> StoreResult<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()); };
        if !path.exists() { return Ok(()); }
        let bytes = std::fs::read(&path).map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        let snap: Snapshot = bincode::deserialize(&bytes).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let mut w = self.inner.write();
        w.docs.clear();
        for d in snap.docs.into_iter() {
            let value: JsonValue = serde_json::from_slice(&d.json).map_err(|e| StoreError::Encoding(e.to_string()))?;
            w.docs.insert(d.key, Doc { value, version: d.version });
        }
        w.clock = snap.clock;
        info!(target: "service_hours::store", docs = w.docs.len(), path = %path.display(), "snapshot loaded");
        Ok(())
    }

    fn mark_dirty(&self) { self.dirty.store(true, Ordering::Release); }
}

impl DocumentStore for MemoryStore {
    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let r = self.inner.read();
        Ok(r.docs.get(key).map(|d| Versioned { value: d.value.clone(), version: d.version }))
    }

    fn set(&self, key: &str, value: JsonValue) -> StoreResult<()> {
        self.inner.write().put(key.to_string(), value);
        self.mark_dirty();
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let removed = self.inner.write().docs.remove(key).is_some();
        if removed { self.mark_dirty(); }
        Ok(removed)
    }

    fn compare_and_swap_many(&self, ops: Vec<Cas>) -> StoreResult<bool> {
        let mut w = self.inner.write();
        if ops.iter().any(|op| w.docs.get(&op.key).map(|d| d.version) != op.expected) {
            return Ok(false);
        }
        for op in ops {
            match op.new {
                Some(value) => w.put(op.key, value),
                None => { w.docs.remove(&op.key); }
            }
        }
        drop(w);
        self.mark_dirty();
        Ok(true)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<(String, JsonValue)>> {
        Ok(self.inner.read().children(prefix))
    }

    fn push_key(&self) -> String { self.push_keys.next_key() }

    fn update_children(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(Vec<(String, JsonValue)>) -> Vec<Write>,
    ) -> StoreResult<usize> {
        let mut w = self.inner.write();
        let writes = f(w.children(prefix));
        let n = writes.len();
        for op in writes {
            match op {
                Write::Set { key, value } => w.put(key, value),
                Write::Delete { key } => { w.docs.remove(&key); }
            }
        }
        drop(w);
        if n > 0 { self.mark_dirty(); }
        Ok(n)
    }
}
