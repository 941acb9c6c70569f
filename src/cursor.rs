// src/cursor.rs
//! Per-source cursor persistence.
//!
//! The on-disk document is a flat JSON object, `{"<source>": "<fingerprint>" | null}`.
//! Keys this build does not know about are carried along untouched so an
//! older/newer binary can share the file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::error::{RelayError, Result};
use crate::feed::Fingerprint;

pub const DEFAULT_CURSOR_PATH: &str = "data/last_sent.json";

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last successfully posted fingerprint, `None` if never set.
    fn get(&self, source_id: &str) -> Option<Fingerprint>;

    /// Advance the cursor. Returns only after the value is durable.
    ///
    /// On error the in-memory value has still been advanced.
    async fn set(&self, source_id: &str, fingerprint: &Fingerprint) -> Result<()>;

    /// All cursors currently set.
    fn snapshot(&self) -> BTreeMap<String, Fingerprint>;
}

/// File-backed store. Every `set` rewrites the whole document atomically.
#[derive(Clone)]
pub struct JsonCursorStore {
    path: PathBuf,
    state: Arc<Mutex<Map<String, Value>>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonCursorStore {
    /// Open the store. A missing or unreadable file starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_document(&path).await;
        tracing::info!(
            path = %path.display(),
            cursors = state.values().filter(|v| v.is_string()).count(),
            "cursor store opened"
        );
        Self {
            path,
            state: Arc::new(Mutex::new(state)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        // A poisoned map is still a valid map.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl CursorStore for JsonCursorStore {
    fn get(&self, source_id: &str) -> Option<Fingerprint> {
        self.lock_state()
            .get(source_id)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(Fingerprint::from_raw)
    }

    async fn set(&self, source_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        self.lock_state().insert(
            source_id.to_string(),
            Value::String(fingerprint.as_str().to_string()),
        );

        // Run the write in its own task: if the caller is cancelled mid-await
        // the file is still either fully old or fully new.
        let store = self.clone();
        let task = tokio::spawn(async move {
            let _guard = store.write_lock.lock().await;
            let bytes = {
                let doc = store.lock_state();
                serde_json::to_vec_pretty(&*doc)?
            };
            write_atomic(&store.path, &bytes).await?;
            Ok::<(), RelayError>(())
        });

        let display = self.path.display().to_string();
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::store_write(display, e)),
            Err(join) => Err(RelayError::store_write(display, join)),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, Fingerprint> {
        self.lock_state()
            .iter()
            .filter_map(|(k, v)| {
                v.as_str()
                    .filter(|s| !s.is_empty())
                    .map(|s| (k.clone(), Fingerprint::from_raw(s)))
            })
            .collect()
    }
}

async fn read_document(path: &Path) -> Map<String, Value> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read cursor file; starting empty");
            return Map::new();
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(path = %path.display(), kind = ?other, "cursor file is not a JSON object; starting empty");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cursor file is corrupt; starting empty");
            Map::new()
        }
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    inner: Mutex<HashMap<String, Fingerprint>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Fingerprint)>,
    {
        Self {
            inner: Mutex::new(entries.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make every subsequent `set` report a write failure.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `set` calls seen, successful or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    fn get(&self, source_id: &str) -> Option<Fingerprint> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(source_id)
            .cloned()
    }

    async fn set(&self, source_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(source_id.to_string(), fingerprint.clone());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::store_write("memory", "simulated write failure"));
        }
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, Fingerprint> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
