// ── Counter persistence ──
//
// The accounting engine survives process restarts by round-tripping
// per-counter state through a `CounterStore`. The host supplies the
// implementation; `JsonCounterStore` is the built-in file-backed one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Persisted state for one (direction, window) counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Accumulated bytes within the window.
    pub value: f64,
    /// Date string identifying the window this value belongs to.
    pub window_key: String,
    /// Timestamp of the last integrated sample.
    pub last_sample_time: Option<DateTime<Utc>>,
}

/// Durable storage for counter state.
///
/// Implementations guarantee at-least survive-process-restart
/// durability. `save` is invoked on every accepted counter update, so
/// it should be cheap.
pub trait CounterStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CounterSnapshot>, CoreError>;
    fn save(&self, key: &str, snapshot: &CounterSnapshot) -> Result<(), CoreError>;
}

// ── In-memory store ─────────────────────────────────────────────────

/// Volatile store for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterSnapshot>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn load(&self, key: &str) -> Result<Option<CounterSnapshot>, CoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, key: &str, snapshot: &CounterSnapshot) -> Result<(), CoreError> {
        self.lock().insert(key.to_owned(), snapshot.clone());
        Ok(())
    }
}

impl MemoryCounterStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CounterSnapshot>> {
        // A poisoned lock only means a writer panicked mid-insert; the
        // map itself is still usable.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── File-backed store ───────────────────────────────────────────────

/// All counters in one JSON file, rewritten atomically on save.
pub struct JsonCounterStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, CounterSnapshot>>,
}

impl JsonCounterStore {
    /// Open (or create) the store at `path`. An unreadable or corrupt
    /// file starts empty rather than failing -- stale usage data is
    /// recoverable, a refusing monitor is not.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "counter store file corrupt, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CounterSnapshot>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn flush(&self, entries: &HashMap<String, CounterSnapshot>) -> Result<(), CoreError> {
        let body = serde_json::to_string_pretty(entries).map_err(|e| CoreError::Persistence {
            message: format!("serialize counter state: {e}"),
        })?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(|e| CoreError::Persistence {
            message: format!("write {}: {e}", tmp.display()),
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CoreError::Persistence {
            message: format!("rename {}: {e}", self.path.display()),
        })
    }
}

impl CounterStore for JsonCounterStore {
    fn load(&self, key: &str) -> Result<Option<CounterSnapshot>, CoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, key: &str, snapshot: &CounterSnapshot) -> Result<(), CoreError> {
        let mut entries = self.lock();
        entries.insert(key.to_owned(), snapshot.clone());
        self.flush(&entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(value: f64) -> CounterSnapshot {
        CounterSnapshot {
            value,
            window_key: "2024-05-01".into(),
            last_sample_time: Some(Utc::now()),
        }
    }

    #[test]
    fn json_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let store = JsonCounterStore::open(&path);
        store.save("down_daily", &snapshot(2000.0)).unwrap();
        store.save("up_daily", &snapshot(512.5)).unwrap();

        // Simulated restart.
        let reopened = JsonCounterStore::open(&path);
        let restored = reopened.load("down_daily").unwrap().unwrap();
        assert_eq!(restored.value, 2000.0);
        assert_eq!(restored.window_key, "2024-05-01");
        assert!(reopened.load("missing").unwrap().is_none());
    }

    #[test]
    fn corrupt_store_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonCounterStore::open(&path);
        assert!(store.load("down_daily").unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryCounterStore::new();
        store.save("up_billing_month", &snapshot(1.0)).unwrap();
        assert_eq!(store.load("up_billing_month").unwrap().unwrap().value, 1.0);
    }
}
