use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare state directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record `{key}`: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to decode record `{key}`: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value persistence for named JSON records.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn put(&self, key: &str, record: &Value) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, record: &Value) -> Result<(), StoreError> {
        (**self).put(key, record)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

pub fn encode<T: Serialize>(key: &str, record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Fetch and decode a typed record.
pub fn load<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    store
        .get(key)?
        .map(|value| {
            serde_json::from_value(value).map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

pub fn save<T: Serialize>(store: &dyn Store, key: &str, record: &T) -> Result<(), StoreError> {
    store.put(key, &encode(key, record)?)
}

/// In-process store. Clones share the same records, so one handle can be given to the
/// journal worker while another stays with the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, Value>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched back, to simulate an unavailable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is set to fail".into()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, record: &Value) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()?.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()?.remove(key);
        Ok(())
    }
}

/// SQLite-backed store keeping every record as a JSON text row.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(SqliteStore { conn })
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let text: Option<String> = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        text.map(|text| {
            serde_json::from_str(&text).map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn put(&self, key: &str, record: &Value) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, record.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM records WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// Write-behind wrapper: checkpoints are queued and every mutation retries whatever is
/// still pending, so a failing backend never costs in-memory progress.
pub struct WriteBehind {
    store: Box<dyn Store>,
    pending: BTreeMap<String, Value>,
}

impl WriteBehind {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        load(self.store.as_ref(), key)
    }

    /// Queue `record` under `key`, replacing any older queued version. Nothing is written yet.
    pub fn stage<T: Serialize>(&mut self, key: &str, record: &T) -> Result<(), StoreError> {
        let value = encode(key, record)?;
        self.pending.insert(key.to_string(), value);
        Ok(())
    }

    /// [`stage`](Self::stage) then [`flush`](Self::flush).
    pub fn checkpoint<T: Serialize>(&mut self, key: &str, record: &T) -> Result<(), StoreError> {
        self.stage(key, record)?;
        self.flush()
    }

    /// Attempt every pending write; successful ones leave the queue. Returns the first failure.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let mut first_err = None;
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        for key in keys {
            let Some(value) = self.pending.get(&key) else {
                continue;
            };
            match self.store.put(&key, value) {
                Ok(()) => {
                    self.pending.remove(&key);
                }
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn sqlite_put_get_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("pet").unwrap(), None);

        store.put("pet", &json!({"happiness": 50})).unwrap();
        assert_eq!(store.get("pet").unwrap(), Some(json!({"happiness": 50})));

        store.put("pet", &json!({"happiness": 60})).unwrap();
        assert_eq!(store.get("pet").unwrap(), Some(json!({"happiness": 60})));

        store.delete("pet").unwrap();
        assert_eq!(store.get("pet").unwrap(), None);
    }

    #[test]
    fn sqlite_persists_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            save(&store, "counter", &Counter { count: 3 }).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(load::<Counter>(&store, "counter").unwrap(), Some(Counter { count: 3 }));
    }

    #[test]
    fn decode_error_names_the_key() {
        let store = MemoryStore::new();
        store.put("counter", &json!("nope")).unwrap();
        let err = load::<Counter>(&store, "counter").unwrap_err();
        assert_matches!(err, StoreError::Decode { ref key, .. } if key == "counter");
    }

    #[test]
    fn memory_store_clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("a", &json!(1)).unwrap();
        assert_eq!(other.get("a").unwrap(), Some(json!(1)));
        assert_eq!(other.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn write_behind_retries_after_failure() {
        let backend = MemoryStore::new();
        let mut wb = WriteBehind::new(Box::new(backend.clone()));

        backend.set_failing(true);
        assert_matches!(
            wb.checkpoint("counter", &Counter { count: 1 }),
            Err(StoreError::Unavailable(_))
        );
        assert_matches!(
            wb.checkpoint("counter", &Counter { count: 2 }),
            Err(StoreError::Unavailable(_))
        );
        assert_eq!(wb.pending(), 1);
        assert_eq!(backend.get("counter").unwrap(), None);

        backend.set_failing(false);
        wb.checkpoint("other", &Counter { count: 9 }).unwrap();
        assert_eq!(wb.pending(), 0);
        assert_eq!(
            wb.load::<Counter>("counter").unwrap(),
            Some(Counter { count: 2 })
        );
    }
}
