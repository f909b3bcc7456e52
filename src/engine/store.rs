use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use crate::config::StoreConfig;
use crate::engine::codec::{Codec, Envelope};
use crate::engine::observer::StoreObserver;
use crate::engine::path::{self, QueryEntry};
use crate::engine::persistence::{self, Persistence};
use crate::{Error, Result};

/// The in-memory dataset bound to its data file.
///
/// Every mutating call rewrites the whole file before returning. When that write
/// fails the in-memory change has already happened; the error means "applied,
/// not yet durable".
pub struct Store {
    envelope: Envelope,
    codec: Codec,
    persistence: Persistence,
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl Store {
    /// Opens (or creates) the data file described by `config`.
    ///
    /// A missing file is a first run: the store starts empty at version 1 and the
    /// file is written immediately. Schema defaults are applied once, here.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let codec = Codec::new(config.encryption_key);
        let persistence = Persistence::new(&config.path)?;

        let (mut envelope, fresh) = match persistence.load()? {
            Some(bytes) => (codec.decode(&bytes)?, false),
            None => (Envelope::new(), true),
        };
        let filled = config.schema.apply(&mut envelope.data)?;

        let store = Self {
            envelope,
            codec,
            persistence,
            observers: Vec::new(),
        };

        if fresh {
            info!("No data file at {:?}, initializing a new store", store.path());
        }
        if fresh || filled > 0 {
            store.persist()?;
        }

        debug!(
            "Opened {:?} (version {}, {} top-level keys, {} filled from schema)",
            store.path(),
            store.envelope.version,
            store.envelope.data.len(),
            filled
        );
        Ok(store)
    }

    /// Registers an observer for subsequent mutations.
    pub fn subscribe(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn path(&self) -> &Path {
        self.persistence.path()
    }

    pub fn is_encrypted(&self) -> bool {
        self.codec.is_encrypted()
    }

    pub fn version(&self) -> u64 {
        self.envelope.version
    }

    pub fn len(&self) -> usize {
        self.envelope.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.data.is_empty()
    }

    /// A copy of the whole dataset.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.envelope.data.clone()
    }

    /// Looks up a dot path. Returns a copy; `None` when any segment is missing.
    pub fn get(&self, key: &str) -> Option<Value> {
        path::get(&self.envelope.data, key).cloned()
    }

    /// Exact top-level key check. Dot paths are not traversed; see [`Store::has_path`].
    pub fn has(&self, key: &str) -> bool {
        self.envelope.data.contains_key(key)
    }

    /// Like [`Store::has`], but follows dot paths the way [`Store::get`] does.
    pub fn has_path(&self, key: &str) -> bool {
        path::get(&self.envelope.data, key).is_some()
    }

    /// Writes `value` at a dot path and persists.
    ///
    /// Missing intermediate nodes are created. A scalar found mid-path is replaced
    /// by an object. Arrays take an existing index or the next one (append); any
    /// other segment is [`Error::InvalidPath`] and nothing changes.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        for observer in &self.observers {
            observer.before_set(key, &value);
        }

        path::set(&mut self.envelope.data, key, value)?;
        self.persist()?;

        if let Some(stored) = path::get(&self.envelope.data, key) {
            for observer in &self.observers {
                observer.after_set(key, stored);
            }
        }
        Ok(())
    }

    /// Removes the entry at a dot path, if any, and persists.
    ///
    /// Returns whether an entry was removed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let existed = path::remove(&mut self.envelope.data, key).is_some();
        self.persist()?;

        for observer in &self.observers {
            observer.after_delete(key, existed);
        }
        Ok(existed)
    }

    /// Scans every leaf depth-first in insertion order and returns copies of the
    /// ones `predicate` accepts.
    pub fn query<F>(&self, mut predicate: F) -> Vec<QueryEntry>
    where
        F: FnMut(&Value) -> bool,
    {
        path::collect(&self.envelope.data, &mut predicate)
    }

    /// Runs `body` against this store and returns its result.
    ///
    /// Mutations inside `body` persist as they happen; nothing is rolled back
    /// when `body` fails.
    pub fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        body(self).map_err(|e| {
            warn!("Transaction failed: {}", e);
            e
        })
    }

    /// Updates the envelope version and persists.
    pub fn set_version(&mut self, version: u64) -> Result<()> {
        if version == 0 {
            return Err(Error::InvalidVersion(version));
        }
        self.envelope.version = version;
        self.persist()?;

        info!("Store {:?} now at version {}", self.path(), version);
        for observer in &self.observers {
            observer.after_version(version);
        }
        Ok(())
    }

    /// Writes the current envelope to `path`, encoded (and encrypted) exactly like
    /// the live file.
    pub fn backup<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.codec.encode(&self.envelope)?;
        persistence::write_atomic(path, &bytes)?;
        info!("Backed up {:?} to {:?}", self.path(), path);
        Ok(())
    }

    /// Replaces the live envelope with the one stored at `path`, then persists.
    ///
    /// The live store is untouched when the backup cannot be read or decoded.
    pub fn restore<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let envelope = self.codec.decode(&bytes)?;

        self.envelope = envelope;
        self.persist()?;

        info!(
            "Restored {:?} from {:?} (version {}, {} top-level keys)",
            self.path(),
            path,
            self.envelope.version,
            self.envelope.data.len()
        );
        for observer in &self.observers {
            observer.after_restore(path);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let bytes = self.codec.encode(&self.envelope)?;
        self.persistence.save(&bytes).map_err(|e| {
            error!("Failed to persist {:?}: {}", self.path(), e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Schema;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl StoreObserver for Recorder {
        fn before_set(&self, key: &str, value: &Value) {
            self.events.lock().unwrap().push(format!("before_set {} {}", key, value));
        }
        fn after_set(&self, key: &str, value: &Value) {
            self.events.lock().unwrap().push(format!("after_set {} {}", key, value));
        }
        fn after_delete(&self, key: &str, existed: bool) {
            self.events.lock().unwrap().push(format!("after_delete {} {}", key, existed));
        }
        fn after_version(&self, version: u64) {
            self.events.lock().unwrap().push(format!("after_version {}", version));
        }
    }

    fn read_envelope(path: &Path) -> Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_missing_file_initializes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("store.json");
        let store = Store::open(StoreConfig::new(&file)).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.version(), 1);
        assert_eq!(read_envelope(&file), json!({"version": 1, "data": {}}));
    }

    #[test]
    fn test_set_get_dot_path() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();

        store.set("x.y.z", json!(5)).unwrap();
        assert_eq!(store.get("x.y.z"), Some(json!(5)));
        assert_eq!(store.get("x.y"), Some(json!({"z": 5})));
        assert_eq!(store.get("x.q"), None);
    }

    #[test]
    fn test_every_mutation_persists() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let mut store = Store::open(StoreConfig::new(&file)).unwrap();

        store.set("a", json!(1)).unwrap();
        assert_eq!(read_envelope(&file)["data"], json!({"a": 1}));

        store.delete("a").unwrap();
        assert_eq!(read_envelope(&file)["data"], json!({}));
        assert_eq!(read_envelope(&file)["version"], json!(1));
    }

    #[test]
    fn test_reopen_round_trip() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let value = json!({"xp": 0, "coins": 1.5, "loves": ["bird", null], "ok": false, "name": "ünï"});
        {
            let mut store = Store::open(StoreConfig::new(&file)).unwrap();
            store.set("user", value.clone()).unwrap();
            store.set("count", json!(-3)).unwrap();
        }
        let store = Store::open(StoreConfig::new(&file)).unwrap();
        assert_eq!(store.get("user"), Some(value));
        assert_eq!(store.get("count"), Some(json!(-3)));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        store.set("a.b", json!(1)).unwrap();

        assert!(!store.delete("a.c").unwrap());
        assert!(!store.delete("zzz").unwrap());
        assert!(store.delete("a.b").unwrap());
        assert_eq!(store.get("a"), Some(json!({})));
    }

    #[test]
    fn test_has_is_top_level_only() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        store.set("a.b", json!(1)).unwrap();

        assert!(store.has("a"));
        assert!(!store.has("a.b"));
        assert!(store.has_path("a.b"));
        assert!(!store.has_path("a.c"));
    }

    #[test]
    fn test_query_filter() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        store.set("u1", json!({"coins": 10})).unwrap();
        store.set("u2", json!({"coins": 100})).unwrap();

        let rich = store.query(|v| v.as_i64().map_or(false, |n| n > 50));
        assert_eq!(rich, vec![QueryEntry { key: "u2.coins".to_string(), value: json!(100) }]);

        // Results are copies, and their keys address the leaves.
        for entry in store.query(|_| true) {
            assert_eq!(store.get(&entry.key), Some(entry.value));
        }
    }

    #[test]
    fn test_schema_defaults() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let schema = Schema::new().with_default("a", json!(1));
        let store = Store::open(StoreConfig::new(&file).with_schema(schema)).unwrap();

        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(read_envelope(&file)["data"], json!({"a": 1}));
    }

    #[test]
    fn test_schema_required_missing() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let schema = Schema::new().with_default("a", json!(1)).required("b");
        match Store::open(StoreConfig::new(&file).with_schema(schema)) {
            Err(Error::RequiredKeyMissing(key)) => assert_eq!(key, "b"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("open should fail"),
        }
        assert!(!file.exists());
    }

    #[test]
    fn test_schema_leaves_existing_values() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        fs::write(&file, r#"{"version": 4, "data": {"a": "kept"}}"#).unwrap();

        let schema = Schema::new().with_default("a", json!(1)).optional("b");
        let store = Store::open(StoreConfig::new(&file).with_schema(schema)).unwrap();
        assert_eq!(store.get("a"), Some(json!("kept")));
        assert_eq!(store.get("b"), Some(Value::Null));
        assert_eq!(store.version(), 4);
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        fs::write(&file, "{}").unwrap();
        assert!(matches!(Store::open(StoreConfig::new(&file)), Err(Error::CorruptPayload(_))));
    }

    #[test]
    fn test_open_unreadable_path_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(Store::open(StoreConfig::new(dir.path())), Err(Error::Io(_))));
    }

    #[test]
    fn test_invalid_key_fails_before_io() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("sub").join("s.json");
        let res = Store::open(StoreConfig::new(&file).with_encryption_key(""));
        assert!(matches!(res, Err(Error::InvalidConfiguration(_))));
        assert!(!dir.path().join("sub").exists());
    }

    #[test]
    fn test_encrypted_store() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.db");
        {
            let mut store = Store::open(StoreConfig::new(&file).with_encryption_key("pw")).unwrap();
            assert!(store.is_encrypted());
            store.set("secret", json!("hidden")).unwrap();
        }
        let raw = fs::read_to_string(&file).unwrap();
        assert!(!raw.contains("hidden"));
        assert!(raw.chars().all(|c| c.is_ascii_hexdigit()));

        let store = Store::open(StoreConfig::new(&file).with_encryption_key("pw")).unwrap();
        assert_eq!(store.get("secret"), Some(json!("hidden")));

        let wrong = Store::open(StoreConfig::new(&file).with_encryption_key("other"));
        assert!(matches!(wrong, Err(Error::DecryptionFailure)));
    }

    #[test]
    fn test_version_updates() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let mut store = Store::open(StoreConfig::new(&file)).unwrap();

        store.set("a", json!(1)).unwrap();
        assert_eq!(store.version(), 1);

        store.set_version(2).unwrap();
        assert_eq!(read_envelope(&file)["version"], json!(2));
        assert!(matches!(store.set_version(0), Err(Error::InvalidVersion(0))));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_transaction_propagates_failure() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();

        let res: Result<()> = store.transaction(|s| {
            s.set("first", json!(1))?;
            Err(Error::Internal("boom".to_string()))
        });
        assert!(matches!(res, Err(Error::Internal(_))));
        // No rollback: the write before the failure stays.
        assert_eq!(store.get("first"), Some(json!(1)));

        let total = store
            .transaction(|s| {
                s.set("u1.xp", json!(1))?;
                s.set("u2.xp", json!(2))?;
                Ok(s.query(|_| true).len())
            })
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_backup_restore() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let backup = dir.path().join("backup.json");
        let mut store = Store::open(StoreConfig::new(&file)).unwrap();

        store.set("u1", json!({"coins": 10})).unwrap();
        store.backup(&backup).unwrap();
        let at_backup = store.snapshot();

        store.set("u1.coins", json!(999)).unwrap();
        store.set("u3", json!("new")).unwrap();
        store.set_version(7).unwrap();

        store.restore(&backup).unwrap();
        assert_eq!(store.snapshot(), at_backup);
        assert_eq!(store.version(), 1);
        assert_eq!(read_envelope(&file)["data"], Value::Object(at_backup));
    }

    #[test]
    fn test_failed_restore_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        store.set("a", json!(1)).unwrap();

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "garbage").unwrap();
        assert!(matches!(store.restore(&bad), Err(Error::CorruptPayload(_))));
        assert!(matches!(store.restore(dir.path().join("missing.json")), Err(Error::Io(_))));
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_encrypted_backup_needs_same_key() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("backup.db");

        let mut store = Store::open(StoreConfig::new(dir.path().join("a.db")).with_encryption_key("k1")).unwrap();
        store.set("a", json!(1)).unwrap();
        store.backup(&backup).unwrap();
        assert!(!fs::read_to_string(&backup).unwrap().contains("\"a\""));

        let mut other = Store::open(StoreConfig::new(dir.path().join("b.db")).with_encryption_key("k2")).unwrap();
        assert!(matches!(other.restore(&backup), Err(Error::DecryptionFailure)));
        assert!(other.is_empty());

        let mut same = Store::open(StoreConfig::new(dir.path().join("c.db")).with_encryption_key("k1")).unwrap();
        same.restore(&backup).unwrap();
        assert_eq!(same.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_set_failing_to_persist_keeps_memory_change() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        let file = sub.join("s.json");
        let mut store = Store::open(StoreConfig::new(&file)).unwrap();
        store.set("a", json!(1)).unwrap();

        fs::remove_dir_all(&sub).unwrap();

        assert!(matches!(store.set("a", json!(2)), Err(Error::Io(_))));
        assert_eq!(store.get("a"), Some(json!(2)));
        assert!(matches!(store.delete("a"), Err(Error::Io(_))));
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_backup_to_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        let target = dir.path().join("missing").join("backup.json");

        assert!(matches!(store.backup(&target), Err(Error::Io(_))));
        assert!(!target.exists());
    }

    #[test]
    fn test_set_rejects_non_index_on_array() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("s.json");
        let mut store = Store::open(StoreConfig::new(&file)).unwrap();
        store.set("u.loves", json!(["bird", "cat"])).unwrap();

        assert!(matches!(store.set("u.loves.name", json!("x")), Err(Error::InvalidPath(_))));
        store.set("u.loves.2", json!("dog")).unwrap();

        assert_eq!(store.get("u.loves"), Some(json!(["bird", "cat", "dog"])));
        assert_eq!(read_envelope(&file)["data"]["u"]["loves"], json!(["bird", "cat", "dog"]));
    }

    #[test]
    fn test_query_skips_null_placeholders() {
        let dir = tempdir().unwrap();
        let schema = Schema::new().optional("nick").with_default("coins", json!(5));
        let store = Store::open(StoreConfig::new(dir.path().join("s.json")).with_schema(schema)).unwrap();

        assert_eq!(store.get("nick"), Some(Value::Null));
        let all = store.query(|_| true);
        assert_eq!(all, vec![QueryEntry { key: "coins".to_string(), value: json!(5) }]);
    }

    #[test]
    fn test_observers() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(StoreConfig::new(dir.path().join("s.json"))).unwrap();
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.set("a.b", json!(1)).unwrap();
        store.delete("a.b").unwrap();
        store.delete("nope").unwrap();
        store.set_version(3).unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "before_set a.b 1",
                "after_set a.b 1",
                "after_delete a.b true",
                "after_delete nope false",
                "after_version 3",
            ]
        );
    }
}
