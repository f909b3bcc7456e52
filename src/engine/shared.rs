use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use serde_json::{Map, Value};
use crate::config::StoreConfig;
use crate::engine::{QueryEntry, Store, StoreObserver};
use crate::{Error, KVReader, KVWriter, Result, Snapshotter};

/// A cloneable async handle around a [`Store`].
///
/// Every call runs on tokio's blocking pool and holds the store lock for its
/// whole duration, file write included. Callers are serialized; nothing is
/// buffered or flushed in the background.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = tokio::task::spawn_blocking(move || Store::open(config))
            .await
            .map_err(|e| Error::Internal(e.to_string()))??;
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: Store) -> Self {
        Self { inner: Arc::new(Mutex::new(store)) }
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut store = inner
                .lock()
                .map_err(|_| Error::Internal("store lock poisoned".to_string()))?;
            f(&mut *store)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
    }

    pub async fn query<F>(&self, predicate: F) -> Result<Vec<QueryEntry>>
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        self.run(move |store| Ok(store.query(predicate))).await
    }

    /// Runs `body` with exclusive access to the store. See [`Store::transaction`].
    pub async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |store| store.transaction(body)).await
    }

    pub async fn version(&self) -> Result<u64> {
        self.run(|store| Ok(store.version())).await
    }

    pub async fn set_version(&self, version: u64) -> Result<()> {
        self.run(move |store| store.set_version(version)).await
    }

    pub async fn snapshot(&self) -> Result<Map<String, Value>> {
        self.run(|store| Ok(store.snapshot())).await
    }

    pub async fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> Result<()> {
        self.run(move |store| {
            store.subscribe(observer);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KVReader for SharedStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.run(move |store| Ok(store.get(&key))).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |store| Ok(store.has(&key))).await
    }
}

#[async_trait]
impl KVWriter for SharedStore {
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.run(move |store| store.set(&key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |store| store.delete(&key).map(|_| ())).await
    }
}

#[async_trait]
impl Snapshotter for SharedStore {
    async fn backup(&self, path: &Path) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        self.run(move |store| store.backup(&path)).await
    }

    async fn restore(&self, path: &Path) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        self.run(move |store| store.restore(&path)).await
    }
}
