use std::path::Path;
use serde_json::Value;

/// Hooks called by a [`Store`](crate::engine::Store) around its mutations.
///
/// All methods default to no-ops. `after_*` hooks run only once the change has
/// been written to disk.
pub trait StoreObserver: Send + Sync {
    fn before_set(&self, _key: &str, _value: &Value) {}
    fn after_set(&self, _key: &str, _value: &Value) {}
    fn after_delete(&self, _key: &str, _existed: bool) {}
    fn after_restore(&self, _source: &Path) {}
    fn after_version(&self, _version: u64) {}
}

/// Logs every persisted mutation at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl StoreObserver for LoggingObserver {
    fn after_set(&self, key: &str, value: &Value) {
        log::info!("set {} = {}", key, value);
    }

    fn after_delete(&self, key: &str, existed: bool) {
        if existed {
            log::info!("deleted {}", key);
        } else {
            log::info!("delete {}: no such key", key);
        }
    }

    fn after_restore(&self, source: &Path) {
        log::info!("restored from {:?}", source);
    }

    fn after_version(&self, version: u64) {
        log::info!("version set to {}", version);
    }
}
