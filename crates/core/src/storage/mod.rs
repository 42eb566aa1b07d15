pub mod debounce;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

/// Durable per-user client storage: string keys to JSON text.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory kv store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Reads a key, logging a storage failure before returning it. `Ok(None)`
/// means nothing is stored; an error means the stored value is unknown and
/// must not be overwritten.
pub async fn read_or_log(store: &dyn KeyValueStore, key: &str) -> anyhow::Result<Option<String>> {
    store.get(key).await.map_err(|err| {
        tracing::warn!(%key, error = %err, "client storage read failed; continuing in memory");
        err
    })
}


#[cfg(test)]
mod tests {
    use super::testing::BrokenKvStore;
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_read_is_not_mistaken_for_missing_data() {
        assert!(read_or_log(&BrokenKvStore, "k").await.is_err());
        assert_eq!(read_or_log(&MemoryKvStore::new(), "k").await.unwrap(), None);
    }
}
