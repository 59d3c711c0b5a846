pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StoreError;

/// Persisted named scalar settings, namespaced by indicator kind
/// (e.g. `rsi_period`, `stoch_lower_level`). Last-write-wins; no
/// transactional guarantees.
///
/// Values are stored as strings; the typed accessors return `None` for
/// absent or unparseable entries so callers fall back to defaults.
pub trait ParameterStore: Send + Sync {
    fn get_raw(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StoreError>>>;

    fn set_raw(&self, key: &str, value: String) -> BoxFuture<'_, Result<(), Report<StoreError>>>;

    fn get_i64(&self, key: &str) -> BoxFuture<'_, Result<Option<i64>, Report<StoreError>>> {
        let fut = self.get_raw(key);
        Box::pin(async move { Ok(fut.await?.and_then(|s| s.parse().ok())) })
    }

    fn get_f64(&self, key: &str) -> BoxFuture<'_, Result<Option<f64>, Report<StoreError>>> {
        let fut = self.get_raw(key);
        Box::pin(async move { Ok(fut.await?.and_then(|s| s.parse().ok())) })
    }

    fn get_string(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StoreError>>> {
        self.get_raw(key)
    }

    fn set_i64(&self, key: &str, value: i64) -> BoxFuture<'_, Result<(), Report<StoreError>>> {
        self.set_raw(key, value.to_string())
    }

    fn set_f64(&self, key: &str, value: f64) -> BoxFuture<'_, Result<(), Report<StoreError>>> {
        self.set_raw(key, value.to_string())
    }

    fn set_string(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), Report<StoreError>>> {
        self.set_raw(key, value.to_owned())
    }
}

/// In-memory store; nothing survives the process. Used by tests and as the
/// fallback when no data directory is configured.
#[derive(Default)]
pub struct MemoryParameterStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterStore for MemoryParameterStore {
    fn get_raw(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StoreError>>> {
        let key = key.to_owned();
        Box::pin(async move { Ok(self.values.lock().unwrap().get(&key).cloned()) })
    }

    fn set_raw(&self, key: &str, value: String) -> BoxFuture<'_, Result<(), Report<StoreError>>> {
        let key = key.to_owned();
        Box::pin(async move {
            self.values.lock().unwrap().insert(key, value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_round_trips() {
        let store = MemoryParameterStore::new();
        store.set_i64("rsi_period", 14).await.unwrap();
        store.set_f64("rsi_lower_level", 30.5).await.unwrap();
        store.set_string("active_indicator", "rsi").await.unwrap();

        assert_eq!(store.get_i64("rsi_period").await.unwrap(), Some(14));
        assert_eq!(store.get_f64("rsi_lower_level").await.unwrap(), Some(30.5));
        assert_eq!(
            store.get_string("active_indicator").await.unwrap().as_deref(),
            Some("rsi")
        );
    }

    #[tokio::test]
    async fn absent_keys_read_as_none() {
        let store = MemoryParameterStore::new();
        assert_eq!(store.get_i64("missing").await.unwrap(), None);
        assert_eq!(store.get_f64("missing").await.unwrap(), None);
        assert_eq!(store.get_string("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unparseable_value_reads_as_none() {
        let store = MemoryParameterStore::new();
        store.set_string("rsi_period", "not a number").await.unwrap();
        assert_eq!(store.get_i64("rsi_period").await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryParameterStore::new();
        store.set_i64("rsi_period", 14).await.unwrap();
        store.set_i64("rsi_period", 21).await.unwrap();
        assert_eq!(store.get_i64("rsi_period").await.unwrap(), Some(21));
    }
}
