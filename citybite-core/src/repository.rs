use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{CoreError, CoreResult};

/// A stored aggregate together with its optimistic-concurrency version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Key-value storage for one aggregate type.
///
/// `put` is a compare-and-set: `expected = None` means the key must not exist
/// yet, `Some(v)` means the stored version must still be `v`. A mismatch is a
/// `CoreError::VersionConflict` and nothing is written.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CoreResult<Option<Versioned<T>>>;

    async fn put(&self, key: &str, value: &T, expected: Option<u64>) -> CoreResult<u64>;

    async fn keys(&self) -> CoreResult<Vec<String>>;
}

pub struct InMemoryRepository<T> {
    entries: RwLock<HashMap<String, Versioned<T>>>,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CoreResult<Option<Versioned<T>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &T, expected: Option<u64>) -> CoreResult<u64> {
        let mut entries = self.entries.write().await;
        let found = entries.get(key).map(|e| e.version);

        if found != expected {
            return Err(CoreError::VersionConflict {
                key: key.to_string(),
                expected,
                found,
            });
        }

        let version = found.unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            Versioned {
                value: value.clone(),
                version,
            },
        );
        Ok(version)
    }

    async fn keys(&self) -> CoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_then_update() {
        let repo = InMemoryRepository::<String>::new();
        let v1 = repo.put("k", &"a".to_string(), None).await.unwrap();
        assert_eq!(v1, 1);
        let v2 = repo.put("k", &"b".to_string(), Some(v1)).await.unwrap();
        assert_eq!(v2, 2);

        let stored = repo.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, "b");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let repo = InMemoryRepository::<u32>::new();
        repo.put("k", &1, None).await.unwrap();
        repo.put("k", &2, Some(1)).await.unwrap();

        let err = repo.put("k", &3, Some(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::VersionConflict { found: Some(2), .. }));
        assert_eq!(repo.get("k").await.unwrap().unwrap().value, 2);
    }

    #[tokio::test]
    async fn test_double_insert_conflicts() {
        let repo = InMemoryRepository::<u32>::new();
        repo.put("k", &1, None).await.unwrap();
        assert!(repo.put("k", &1, None).await.is_err());
        assert_eq!(repo.keys().await.unwrap(), vec!["k".to_string()]);
    }
}
