//! In-memory storage backed by moka async caches

use crate::error::Result;
use crate::storage::{check_storable, CacheStorage};
use crate::types::{RequestKey, ResponseSnapshot};
use async_trait::async_trait;
use moka::future::Cache;
use tokio::sync::RwLock;
use tracing::debug;

type Namespace = Cache<RequestKey, ResponseSnapshot>;

/// Process-local storage. Entries live until their namespace is deleted.
#[derive(Default)]
pub struct MemoryStorage {
    /// Namespaces in creation order
    namespaces: RwLock<Vec<(String, Namespace)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find(&self, namespace: &str) -> Option<Namespace> {
        let namespaces = self.namespaces.read().await;
        namespaces
            .iter()
            .find(|(name, _)| name == namespace)
            .map(|(_, cache)| cache.clone())
    }

    async fn find_or_create(&self, namespace: &str) -> Namespace {
        if let Some(cache) = self.find(namespace).await {
            return cache;
        }

        let mut namespaces = self.namespaces.write().await;
        if let Some((_, cache)) = namespaces.iter().find(|(name, _)| name == namespace) {
            return cache.clone();
        }

        // No capacity bound: entries only go away with their namespace
        let cache: Namespace = Cache::builder().build();
        namespaces.push((namespace.to_string(), cache.clone()));
        debug!(namespace, "Created namespace");
        cache
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, namespace: &str) -> Result<()> {
        self.find_or_create(namespace).await;
        Ok(())
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.find(namespace).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        let removed = {
            let mut namespaces = self.namespaces.write().await;
            let before = namespaces.len();
            namespaces.retain(|(name, _)| name != namespace);
            namespaces.len() != before
        };
        if removed {
            debug!(namespace, "Deleted namespace");
        }
        Ok(removed)
    }

    async fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>> {
        match self.find(namespace).await {
            Some(cache) => Ok(cache.get(key).await),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        namespace: &str,
        key: RequestKey,
        response: ResponseSnapshot,
    ) -> Result<()> {
        check_storable(&key, &response)?;
        let cache = self.find_or_create(namespace).await;
        cache.insert(key, response).await;
        Ok(())
    }

    async fn put_all(
        &self,
        namespace: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> Result<()> {
        for (key, response) in &entries {
            check_storable(key, response)?;
        }
        let cache = self.find_or_create(namespace).await;
        for (key, response) in entries {
            cache.insert(key, response).await;
        }
        Ok(())
    }

    async fn entry_count(&self, namespace: &str) -> Result<usize> {
        match self.find(namespace).await {
            Some(cache) => {
                cache.run_pending_tasks().await;
                Ok(cache.entry_count() as usize)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("https://app.example/").unwrap().join(path).unwrap())
    }

    fn ok(body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(200, vec![], body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let storage = MemoryStorage::new();
        storage.put("v1", key("/a.js"), ok("a")).await.unwrap();

        let hit = storage.match_request("v1", &key("/a.js")).await.unwrap();
        assert_eq!(hit, Some(ok("a")));

        let miss = storage.match_request("v1", &key("/b.js")).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_match_in_missing_namespace_is_miss() {
        let storage = MemoryStorage::new();
        let result = storage.match_request("nope", &key("/")).await.unwrap();
        assert!(result.is_none());
        assert!(!storage.has("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let storage = MemoryStorage::new();
        storage.open("b").await.unwrap();
        storage.open("a").await.unwrap();
        storage.open("b").await.unwrap();
        storage.put("c", key("/"), ok("root")).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_delete_namespace() {
        let storage = MemoryStorage::new();
        storage.put("old", key("/"), ok("root")).await.unwrap();

        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.match_request("old", &key("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let storage = MemoryStorage::new();
        storage.put("v1", key("/"), ok("first")).await.unwrap();
        storage.put("v1", key("/"), ok("second")).await.unwrap();

        let hit = storage.match_request("v1", &key("/")).await.unwrap();
        assert_eq!(hit, Some(ok("second")));
        assert_eq!(storage.entry_count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_all_rejects_partial_batch() {
        let storage = MemoryStorage::new();
        let entries = vec![
            (key("/"), ok("root")),
            (key("/video.mp4"), ResponseSnapshot::new(206, vec![], vec![1, 2])),
        ];

        assert!(storage.put_all("v1", entries).await.is_err());
        assert_eq!(storage.entry_count("v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_all_writes_every_entry() {
        let storage = MemoryStorage::new();
        let entries = vec![(key("/"), ok("root")), (key("/index.html"), ok("index"))];

        storage.put_all("v1", entries).await.unwrap();
        assert_eq!(storage.entry_count("v1").await.unwrap(), 2);
    }
}
