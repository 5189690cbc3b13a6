//! The storage interface shared by all backends

use crate::error::{Result, StorageError};
use crate::types::{RequestKey, ResponseSnapshot};
use async_trait::async_trait;

/// A set of named caches, each mapping request identity to a response.
///
/// Implementations serialize conflicting writes themselves; the last write
/// to a key wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the namespace if it does not exist yet
    async fn open(&self, namespace: &str) -> Result<()>;

    async fn has(&self, namespace: &str) -> Result<bool>;

    /// Names of all namespaces, in creation order
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a namespace and all its entries. Returns whether it existed.
    async fn delete(&self, namespace: &str) -> Result<bool>;

    /// Look up a request in a namespace. A missing namespace is a miss.
    async fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>>;

    /// Store a response, creating the namespace if needed
    async fn put(&self, namespace: &str, key: RequestKey, response: ResponseSnapshot)
        -> Result<()>;

    /// Store a batch of responses. Either every entry is written or none is.
    async fn put_all(
        &self,
        namespace: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> Result<()>;

    async fn entry_count(&self, namespace: &str) -> Result<usize>;
}

/// Partial responses cannot be stored
pub(crate) fn check_storable(key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
    if response.status == 206 {
        return Err(StorageError::Rejected(format!(
            "partial response for {}",
            key
        )));
    }
    Ok(())
}
