//! Fakes for the worker's collaborators

use crate::error::FetchError;
use crate::network::{CacheMode, Network};
use crate::request::Request;
use async_trait::async_trait;
use cache_storage::{
    CacheStorage, MemoryStorage, RequestKey, ResponseSnapshot, Result as StorageResult,
    StorageError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const ORIGIN: &str = "https://app.example";

pub fn url(path: &str) -> url::Url {
    url::Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn ok(body: &str) -> ResponseSnapshot {
    ResponseSnapshot::new(
        200,
        vec![("content-type".to_string(), "text/plain".to_string())],
        body.as_bytes().to_vec(),
    )
}

/// Network serving canned responses by URL; unknown URLs answer 404
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, ResponseSnapshot>>,
    unreachable: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, CacheMode)>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, response: ResponseSnapshot) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), response);
    }

    /// Make fetches of one path reject
    pub fn fail(&self, path: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(url(path).to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, CacheMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(
        &self,
        request: &Request,
        mode: CacheMode,
    ) -> Result<ResponseSnapshot, FetchError> {
        let target = request.url.to_string();
        self.calls.lock().unwrap().push((target.clone(), mode));

        if self.offline.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&target)
        {
            return Err(FetchError::Unreachable(target));
        }

        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_else(|| ResponseSnapshot::text(404, "Not Found")))
    }
}

/// Memory storage with injectable write, read and delete faults
#[derive(Default)]
pub struct FaultyStorage {
    pub inner: MemoryStorage,
    fail_puts: AtomicBool,
    stall_puts: AtomicBool,
    fail_reads: AtomicBool,
    fail_deletes: Mutex<HashSet<String>>,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    /// Single-entry writes never complete
    pub fn stall_puts(&self) {
        self.stall_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, namespace: &str) {
        self.fail_deletes
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    fn injected(what: &str) -> StorageError {
        StorageError::Io(Box::new(std::io::Error::other(format!(
            "injected {} failure",
            what
        ))))
    }
}

#[async_trait]
impl CacheStorage for FaultyStorage {
    async fn open(&self, namespace: &str) -> StorageResult<()> {
        self.inner.open(namespace).await
    }

    async fn has(&self, namespace: &str) -> StorageResult<bool> {
        self.inner.has(namespace).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, namespace: &str) -> StorageResult<bool> {
        if self.fail_deletes.lock().unwrap().contains(namespace) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(namespace).await
    }

    async fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> StorageResult<Option<ResponseSnapshot>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        self.inner.match_request(namespace, key).await
    }

    async fn put(
        &self,
        namespace: &str,
        key: RequestKey,
        response: ResponseSnapshot,
    ) -> StorageResult<()> {
        if self.stall_puts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected("write"));
        }
        self.inner.put(namespace, key, response).await
    }

    async fn put_all(
        &self,
        namespace: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected("batch write"));
        }
        self.inner.put_all(namespace, entries).await
    }

    async fn entry_count(&self, namespace: &str) -> StorageResult<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("count"));
        }
        self.inner.entry_count(namespace).await
    }
}

/// Poll until `check` holds, giving detached tasks time to run
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
