//! Cache lifecycle and per-request response selection
//!
//! Install fills the current release's namespace, activate removes every other
//! namespace, and fetch answers same-origin GETs from the network or the cache
//! depending on the request class.

use crate::constants::{ASSET_UNAVAILABLE_STATUS, OFFLINE_BODY, OFFLINE_STATUS};
use crate::error::{Result, WorkerError};
use crate::manifest::AssetManifest;
use crate::network::{CacheMode, Network};
use crate::request::{classify, Request, RequestClass};
use crate::scope::WorkerScope;
use cache_storage::{CacheStorage, RequestKey, ResponseSnapshot};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// What the host should do with a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Answer with this response
    Respond(ResponseSnapshot),
    /// Not intercepted: default handling applies
    Passthrough,
}

/// Namespaces removed during activation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub cache_name: String,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub struct CacheCoordinator {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    scope: Arc<dyn WorkerScope>,
    manifest: AssetManifest,
    /// Origin of the hosting page
    origin: Url,
}

impl CacheCoordinator {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        scope: Arc<dyn WorkerScope>,
        origin: Url,
    ) -> Self {
        Self {
            storage,
            network,
            scope,
            manifest: AssetManifest::default(),
            origin,
        }
    }

    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn cache_name(&self) -> String {
        self.manifest.cache_name()
    }

    fn asset_url(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Key every navigation response is stored under
    pub fn root_key(&self) -> Result<RequestKey> {
        Ok(RequestKey::get(&self.asset_url(&self.manifest.root_document)?))
    }

    // --- Lifecycle ---

    /// Populate the current namespace.
    ///
    /// Core assets are all-or-nothing: any rejected fetch or non-2xx status
    /// fails the install and nothing from the core batch is written. Optional
    /// assets are then added independently and their failures ignored.
    pub async fn install(&self) -> Result<()> {
        let cache_name = self.cache_name();
        info!(cache = %cache_name, "Installing");

        self.storage.open(&cache_name).await?;

        let core = try_join_all(self.manifest.core.iter().map(|path| self.fetch_asset(path)))
            .await
            .map_err(|e| {
                error!(cache = %cache_name, error = %e, "Failed to fetch core assets");
                e
            })?;
        let count = core.len();
        self.storage.put_all(&cache_name, core).await?;
        info!(cache = %cache_name, count, "Cached core assets");

        join_all(self.manifest.optional.iter().map(|path| {
            let cache_name = &cache_name;
            async move {
                match self.fetch_asset(path).await {
                    Ok((key, response)) => {
                        if let Err(e) = self.storage.put(cache_name, key, response).await {
                            debug!(path = %path, error = %e, "Skipping optional asset");
                        }
                    }
                    Err(e) => debug!(path = %path, error = %e, "Skipping optional asset"),
                }
            }
        }))
        .await;

        self.scope.skip_waiting().await?;
        info!(cache = %cache_name, "Installed");
        Ok(())
    }

    /// Fetch an asset for bulk add. Non-2xx responses count as failures.
    async fn fetch_asset(&self, path: &str) -> Result<(RequestKey, ResponseSnapshot)> {
        let request = Request::get(self.asset_url(path)?);
        let response = self.network.fetch(&request, CacheMode::Default).await?;
        if !response.is_ok() {
            return Err(WorkerError::BadStatus {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        Ok((request.key(), response))
    }

    /// Delete every namespace but the current one, then claim clients.
    ///
    /// Each deletion runs as its own task so that one failing (or panicking)
    /// deletion cannot stop the others. Failures are logged and reported.
    pub async fn activate(&self) -> ActivationReport {
        let cache_name = self.cache_name();
        info!(cache = %cache_name, "Activating");

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate caches");
                Vec::new()
            }
        };

        let deletions = names
            .into_iter()
            .filter(|name| *name != cache_name)
            .map(|name| {
                let storage = Arc::clone(&self.storage);
                let task = tokio::spawn({
                    let name = name.clone();
                    async move { storage.delete(&name).await }
                });
                async move { (name, task.await) }
            });

        let (results, claimed) =
            tokio::join!(join_all(deletions), self.scope.claim_clients());

        let mut report = ActivationReport {
            cache_name,
            ..Default::default()
        };
        for (name, result) in results {
            match result {
                Ok(Ok(_)) => {
                    info!(cache = %name, "Deleted stale cache");
                    report.deleted.push(name);
                }
                Ok(Err(e)) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    report.failed.push(name);
                }
                Err(e) => {
                    warn!(cache = %name, error = %e, "Stale cache deletion aborted");
                    report.failed.push(name);
                }
            }
        }

        if let Err(e) = claimed {
            warn!(error = %e, "Failed to claim clients");
        }

        info!(
            cache = %report.cache_name,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Activated"
        );
        report
    }

    // --- Fetch ---

    /// Only same-origin GETs are handled; everything else is left alone
    pub fn intercepts(&self, request: &Request) -> bool {
        request.is_get() && request.is_same_origin(&self.origin)
    }

    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.intercepts(request) {
            debug!(method = %request.method, url = %request.url, "Passing through");
            return FetchOutcome::Passthrough;
        }
        FetchOutcome::Respond(self.respond(request).await)
    }

    /// Select a response for an intercepted request. Never fails.
    pub async fn respond(&self, request: &Request) -> ResponseSnapshot {
        match classify(request) {
            RequestClass::Html => self.network_first(request).await,
            RequestClass::Asset => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> ResponseSnapshot {
        let root_key = match self.root_key() {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Invalid root document URL");
                return ResponseSnapshot::text(OFFLINE_STATUS, OFFLINE_BODY);
            }
        };

        match self.network.fetch(request, CacheMode::NoStore).await {
            Ok(response) => {
                self.persist_detached(root_key, response.clone());
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation fetch failed, trying cache");
                match self.storage.match_request(&self.cache_name(), &root_key).await {
                    Ok(Some(cached)) => cached,
                    Ok(None) => ResponseSnapshot::text(OFFLINE_STATUS, OFFLINE_BODY),
                    Err(e) => {
                        warn!(error = %e, "Cache read failed");
                        ResponseSnapshot::text(OFFLINE_STATUS, OFFLINE_BODY)
                    }
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> ResponseSnapshot {
        let key = request.key();

        match self.storage.match_request(&self.cache_name(), &key).await {
            Ok(Some(cached)) => {
                debug!(key = %key, "Cache hit");
                return cached;
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, treating as miss"),
        }

        match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                self.persist_detached(key, response.clone());
                response
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Asset fetch failed");
                ResponseSnapshot::text(ASSET_UNAVAILABLE_STATUS, "")
            }
        }
    }

    /// Write a response into the current namespace without waiting for it.
    /// Failures are logged and dropped.
    fn persist_detached(&self, key: RequestKey, response: ResponseSnapshot) {
        let storage = Arc::clone(&self.storage);
        let cache_name = self.cache_name();
        tokio::spawn(async move {
            if let Err(e) = storage.put(&cache_name, key.clone(), response).await {
                debug!(cache = %cache_name, key = %key, error = %e, "Failed to persist response");
            }
        });
    }
}
