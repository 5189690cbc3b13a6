//! File-backed storage
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<hex(namespace)>/namespace.json   name and creation time
//! <root>/<hex(namespace)>/<sha256>.entry   JSON metadata line, then the raw body
//! ```
//!
//! Entries are staged to a temporary file and renamed into place, so readers
//! never observe a half-written entry.

use crate::error::{Result, StorageError};
use crate::storage::{check_storable, CacheStorage};
use crate::types::{RequestKey, ResponseSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const NAMESPACE_FILE: &str = "namespace.json";
const ENTRY_EXTENSION: &str = "entry";
const STAGING_EXTENSION: &str = "staging";
const BACKUP_EXTENSION: &str = "backup";

#[derive(Debug, Serialize, Deserialize)]
struct NamespaceInfo {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

/// Storage that persists namespaces as directories on disk
pub struct FileStorage {
    root: PathBuf,
    /// Serializes writers; readers go straight to disk
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    /// Ensure the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "File storage initialized");
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(hex::encode(namespace.as_bytes()))
    }

    /// File name stem for a key
    pub fn entry_id(key: &RequestKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", key.method, key.url).as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(dir: &Path, key: &RequestKey) -> PathBuf {
        dir.join(Self::entry_id(key)).with_extension(ENTRY_EXTENSION)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<PathBuf> {
        let dir = self.namespace_dir(namespace);
        let info_path = dir.join(NAMESPACE_FILE);
        if fs::try_exists(&info_path).await? {
            return Ok(dir);
        }

        fs::create_dir_all(&dir).await?;
        let info = NamespaceInfo {
            name: namespace.to_string(),
            created_at: Utc::now(),
        };
        fs::write(&info_path, serde_json::to_vec(&info)?).await?;
        debug!(namespace, dir = ?dir, "Created namespace");
        Ok(dir)
    }

    async fn read_namespace_info(dir: &Path) -> Option<NamespaceInfo> {
        let data = fs::read(dir.join(NAMESPACE_FILE)).await.ok()?;
        serde_json::from_slice(&data).ok()
    }

    fn encode_entry(key: &RequestKey, response: &ResponseSnapshot) -> Result<Vec<u8>> {
        let meta = EntryMeta {
            key: key.clone(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        // serde_json never emits a raw newline, so the first one ends the metadata
        let mut data = serde_json::to_vec(&meta)?;
        data.push(b'\n');
        data.extend_from_slice(&response.body);
        Ok(data)
    }

    fn decode_entry(data: &[u8]) -> Result<(EntryMeta, ResponseSnapshot)> {
        let split = data
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StorageError::Rejected("entry has no metadata line".to_string()))?;
        let meta: EntryMeta = serde_json::from_slice(&data[..split])?;
        let response =
            ResponseSnapshot::new(meta.status, meta.headers.clone(), data[split + 1..].to_vec());
        Ok((meta, response))
    }

    /// Remove a corrupt entry, unless a writer replaced it since it was read
    async fn remove_if_unreadable(&self, path: &Path) {
        let _guard = self.write_lock.lock().await;
        match fs::read(path).await {
            Ok(data) if Self::decode_entry(&data).is_ok() => {
                debug!(path = ?path, "Entry was rewritten, keeping it");
            }
            Ok(_) => {
                let _ = fs::remove_file(path).await;
                debug!(path = ?path, "Removed unreadable entry");
            }
            Err(_) => {}
        }
    }

    /// Move a staged entry into place, setting any previous entry aside.
    /// Returns where the previous entry was kept.
    async fn commit(staging: &Path, path: &Path) -> Result<Option<PathBuf>> {
        let backup = path.with_extension(BACKUP_EXTENSION);
        let had_previous = match fs::rename(path, &backup).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = fs::rename(staging, path).await {
            if had_previous {
                let _ = fs::rename(&backup, path).await;
            }
            return Err(e.into());
        }
        Ok(had_previous.then_some(backup))
    }

    /// Write an entry next to its final path, returning (staging, final)
    async fn stage(
        dir: &Path,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<(PathBuf, PathBuf)> {
        let path = Self::entry_path(dir, key);
        let staging = path.with_extension(STAGING_EXTENSION);
        fs::write(&staging, Self::encode_entry(key, response)?).await?;
        Ok((staging, path))
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn open(&self, namespace: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_namespace(namespace).await?;
        Ok(())
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(fs::try_exists(self.namespace_dir(namespace).join(NAMESPACE_FILE)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut found: Vec<NamespaceInfo> = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match Self::read_namespace_info(&entry.path()).await {
                Some(info) => found.push(info),
                None => warn!(dir = ?entry.path(), "Skipping directory without namespace info"),
            }
        }

        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(found.into_iter().map(|info| info.name).collect())
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_dir_all(self.namespace_dir(namespace)).await {
            Ok(()) => {
                debug!(namespace, "Deleted namespace");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>> {
        let path = Self::entry_path(&self.namespace_dir(namespace), key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match Self::decode_entry(&data) {
            Ok((meta, response)) if meta.key == *key => Ok(Some(response)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(path = ?path, error = %e, "Unreadable cache entry");
                self.remove_if_unreadable(&path).await;
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        namespace: &str,
        key: RequestKey,
        response: ResponseSnapshot,
    ) -> Result<()> {
        check_storable(&key, &response)?;
        let _guard = self.write_lock.lock().await;
        let dir = self.ensure_namespace(namespace).await?;
        let (staging, path) = Self::stage(&dir, &key, &response).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        debug!(namespace, key = %key, size = response.body.len(), "Stored entry");
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

        let _guard = self.write_lock.lock().await;
        let dir = self.ensure_namespace(namespace).await?;

        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in &entries {
            match Self::stage(&dir, key, response).await {
                Ok(paths) => staged.push(paths),
                Err(e) => {
                    for (staging, _) in &staged {
                        let _ = fs::remove_file(staging).await;
                    }
                    return Err(e);
                }
            }
        }

        let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
        for (index, (staging, path)) in staged.iter().enumerate() {
            match Self::commit(staging, path).await {
                Ok(backup) => committed.push((path.clone(), backup)),
                Err(e) => {
                    warn!(namespace, error = %e, "Batch write failed, rolling back");
                    for (path, backup) in committed.iter().rev() {
                        let _ = fs::remove_file(path).await;
                        if let Some(backup) = backup {
                            let _ = fs::rename(backup, path).await;
                        }
                    }
                    for (staging, _) in &staged[index..] {
                        let _ = fs::remove_file(staging).await;
                    }
                    return Err(e);
                }
            }
        }

        for (_, backup) in &committed {
            if let Some(backup) = backup {
                let _ = fs::remove_file(backup).await;
            }
        }

        debug!(namespace, count = committed.len(), "Stored batch");
        Ok(())
    }

    async fn entry_count(&self, namespace: &str) -> Result<usize> {
        let mut dir = match fs::read_dir(self.namespace_dir(namespace)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}
