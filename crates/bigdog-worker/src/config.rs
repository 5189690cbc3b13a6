use crate::error::{Result, WorkerError};
use std::env;
use std::path::PathBuf;
use url::Url;

/// Where cached responses are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
}

/// Host configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub port: u16,
    /// Origin the hosted page is served from
    pub public_url: Url,
    /// Origin network fetches are sent to
    pub upstream_url: Url,
    pub backend: StorageBackend,
    pub cache_dir: PathBuf,
    pub install_attempts: u32,
    pub install_retry_secs: u64,
}

impl HostConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let public_url = lookup("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let public_url = Url::parse(&public_url)
            .map_err(|e| WorkerError::Config(format!("invalid PUBLIC_URL: {}", e)))?;

        let upstream_url =
            lookup("UPSTREAM_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let upstream_url = Url::parse(&upstream_url)
            .map_err(|e| WorkerError::Config(format!("invalid UPSTREAM_URL: {}", e)))?;

        let backend = match lookup("CACHE_BACKEND").as_deref() {
            None | Some("file") => StorageBackend::File,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(WorkerError::Config(format!(
                    "unknown CACHE_BACKEND: {}",
                    other
                )))
            }
        };

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./cache/bigdog"));

        let install_attempts = lookup("INSTALL_ATTEMPTS")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        let install_retry_secs = lookup("INSTALL_RETRY_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        Ok(Self {
            port,
            public_url,
            upstream_url,
            backend,
            cache_dir,
            install_attempts,
            install_retry_secs,
        })
    }
}
