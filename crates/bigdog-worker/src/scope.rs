//! The worker's view of its hosting environment

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[async_trait]
pub trait WorkerScope: Send + Sync {
    /// Activate as soon as install finishes instead of waiting for the
    /// previous version's clients to close
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of every open client, not only ones loaded from now on
    async fn claim_clients(&self) -> Result<()>;
}

/// Scope for a worker hosted in-process. Records what was requested.
#[derive(Debug, Default)]
pub struct LocalScope {
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerScope for LocalScope {
    async fn skip_waiting(&self) -> Result<()> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!("Skipping the waiting phase");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.claimed.store(true, Ordering::SeqCst);
        info!("Claimed all clients");
        Ok(())
    }
}
