//! Namespaced request/response cache storage
//!
//! Stores captured responses keyed by request identity, grouped into named
//! namespaces that can be enumerated and deleted as a whole. Two backends are
//! provided: an in-memory store backed by moka async caches, and a file-backed
//! store that persists entries to disk.

pub mod error;
mod file;
mod memory;
mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use storage::CacheStorage;
pub use types::{NamespaceStats, RequestKey, ResponseSnapshot};
