//! Big Dog offline cache worker
//!
//! Keeps a versioned cache of the app shell and answers the page's requests:
//! navigations go to the network first and fall back to the cached shell,
//! static assets are served from the cache first. The `server` module hosts
//! the worker behind an HTTP listener in front of an upstream origin.

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod manifest;
pub mod network;
pub mod request;
pub mod scope;
pub mod server;

#[cfg(test)]
mod testing;

pub use coordinator::{ActivationReport, CacheCoordinator, FetchOutcome};
pub use error::{FetchError, Result, WorkerError};
pub use events::{Dispatcher, EventKind, ExtendableEvent, FetchEvent};
pub use manifest::AssetManifest;
pub use network::{CacheMode, HttpNetwork, Network};
pub use request::{classify, Request, RequestClass, RequestMode};
pub use scope::{LocalScope, WorkerScope};
