// --- Release ---

/// Release of the cached asset set. Bump to roll every client onto a fresh cache.
pub const VERSION: &str = "2026-02-08.1";

/// Prefix shared by every cache namespace this worker creates.
pub const CACHE_PREFIX: &str = "bigdog-";

// --- Assets ---

/// Assets that must be cached before the worker can install.
pub const CORE_ASSETS: &[&str] = &["/", "/index.html", "/manifest.json"];

/// Assets cached when available. Missing ones do not block install.
pub const OPTIONAL_ASSETS: &[&str] = &["/icons/icon-192.png", "/icons/icon-512.png"];

/// Key every successful navigation response is stored under.
pub const ROOT_DOCUMENT: &str = "/index.html";

// --- Synthesized responses ---

/// Status of the navigation fallback when nothing is cached.
pub const OFFLINE_STATUS: u16 = 503;

/// Body of the navigation fallback when nothing is cached.
pub const OFFLINE_BODY: &str = "Offline";

/// Status of the asset fallback when the cache misses and the network is down.
pub const ASSET_UNAVAILABLE_STATUS: u16 = 504;

// --- Host ---

/// Path of the host's own health endpoint. Never dispatched to the worker.
pub const HEALTH_PATH: &str = "/__worker/health";
