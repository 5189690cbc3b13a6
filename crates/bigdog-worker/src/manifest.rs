//! The versioned asset set a worker caches

use crate::constants::{CACHE_PREFIX, CORE_ASSETS, OPTIONAL_ASSETS, ROOT_DOCUMENT, VERSION};

/// Release tag plus the assets cached for it.
///
/// `Default` is the compiled-in release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    pub version: String,
    pub prefix: String,
    pub core: Vec<String>,
    pub optional: Vec<String>,
    pub root_document: String,
}

impl AssetManifest {
    /// Namespace this release's cache lives in
    pub fn cache_name(&self) -> String {
        format!("{}{}", self.prefix, self.version)
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            version: VERSION.to_string(),
            prefix: CACHE_PREFIX.to_string(),
            core: CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
            optional: OPTIONAL_ASSETS.iter().map(|s| s.to_string()).collect(),
            root_document: ROOT_DOCUMENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = AssetManifest::default();
        assert_eq!(manifest.cache_name(), "bigdog-2026-02-08.1");
        assert_eq!(manifest.core, vec!["/", "/index.html", "/manifest.json"]);
        assert_eq!(manifest.optional.len(), 2);
        assert!(manifest.optional.iter().all(|p| p.starts_with("/icons/")));
        assert_eq!(manifest.root_document, "/index.html");
    }
}
