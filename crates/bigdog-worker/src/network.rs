//! Network collaborator and its reqwest implementation

use crate::error::FetchError;
use crate::request::Request;
use async_trait::async_trait;
use cache_storage::ResponseSnapshot;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Method};
use tracing::debug;
use url::Url;

/// Headers that describe a single connection and are never forwarded
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Validators that let the upstream answer `304 Not Modified`. Responses
/// are stored as full snapshots, so a bodiless 304 must never come back.
pub const CONDITIONAL_HEADERS: &[&str] = &[
    "if-none-match",
    "if-modified-since",
    "if-match",
    "if-unmodified-since",
    "if-range",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

pub fn is_conditional(name: &str) -> bool {
    CONDITIONAL_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Whether intermediate caches may answer the fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Default,
    /// Go to the origin, bypassing every cache in between
    NoStore,
}

/// Request/response exchange. Any HTTP status resolves; only transport
/// failures reject.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(
        &self,
        request: &Request,
        mode: CacheMode,
    ) -> Result<ResponseSnapshot, FetchError>;
}

/// Fetches requests over HTTP. Requests for the public origin go to the
/// upstream origin; requests for any other origin go out unchanged.
pub struct HttpNetwork {
    client: Client,
    upstream: Url,
    public_origin: Url,
}

impl HttpNetwork {
    pub fn new(upstream: Url, public_origin: Url) -> Self {
        Self {
            client: Client::new(),
            upstream,
            public_origin,
        }
    }

    /// Move a public-origin URL onto the upstream origin, keeping path and
    /// query. URLs on other origins are returned without their fragment.
    pub fn upstream_url(&self, url: &Url) -> Result<Url, FetchError> {
        if url.origin() != self.public_origin.origin() {
            let mut target = url.clone();
            target.set_fragment(None);
            return Ok(target);
        }
        if self.upstream.cannot_be_a_base() {
            return Err(FetchError::InvalidRequest(format!(
                "upstream {} cannot carry a path",
                self.upstream
            )));
        }
        let mut target = self.upstream.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target.set_fragment(None);
        Ok(target)
    }

    fn forward_headers(request: &Request, mode: CacheMode) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || is_conditional(name) {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                debug!(header = %name, "Dropping unforwardable header");
                continue;
            };
            headers.append(name, value);
        }

        if mode == CacheMode::NoStore {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        headers
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(
        &self,
        request: &Request,
        mode: CacheMode,
    ) -> Result<ResponseSnapshot, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let url = self.upstream_url(&request.url)?;

        debug!(method = %method, url = %url, ?mode, "Fetching from upstream");

        let mut builder = self
            .client
            .request(method, url.clone())
            .headers(Self::forward_headers(request, mode));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status, size = body.len(), "Fetched from upstream");
        Ok(ResponseSnapshot::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::coordinator::{CacheCoordinator, FetchOutcome};
    use crate::scope::LocalScope;
    use crate::testing::{eventually, url, ORIGIN};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::{routing::get, Router};
    use cache_storage::{CacheStorage, MemoryStorage};
    use std::sync::Arc;

    fn network() -> HttpNetwork {
        HttpNetwork::new(
            Url::parse("http://127.0.0.1:8080").unwrap(),
            Url::parse(ORIGIN).unwrap(),
        )
    }

    /// Serve `/` on a local port, answering 304 to any request carrying a
    /// validator and 200 otherwise.
    async fn spawn_upstream() -> Url {
        async fn root(headers: AxumHeaders) -> (StatusCode, &'static str) {
            if headers.contains_key("if-none-match") || headers.contains_key("if-modified-since")
            {
                (StatusCode::NOT_MODIFIED, "")
            } else {
                (StatusCode::OK, "<html>live</html>")
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", get(root));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let url = Url::parse("https://app.example/icons/icon-192.png?v=3#frag").unwrap();
        let target = network().upstream_url(&url).unwrap();
        assert_eq!(
            target.as_str(),
            "http://127.0.0.1:8080/icons/icon-192.png?v=3"
        );
    }

    #[test]
    fn test_other_origins_are_not_rewritten() {
        let url = Url::parse("https://cdn.example/lib.js?v=2#top").unwrap();
        let target = network().upstream_url(&url).unwrap();
        assert_eq!(target.as_str(), "https://cdn.example/lib.js?v=2");
    }

    #[test]
    fn test_forward_headers_drops_conditionals() {
        let request = Request::get(Url::parse("https://app.example/").unwrap())
            .with_header("If-None-Match", "\"abc\"")
            .with_header("If-Modified-Since", "Sat, 07 Feb 2026 10:00:00 GMT")
            .with_header("if-range", "\"abc\"")
            .with_header("Accept", "text/html");

        let headers = HttpNetwork::forward_headers(&request, CacheMode::NoStore);
        assert!(headers.get("if-none-match").is_none());
        assert!(headers.get("if-modified-since").is_none());
        assert!(headers.get("if-range").is_none());
        assert_eq!(headers["accept"], "text/html");
    }

    #[tokio::test]
    async fn test_revalidating_navigation_stores_full_document() {
        let upstream = spawn_upstream().await;
        let storage = Arc::new(MemoryStorage::new());
        let coordinator = CacheCoordinator::new(
            storage.clone(),
            Arc::new(HttpNetwork::new(upstream, Url::parse(ORIGIN).unwrap())),
            Arc::new(LocalScope::new()),
            Url::parse(ORIGIN).unwrap(),
        );
        let request = Request::navigate(url("/"))
            .with_header("If-None-Match", "\"stale\"")
            .with_header("If-Modified-Since", "Sat, 07 Feb 2026 10:00:00 GMT");

        let FetchOutcome::Respond(response) = coordinator.handle_fetch(&request).await else {
            panic!("navigation should be answered by the worker");
        };
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<html>live</html>");

        let cache = coordinator.cache_name();
        let root = coordinator.root_key().unwrap();
        assert!(
            eventually(|| {
                let storage = storage.clone();
                let cache = cache.clone();
                let root = root.clone();
                async move {
                    matches!(
                        storage.match_request(&cache, &root).await,
                        Ok(Some(stored)) if stored.status == 200
                    )
                }
            })
            .await
        );
    }

    #[test]
    fn test_forward_headers_drops_hop_by_hop() {
        let request = Request::get(Url::parse("https://app.example/").unwrap())
            .with_header("Host", "app.example")
            .with_header("Connection", "keep-alive")
            .with_header("Accept", "text/html");

        let headers = HttpNetwork::forward_headers(&request, CacheMode::Default);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept"], "text/html");
    }

    #[test]
    fn test_no_store_sets_cache_headers() {
        let request = Request::get(Url::parse("https://app.example/").unwrap())
            .with_header("cache-control", "max-age=60");

        let headers = HttpNetwork::forward_headers(&request, CacheMode::NoStore);
        assert_eq!(headers[CACHE_CONTROL], "no-store");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers.get_all(CACHE_CONTROL).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_rejects() {
        // Port 9 (discard) is closed on any sane test host
        let network = HttpNetwork::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            Url::parse("https://app.example").unwrap(),
        );
        let request = Request::get(Url::parse("https://app.example/").unwrap());

        let result = network.fetch(&request, CacheMode::Default).await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(is_conditional("If-None-Match"));
        assert!(!is_conditional("accept"));
    }
}
