//! Offline cache layer - the service-worker equivalent.
//!
//! Models the request-interception boundary as explicit request/response
//! types rather than assuming a browser execution context. Navigation and
//! static-asset requests are served stale-while-revalidate with an offline
//! fallback page; API requests are network-first and degrade to a
//! structured "unavailable, queue it" notice the UI turns into a local
//! action log write instead of a hard failure.
//!
//! Caches are versioned: activating a new version deletes every cache that
//! does not match it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How an intercepted request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// A page navigation.
    Navigation,
    /// A static asset (script, stylesheet, image).
    StaticAsset,
    /// A call to the game API.
    Api,
}

/// An intercepted same-origin request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Request URL (used as the cache key).
    pub url: String,
    /// Request classification.
    pub class: RequestClass,
}

impl FetchRequest {
    /// Convenience constructor.
    #[must_use]
    pub fn new(url: impl Into<String>, class: RequestClass) -> Self {
        Self {
            url: url.into(),
            class,
        }
    }
}

/// A response body as held in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type header value.
    pub content_type: String,
    /// Response body.
    pub body: String,
}

impl CachedResponse {
    /// An HTML response with status 200.
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html".into(),
            body: body.into(),
        }
    }
}

/// Why a network fetch failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The network is unreachable or the request failed in transit.
    #[error("network unreachable: {0}")]
    Network(String),
}

/// The network side of the cache layer.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Fetch a request from the network.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] when the request cannot complete.
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError>;
}

/// Where a content response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Fresh from the network.
    Network,
    /// Served from cache.
    Cache,
    /// The designated offline fallback page.
    Fallback,
}

/// A navigation or static-asset response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    /// The response to deliver.
    pub response: CachedResponse,
    /// Where it came from.
    pub source: ServedFrom,
    /// The cached copy may be out of date; the caller should follow up with
    /// [`CacheWorker::revalidate`].
    pub stale: bool,
}

/// Structured notice returned when an API call cannot reach the network.
///
/// The UI writes the mutation into the local action log when it sees this,
/// instead of treating the failure as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedNotice {
    /// Always `"unavailable"`.
    pub error: String,
    /// Marks the response as the queue-it sentinel.
    pub queued: bool,
    /// Human-readable cause.
    pub reason: String,
}

impl QueuedNotice {
    fn new(reason: String) -> Self {
        Self {
            error: "unavailable".into(),
            queued: true,
            reason,
        }
    }
}

/// Result of handling an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandledResponse {
    /// A navigation or static-asset response.
    Content(ServedResponse),
    /// A fresh API response from the network.
    Api(CachedResponse),
    /// The API is unreachable; the caller should queue the mutation locally.
    ApiQueued(QueuedNotice),
}

type CacheMap = HashMap<String, HashMap<String, CachedResponse>>;

/// Versioned response cache with stale-while-revalidate semantics.
pub struct CacheWorker {
    fetcher: Arc<dyn NetworkFetcher>,
    caches: Mutex<CacheMap>,
    version: Mutex<String>,
    fallback: CachedResponse,
}

impl CacheWorker {
    /// Create a worker for the given cache version.
    ///
    /// `fallback` is served for navigations that are neither cached nor
    /// reachable.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        fetcher: Arc<dyn NetworkFetcher>,
        fallback: CachedResponse,
    ) -> Self {
        let version = version.into();
        let mut caches = HashMap::new();
        caches.insert(version.clone(), HashMap::new());
        Self {
            fetcher,
            caches: Mutex::new(caches),
            version: Mutex::new(version),
            fallback,
        }
    }

    /// Current cache version.
    #[must_use]
    pub fn version(&self) -> String {
        self.version
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Whether a URL is cached under the current version.
    #[must_use]
    pub fn is_cached(&self, url: &str) -> bool {
        let version = self.version();
        let caches = self
            .caches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        caches
            .get(&version)
            .is_some_and(|cache| cache.contains_key(url))
    }

    /// Handle an intercepted request.
    pub async fn handle(&self, request: &FetchRequest) -> HandledResponse {
        match request.class {
            RequestClass::Api => self.handle_api(request).await,
            RequestClass::Navigation | RequestClass::StaticAsset => {
                HandledResponse::Content(self.handle_content(request).await)
            }
        }
    }

    /// API requests always go network-first; failure becomes the queue-it
    /// sentinel rather than an error.
    async fn handle_api(&self, request: &FetchRequest) -> HandledResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => HandledResponse::Api(response),
            Err(e) => {
                tracing::debug!(url = %request.url, "API unreachable, returning queued notice: {e}");
                HandledResponse::ApiQueued(QueuedNotice::new(e.to_string()))
            }
        }
    }

    /// Navigations and assets are cache-first. A hit is served immediately
    /// and marked stale so the caller refreshes it in the background; a miss
    /// falls through to the network and, failing that, the offline fallback.
    async fn handle_content(&self, request: &FetchRequest) -> ServedResponse {
        if let Some(cached) = self.lookup(&request.url) {
            return ServedResponse {
                response: cached,
                source: ServedFrom::Cache,
                stale: true,
            };
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&request.url, response.clone());
                ServedResponse {
                    response,
                    source: ServedFrom::Network,
                    stale: false,
                }
            }
            Err(e) => {
                tracing::debug!(url = %request.url, "Offline and uncached, serving fallback: {e}");
                ServedResponse {
                    response: self.fallback.clone(),
                    source: ServedFrom::Fallback,
                    stale: false,
                }
            }
        }
    }

    /// Refresh a cached entry from the network (the revalidate half of
    /// stale-while-revalidate). A failed refresh keeps the cached copy.
    pub async fn revalidate(&self, request: &FetchRequest) {
        match self.fetcher.fetch(request).await {
            Ok(response) => self.store(&request.url, response),
            Err(e) => {
                tracing::debug!(url = %request.url, "Revalidation failed, keeping cached copy: {e}");
            }
        }
    }

    /// Activate a new cache version, deleting every cache that does not
    /// match it.
    pub fn activate(&self, new_version: impl Into<String>) {
        let new_version = new_version.into();
        {
            let mut version = self
                .version
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *version = new_version.clone();
        }
        let mut caches = self
            .caches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = caches.len();
        caches.retain(|version, _| *version == new_version);
        caches.entry(new_version.clone()).or_default();
        tracing::info!(
            version = %new_version,
            deleted = before.saturating_sub(caches.len()),
            "Cache version activated"
        );
    }

    fn lookup(&self, url: &str) -> Option<CachedResponse> {
        let version = self.version();
        let caches = self
            .caches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        caches.get(&version).and_then(|cache| cache.get(url)).cloned()
    }

    fn store(&self, url: &str, response: CachedResponse) {
        let version = self.version();
        let mut caches = self
            .caches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        caches
            .entry(version)
            .or_default()
            .insert(url.to_string(), response);
    }
}

impl std::fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
