//! Public client surface + builder.
//! Internals are split into `execute` (per-request state machine), `inflight`
//! (cancellation bookkeeping), `retry` (policy) and `constants` (defaults).

pub(crate) mod constants;
mod execute;
pub mod inflight;
pub mod retry;

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use constants::USER_AGENT;
use inflight::InFlightRegistry;
use retry::RetryConfig;
use url::Url;

use crate::core::cache::{CacheBackend, CacheStore, SledBackend};
use crate::core::config::{CacheConfig, FetchConfig, RequestConfig};
use crate::core::error::FetchError;
use crate::core::interceptors::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
use crate::core::serializer::{ResponseType, Serializer};
use crate::core::transport::{ReqwestTransport, Transport};

/// A configurable, resilient request pipeline over a [`Transport`].
///
/// Cloning is cheap and clones share configuration, interceptors, cache and in-flight
/// bookkeeping.
///
/// # Example
///
/// ```no_run
/// # use fetchkit::{FetchClient, RequestConfig};
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FetchClient::builder()
///     .base_url(url::Url::parse("https://api.example.com/")?)
///     .cache_ttl(Duration::from_secs(5))
///     .build()?;
///
/// let item: serde_json::Value = client.get("/items/1").await?;
/// let created: serde_json::Value = client
///     .execute("/items", RequestConfig::new().method(fetchkit::Method::POST).json(&item)?)
///     .await?;
/// # let _ = created;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    config: Arc<RwLock<FetchConfig>>,
    interceptors: Arc<InterceptorChain>,
    cache: CacheStore,
    in_flight: Arc<InFlightRegistry>,
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config())
            .field("interceptors", &self.interceptors)
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::builder().build().expect("default client")
    }
}

impl FetchClient {
    /// Create a new builder.
    pub fn builder() -> FetchClientBuilder {
        FetchClientBuilder::default()
    }

    /// Build a client with the default transport around `config`.
    ///
    /// # Errors
    /// Returns `ECONFIG` if the HTTP client cannot be constructed.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        Self::builder().config(config).build()
    }

    /// Snapshot of the current client-wide defaults.
    pub fn config(&self) -> FetchConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge `overrides` into the client-wide defaults. Calls already running keep
    /// the configuration they resolved.
    pub fn configure(&self, overrides: RequestConfig) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&overrides);
    }

    /// Append a request interceptor. Interceptors run in registration order.
    pub fn add_request_interceptor(&self, interceptor: impl RequestInterceptor + 'static) {
        self.interceptors.add_request(Arc::new(interceptor));
    }

    /// Append a response interceptor. Interceptors run in registration order.
    pub fn add_response_interceptor(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.interceptors.add_response(Arc::new(interceptor));
    }

    /// Drop every cached response, in memory and in the persistent backend.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Abort every in-flight request. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.in_flight.cancel_all()
    }

    /// Abort the oldest in-flight request for `url`. Relative URLs are resolved
    /// against the current base URL. Returns whether a request was found.
    pub fn cancel_by_url(&self, url: &str) -> bool {
        let resolved = match Url::parse(url) {
            Ok(absolute) => Some(absolute),
            Err(_) => self
                .config()
                .base_url
                .and_then(|base| base.join(url).ok()),
        };
        match resolved {
            Some(resolved) => self.in_flight.cancel_by_url(resolved.as_str()),
            None => self.in_flight.cancel_by_url(url),
        }
    }

    /// Number of transport calls currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct FetchClientBuilder {
    config: FetchConfig,
    user_agent: Option<String>,
    connect_timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    persistent_dir: Option<PathBuf>,
    persistent_backend: Option<Arc<dyn CacheBackend>>,
    persistent_capacity: Option<usize>,
}

impl FetchClientBuilder {
    /// Replace every client-wide default at once.
    pub fn config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    /// Base URL that relative call targets are joined onto.
    pub fn base_url(mut self, url: Url) -> Self {
        self.config.base_url = Some(url);
        self
    }

    /// Per-attempt transport timeout. Default: 5s.
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.config.timeout = dur;
        self
    }

    /// Connect timeout for the default transport. Default: none.
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// Override the User-Agent of the default transport.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.config
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Enable in-memory caching with a default TTL.
    /// If neither this nor [`Self::cache`] is used, caching is disabled.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.enabled = true;
        self.config.cache.ttl = ttl;
        self
    }

    /// Replace the cache settings.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Replace the default retry policy.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = Some(retry);
        self
    }

    /// Turn retries off unless a call opts back in.
    pub fn no_retry(mut self) -> Self {
        self.config.retry = None;
        self
    }

    pub fn response_type(mut self, shape: ResponseType) -> Self {
        self.config.response_type = shape;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.config.serializer = serializer;
        self
    }

    /// Predicate deciding which statuses count as success. Default: `200..300`.
    pub fn validate_status(mut self, validate: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.config.validate_status = Arc::new(validate);
        self
    }

    /// Use a custom transport instead of the reqwest one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Back `StorageKind::Persistent` with a sled database in `dir`.
    pub fn persistent_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persistent_dir = Some(dir.into());
        self
    }

    /// Back `StorageKind::Persistent` with a custom backend. Takes precedence over
    /// [`Self::persistent_cache_dir`].
    pub fn persistent_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.persistent_backend = Some(backend);
        self
    }

    /// Maximum number of entries the sled backend may hold.
    pub fn persistent_capacity(mut self, capacity: usize) -> Self {
        self.persistent_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<FetchClient, FetchError> {
        let transport = match self.transport {
            Some(t) => t,
            None => {
                let mut httpb = reqwest::Client::builder()
                    .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT));
                if let Some(ct) = self.connect_timeout {
                    httpb = httpb.connect_timeout(ct);
                }
                Arc::new(ReqwestTransport::new(httpb.build()?))
            }
        };

        let persistent = match (self.persistent_backend, self.persistent_dir) {
            (Some(backend), _) => Some(backend),
            (None, Some(dir)) => {
                let mut sled = SledBackend::open(&dir).map_err(|e| FetchError::Config {
                    message: format!("cannot open persistent cache at {}: {e}", dir.display()),
                })?;
                if let Some(capacity) = self.persistent_capacity {
                    sled = sled.with_capacity(capacity);
                }
                Some(Arc::new(sled) as Arc<dyn CacheBackend>)
            }
            (None, None) => None,
        };

        Ok(FetchClient {
            transport,
            config: Arc::new(RwLock::new(self.config)),
            interceptors: Arc::new(InterceptorChain::default()),
            cache: CacheStore::new(persistent),
            in_flight: Arc::new(InFlightRegistry::default()),
        })
    }
}
