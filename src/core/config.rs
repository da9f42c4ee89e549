//! Global defaults, per-call overrides, and the merge that turns them into one
//! [`EffectiveConfig`].
//!
//! Merging is shallow and field-by-field: a per-call field replaces the global one, an
//! absent per-call field keeps it. The nested `cache` and `retry` groups merge the same
//! way, so overriding `retry.attempts` never resets `retry.delay`. Headers are combined
//! by name, with per-call values winning.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::core::client::constants::{
    DEFAULT_CACHE_EXCLUDED_METHODS, DEFAULT_CACHE_TTL, DEFAULT_TIMEOUT,
};
use crate::core::client::retry::RetryConfig;
use crate::core::error::FetchError;
use crate::core::serializer::{JsonSerializer, ResponseType, Serializer};

/// Predicate deciding whether a response status counts as success.
pub type StatusValidator = Arc<dyn Fn(u16) -> bool + Send + Sync>;

fn default_validator() -> StatusValidator {
    Arc::new(|status| (200..300).contains(&status))
}

/// Where cached responses are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// A map owned by the client instance.
    #[default]
    Memory,
    /// The durable backend configured on the client builder.
    Persistent,
}

/// Defines how a call interacts with the cache when caching is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read a valid entry if present; otherwise fetch and write the response. (Default)
    #[default]
    Use,
    /// Always fetch, then overwrite the cached entry.
    Refresh,
    /// Neither read nor write the cache for this call.
    Bypass,
}

/// Response cache settings. `ttl` and `storage` only matter when `enabled` is true.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub storage: StorageKind,
    pub exclude_methods: Vec<Method>,
    pub mode: CacheMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: DEFAULT_CACHE_TTL,
            storage: StorageKind::Memory,
            exclude_methods: DEFAULT_CACHE_EXCLUDED_METHODS
                .iter()
                .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
                .collect(),
            mode: CacheMode::Use,
        }
    }
}

impl CacheConfig {
    fn active_for(&self, method: &Method) -> bool {
        self.enabled && self.mode != CacheMode::Bypass && !self.exclude_methods.contains(method)
    }

    /// Whether a call with `method` may be answered from the cache.
    pub fn reads(&self, method: &Method) -> bool {
        self.active_for(method) && self.mode == CacheMode::Use
    }

    /// Whether a successful call with `method` is written to the cache.
    pub fn writes(&self, method: &Method) -> bool {
        self.active_for(method)
    }
}

/// Partial cache settings; `None` fields keep the inherited value.
#[derive(Clone, Debug, Default)]
pub struct CacheOverride {
    pub enabled: Option<bool>,
    pub ttl: Option<Duration>,
    pub storage: Option<StorageKind>,
    pub exclude_methods: Option<Vec<Method>>,
    pub mode: Option<CacheMode>,
}

impl CacheOverride {
    fn apply(&self, base: &CacheConfig) -> CacheConfig {
        CacheConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            ttl: self.ttl.unwrap_or(base.ttl),
            storage: self.storage.unwrap_or(base.storage),
            exclude_methods: self
                .exclude_methods
                .clone()
                .unwrap_or_else(|| base.exclude_methods.clone()),
            mode: self.mode.unwrap_or(base.mode),
        }
    }
}

/// Partial retry settings; `None` fields keep the inherited value.
#[derive(Clone, Debug, Default)]
pub struct RetryOverride {
    pub attempts: Option<u32>,
    pub delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_factor: Option<f64>,
    pub status_codes: Option<Vec<u16>>,
    pub retry_on_timeout: Option<bool>,
    pub retry_on_connect: Option<bool>,
}

impl RetryOverride {
    fn apply(&self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            attempts: self.attempts.unwrap_or(base.attempts),
            delay: self.delay.unwrap_or(base.delay),
            max_delay: self.max_delay.or(base.max_delay),
            backoff_factor: self.backoff_factor.unwrap_or(base.backoff_factor),
            status_codes: self.status_codes.clone().unwrap_or(base.status_codes),
            retry_on_timeout: self.retry_on_timeout.unwrap_or(base.retry_on_timeout),
            retry_on_connect: self.retry_on_connect.unwrap_or(base.retry_on_connect),
        }
    }
}

/// Client-wide defaults. Every field already carries its built-in default.
#[derive(Clone)]
pub struct FetchConfig {
    pub base_url: Option<Url>,
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
    pub cache: CacheConfig,
    /// `None` disables retries unless a call opts back in with a retry override.
    pub retry: Option<RetryConfig>,
    pub response_type: ResponseType,
    pub serializer: Arc<dyn Serializer>,
    pub validate_status: StatusValidator,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
            cache: CacheConfig::default(),
            retry: Some(RetryConfig::default()),
            response_type: ResponseType::Json,
            serializer: Arc::new(JsonSerializer),
            validate_status: default_validator(),
        }
    }
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

impl FetchConfig {
    /// Fold `overrides` into these defaults. Request-only fields (method, body) are ignored.
    pub fn merge(&mut self, overrides: &RequestConfig) {
        if let Some(base_url) = &overrides.base_url {
            self.base_url = Some(base_url.clone());
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = timeout;
        }
        self.headers.extend(overrides.headers.clone());
        self.cache = overrides.cache.apply(&self.cache);
        self.retry = merge_retry(self.retry.as_ref(), overrides);
        if let Some(shape) = overrides.response_type {
            self.response_type = shape;
        }
        if let Some(serializer) = &overrides.serializer {
            self.serializer = Arc::clone(serializer);
        }
        if let Some(validate) = &overrides.validate_status {
            self.validate_status = Arc::clone(validate);
        }
    }
}

fn merge_retry(global: Option<&RetryConfig>, overrides: &RequestConfig) -> Option<RetryConfig> {
    if overrides.retry_disabled {
        return None;
    }
    match &overrides.retry {
        Some(partial) => Some(partial.apply(global.cloned().unwrap_or_default())),
        None => global.cloned(),
    }
}

/// Per-call overrides. Everything is optional; see the module docs for merge rules.
#[derive(Clone, Default)]
pub struct RequestConfig {
    pub(crate) method: Option<Method>,
    pub(crate) body: Option<Value>,
    pub(crate) base_url: Option<Url>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) cache: CacheOverride,
    pub(crate) retry: Option<RetryOverride>,
    pub(crate) retry_disabled: bool,
    pub(crate) response_type: Option<ResponseType>,
    pub(crate) serializer: Option<Arc<dyn Serializer>>,
    pub(crate) validate_status: Option<StatusValidator>,
}

impl std::fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("body", &self.body)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("retry_disabled", &self.retry_disabled)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Attach a body, canonicalized to a JSON value up front.
    ///
    /// # Errors
    /// Returns `ESERIALIZE` if `body` has no JSON representation (for example a map
    /// with non-string keys).
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, FetchError> {
        self.body = Some(serde_json::to_value(body).map_err(FetchError::serialize)?);
        Ok(self)
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a header. Names are case-insensitive and stored lowercased.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheOverride) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn cache_storage(mut self, storage: StorageKind) -> Self {
        self.cache.storage = Some(storage);
        self
    }

    #[must_use]
    pub const fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn exclude_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.cache.exclude_methods = Some(methods.into_iter().collect());
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryOverride) -> Self {
        self.retry = Some(retry);
        self.retry_disabled = false;
        self
    }

    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.get_or_insert_with(RetryOverride::default).attempts = Some(attempts);
        self.retry_disabled = false;
        self
    }

    #[must_use]
    pub fn retry_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry.get_or_insert_with(RetryOverride::default).status_codes =
            Some(codes.into_iter().collect());
        self.retry_disabled = false;
        self
    }

    /// Turn retries off for this call regardless of the client defaults.
    #[must_use]
    pub fn no_retry(mut self) -> Self {
        self.retry = None;
        self.retry_disabled = true;
        self
    }

    #[must_use]
    pub const fn response_type(mut self, shape: ResponseType) -> Self {
        self.response_type = Some(shape);
        self
    }

    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    #[must_use]
    pub fn validate_status(mut self, validate: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.validate_status = Some(Arc::new(validate));
        self
    }
}

/// The fully merged configuration for one call. Request interceptors receive and
/// return this value.
#[derive(Clone)]
pub struct EffectiveConfig {
    /// The call target as passed by the caller, absolute or relative to `base_url`.
    pub url: String,
    pub base_url: Option<Url>,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub cache: CacheConfig,
    pub retry: Option<RetryConfig>,
    pub response_type: ResponseType,
    pub serializer: Arc<dyn Serializer>,
    pub validate_status: StatusValidator,
}

impl std::fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("url", &self.url)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

impl EffectiveConfig {
    /// Resolve `url` against `base_url`. Absolute URLs ignore the base.
    ///
    /// # Errors
    /// Returns `ECONFIG` if the URL is relative with no base, or unparsable.
    pub fn target_url(&self) -> Result<Url, FetchError> {
        match Url::parse(&self.url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => Ok(base.join(&self.url)?),
                None => Err(FetchError::Config {
                    message: format!("relative URL {} with no base URL configured", self.url),
                }),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_valid_status(&self, status: u16) -> bool {
        (self.validate_status)(status)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        resolve("http://localhost/test", &FetchConfig::default(), &RequestConfig::default())
    }
}

/// Merge client defaults with per-call overrides. Pure; never fails.
pub fn resolve(url: &str, global: &FetchConfig, per_call: &RequestConfig) -> EffectiveConfig {
    let mut headers = global.headers.clone();
    headers.extend(per_call.headers.clone());

    EffectiveConfig {
        url: url.to_string(),
        base_url: per_call.base_url.clone().or_else(|| global.base_url.clone()),
        method: per_call.method.clone().unwrap_or(Method::GET),
        headers,
        body: per_call.body.clone(),
        timeout: per_call.timeout.unwrap_or(global.timeout),
        cache: per_call.cache.apply(&global.cache),
        retry: merge_retry(global.retry.as_ref(), per_call),
        response_type: per_call.response_type.unwrap_or(global.response_type),
        serializer: per_call
            .serializer
            .clone()
            .unwrap_or_else(|| Arc::clone(&global.serializer)),
        validate_status: per_call
            .validate_status
            .clone()
            .unwrap_or_else(|| Arc::clone(&global.validate_status)),
    }
}
