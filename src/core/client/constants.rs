//! Centralized defaults applied when neither the client nor the call configures a field.

use std::time::Duration;

/// UA sent by the default reqwest transport.
pub(crate) const USER_AGENT: &str = concat!("fetchkit/", env!("CARGO_PKG_VERSION"));

/// Per-attempt transport timeout.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Retries after the first try.
pub(crate) const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Multiplier applied to the delay after each failed attempt.
pub(crate) const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Statuses that trigger a retry unless overridden.
pub(crate) const DEFAULT_RETRY_STATUS_CODES: [u16; 2] = [429, 503];

/// Lifetime of a cache entry when caching is switched on without a TTL.
pub(crate) const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);

/// Methods never cached unless the exclusion list is overridden.
pub(crate) const DEFAULT_CACHE_EXCLUDED_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

/// Prefix for keys written to a persistent backend shared with unrelated data.
pub(crate) const CACHE_NAMESPACE: &str = "fetchkit:";
