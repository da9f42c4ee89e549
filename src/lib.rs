//! fetchkit: a resilient request pipeline over a primitive HTTP transport.
//!
//! A [`FetchClient`] turns a single `send` operation into a configurable pipeline:
//! global and per-call configuration merging, response caching with expiry,
//! exponential-backoff retry, request/response interceptors, per-attempt timeouts,
//! and cancellation of in-flight requests.
//!
//! ```no_run
//! use std::time::Duration;
//! use fetchkit::{FetchClient, RequestConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), fetchkit::FetchError> {
//! let client = FetchClient::builder()
//!     .base_url(url::Url::parse("https://api.example.com/").expect("static url"))
//!     .timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! let data: serde_json::Value = client
//!     .execute("/data", RequestConfig::new().cache_enabled(true).retry_status_codes([503]))
//!     .await?;
//! println!("{data}");
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::cache::{CacheBackend, CacheEntry, CacheError, MemoryBackend, SledBackend};
pub use crate::core::client::inflight::{InFlightRegistry, InFlightRequest};
pub use crate::core::client::retry::{next_delay, retry_delay, should_retry};
pub use crate::core::config::resolve;
pub use crate::core::error::{BoxError, InterceptorPhase};
pub use crate::core::interceptors::{RequestInterceptor, ResponseInterceptor};
pub use crate::core::serializer::{JsonSerializer, ResponseType, Serializer};
pub use crate::core::transport::{
    ReqwestTransport, Response, Transport, TransportError, TransportErrorKind, TransportRequest,
};
pub use crate::core::{
    CacheConfig, CacheMode, CacheOverride, EffectiveConfig, ErrorCode, FetchClient,
    FetchClientBuilder, FetchConfig, FetchError, RequestConfig, RetryConfig, RetryOverride,
    StorageKind,
};

pub use reqwest::Method;

/// Re-exported so custom transports can take the same cancellation handle.
pub use tokio_util::sync::CancellationToken;

/// Install an `env-filter` fmt subscriber (`RUST_LOG` controls verbosity).
/// Safe to call more than once; later calls are no-ops.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
