//! Core components of the `fetchkit` request pipeline.
//!
//! This module contains the building blocks the engine is assembled from:
//! - The main [`FetchClient`] and its builder.
//! - The primary [`FetchError`] type.
//! - Configuration resolution, caching, interceptors and the transport seam.

/// Response caching: key derivation, backends and the store adapter.
pub mod cache;
/// The main client (`FetchClient`), builder, retry policy and in-flight registry.
pub mod client;
/// Global defaults, per-call overrides and the resolver merging them.
pub mod config;
/// The primary error type (`FetchError`) and its codes.
pub mod error;
/// Request and response interceptor chains.
pub mod interceptors;
/// Body encoding and response decoding.
pub mod serializer;
/// The transport seam and its reqwest implementation.
pub mod transport;

// convenient re-exports so most code can just `use crate::core::FetchClient`
pub use client::retry::RetryConfig;
pub use client::{FetchClient, FetchClientBuilder};
pub use config::{
    CacheConfig, CacheMode, CacheOverride, EffectiveConfig, FetchConfig, RequestConfig,
    RetryOverride, StorageKind,
};
pub use error::{ErrorCode, FetchError};
