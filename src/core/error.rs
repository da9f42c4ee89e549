use thiserror::Error;

use crate::core::config::EffectiveConfig;
use crate::core::transport::{Response, TransportErrorKind};

/// Boxed error returned by caller-supplied interceptors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Machine-readable discriminant carried by every [`FetchError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    /// A request or response interceptor failed.
    Interceptor,
    /// The configured timeout elapsed before the transport completed.
    Timeout,
    /// A response was received but failed status validation.
    Http,
    /// Retry attempts were exhausted.
    Retry,
    /// A retry delay was requested without any retry configuration.
    RetryConfig,
    /// A body could not be encoded or decoded.
    Serialize,
    /// The transport failed before producing a response.
    Transport,
    /// The request was cancelled through the in-flight registry.
    Cancelled,
    /// The client or request configuration is unusable (bad URL, backend init).
    Config,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interceptor => "EINTERCEPTOR",
            Self::Timeout => "ETIMEOUT",
            Self::Http => "EHTTP",
            Self::Retry => "ERETRY",
            Self::RetryConfig => "ERETRYCONFIG",
            Self::Serialize => "ESERIALIZE",
            Self::Transport => "ETRANSPORT",
            Self::Cancelled => "ECANCELLED",
            Self::Config => "ECONFIG",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which interceptor chain raised an [`FetchError::Interceptor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterceptorPhase {
    Request,
    Response,
}

impl std::fmt::Display for InterceptorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Response => "response",
        })
    }
}

/// The error type for every fallible operation in this crate.
///
/// Raw transport and runtime failures are normalized into one of these variants
/// before they reach the retry policy or the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// A request or response interceptor returned an error.
    #[error("{phase} interceptor failed: {message}")]
    Interceptor {
        phase: InterceptorPhase,
        message: String,
        /// The response as it stood before the failing response interceptor ran.
        response: Option<Box<Response>>,
        config: Box<EffectiveConfig>,
    },

    /// The transport did not complete within the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
        config: Box<EffectiveConfig>,
    },

    /// The response status failed the status-validation predicate.
    #[error("unexpected response status: {status} at {url}", url = .response.url())]
    Http {
        status: u16,
        response: Box<Response>,
        config: Box<EffectiveConfig>,
    },

    /// Every allowed retry failed; `last` is the final underlying failure.
    #[error("request failed after {attempts} retries: {last}")]
    Retry {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    /// A retry delay was requested for a call that carries no retry configuration.
    #[error("retry requested but no retry configuration is available")]
    RetryConfig { config: Box<EffectiveConfig> },

    /// A body could not be canonically encoded, or a response could not be decoded.
    #[error("serialization failed: {message}")]
    Serialize {
        message: String,
        config: Option<Box<EffectiveConfig>>,
    },

    /// The transport failed before a response was produced.
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
        config: Box<EffectiveConfig>,
    },

    /// The request was cancelled by the caller.
    #[error("request to {url} was cancelled")]
    Cancelled {
        url: String,
        config: Box<EffectiveConfig>,
    },

    /// The client or request configuration could not be used.
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl FetchError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Interceptor { .. } => ErrorCode::Interceptor,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Http { .. } => ErrorCode::Http,
            Self::Retry { .. } => ErrorCode::Retry,
            Self::RetryConfig { .. } => ErrorCode::RetryConfig,
            Self::Serialize { .. } => ErrorCode::Serialize,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Config { .. } => ErrorCode::Config,
        }
    }

    /// HTTP status associated with the failure, looking through `Retry` wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Interceptor { response, .. } => response.as_ref().map(|r| r.status()),
            Self::Retry { last, .. } => last.status(),
            _ => None,
        }
    }

    /// The effective configuration the failing attempt ran with.
    pub fn config(&self) -> Option<&EffectiveConfig> {
        match self {
            Self::Interceptor { config, .. }
            | Self::Timeout { config, .. }
            | Self::Http { config, .. }
            | Self::RetryConfig { config }
            | Self::Transport { config, .. }
            | Self::Cancelled { config, .. } => Some(config.as_ref()),
            Self::Serialize { config, .. } => config.as_deref(),
            Self::Retry { last, .. } => last.config(),
            Self::Config { .. } => None,
        }
    }

    /// The response kept for diagnostics, when one was received.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(response.as_ref()),
            Self::Interceptor { response, .. } => response.as_deref(),
            Self::Retry { last, .. } => last.response(),
            _ => None,
        }
    }

    pub(crate) fn serialize(err: impl std::fmt::Display) -> Self {
        Self::Serialize {
            message: err.to_string(),
            config: None,
        }
    }

    pub(crate) fn with_config(mut self, effective: &EffectiveConfig) -> Self {
        if let Self::Serialize { config, .. } = &mut self
            && config.is_none()
        {
            *config = Some(Box::new(effective.clone()));
        }
        self
    }
}

impl From<url::ParseError> for FetchError {
    fn from(e: url::ParseError) -> Self {
        Self::Config {
            message: format!("invalid URL: {e}"),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Config {
            message: format!("failed to build HTTP client: {e}"),
        }
    }
}
