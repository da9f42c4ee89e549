//! Ordered request and response transformation chains.
//!
//! Each interceptor takes ownership of the current value and hands back the value the
//! next one sees, so a later interceptor always observes every earlier change.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::core::config::EffectiveConfig;
use crate::core::error::{BoxError, FetchError, InterceptorPhase};
use crate::core::transport::Response;

/// Rewrites the effective configuration before the transport call.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, config: EffectiveConfig) -> Result<EffectiveConfig, BoxError>;
}

/// Rewrites a completed response before status validation and deserialization.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: Response) -> Result<Response, BoxError>;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(EffectiveConfig) -> Result<EffectiveConfig, BoxError> + Send + Sync,
{
    async fn intercept(&self, config: EffectiveConfig) -> Result<EffectiveConfig, BoxError> {
        self(config)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(Response) -> Result<Response, BoxError> + Send + Sync,
{
    async fn intercept(&self, response: Response) -> Result<Response, BoxError> {
        self(response)
    }
}

/// Registered interceptors. Calls run against a snapshot taken when they start, so
/// registering mid-flight never affects a running request.
#[derive(Default)]
pub struct InterceptorChain {
    request: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("request", &self.request_snapshot().len())
            .field("response", &self.response_snapshot().len())
            .finish()
    }
}

impl InterceptorChain {
    pub fn add_request(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn add_response(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub(crate) fn request_snapshot(&self) -> Vec<Arc<dyn RequestInterceptor>> {
        self.request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn response_snapshot(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        self.response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Run `chain` over `config` in registration order.
///
/// # Errors
/// Returns `EINTERCEPTOR` carrying the failing interceptor's message and the
/// configuration as it stood before that interceptor.
pub async fn run_request_chain(
    chain: &[Arc<dyn RequestInterceptor>],
    mut config: EffectiveConfig,
) -> Result<EffectiveConfig, FetchError> {
    for interceptor in chain {
        let before = config.clone();
        config = interceptor
            .intercept(config)
            .await
            .map_err(|e| FetchError::Interceptor {
                phase: InterceptorPhase::Request,
                message: e.to_string(),
                response: None,
                config: Box::new(before),
            })?;
    }
    Ok(config)
}

/// Run `chain` over `response` in registration order.
///
/// # Errors
/// Returns `EINTERCEPTOR` carrying the failing interceptor's message and the response
/// as processed by the interceptors that ran before it.
pub async fn run_response_chain(
    chain: &[Arc<dyn ResponseInterceptor>],
    mut response: Response,
    config: &EffectiveConfig,
) -> Result<Response, FetchError> {
    for interceptor in chain {
        let before = response.clone();
        response = interceptor
            .intercept(response)
            .await
            .map_err(|e| FetchError::Interceptor {
                phase: InterceptorPhase::Response,
                message: e.to_string(),
                response: Some(Box::new(before)),
                config: Box::new(config.clone()),
            })?;
    }
    Ok(response)
}
