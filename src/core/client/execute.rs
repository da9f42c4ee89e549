//! Per-request control flow.
//!
//! One logical request runs through: resolve config and cache key, cache lookup,
//! request interceptors, transport call (registered in-flight, raced against the
//! timeout and the cancellation token), response interceptors, status validation,
//! then either success (deserialize, cache write) or the retry decision, which
//! restarts the whole sequence after the backoff delay.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::FetchClient;
use super::inflight::InFlightGuard;
use super::retry;
use crate::core::cache::derive_key;
use crate::core::config::{EffectiveConfig, RequestConfig, resolve};
use crate::core::error::FetchError;
use crate::core::interceptors::{
    RequestInterceptor, ResponseInterceptor, run_request_chain, run_response_chain,
};
use crate::core::transport::{Response, TransportError, TransportRequest};

enum SendOutcome {
    Completed(Result<Response, TransportError>),
    Cancelled,
    TimedOut,
}

impl FetchClient {
    /// Run one logical request and decode the payload into `T`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] describing the terminal failure. Exhausted retries
    /// surface as `ERETRY` wrapping the last attempt's error.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        per_call: RequestConfig,
    ) -> Result<T, FetchError> {
        let (data, config) = self.run(url, per_call).await?;
        serde_json::from_value(data).map_err(|e| FetchError::serialize(e).with_config(&config))
    }

    /// Like [`Self::execute`], returning the payload as produced by the serializer.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn execute_raw(&self, url: &str, per_call: RequestConfig) -> Result<Value, FetchError> {
        self.run(url, per_call).await.map(|(data, _)| data)
    }

    /// The retry loop. Returns the payload with the configuration of the attempt that
    /// produced it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, per_call), err))]
    async fn run(
        &self,
        url: &str,
        per_call: RequestConfig,
    ) -> Result<(Value, EffectiveConfig), FetchError> {
        let request_chain = self.interceptors.request_snapshot();
        let response_chain = self.interceptors.response_snapshot();

        let mut retries: u32 = 0;
        loop {
            let err = match self
                .attempt(url, &per_call, &request_chain, &response_chain)
                .await
            {
                Ok(data) => return Ok(data),
                Err(err) => err,
            };

            let Some(config) = err.config() else {
                return Err(err);
            };
            if !retry::should_retry(&err, config) {
                return Err(err);
            }
            let allowed = config.retry.as_ref().map_or(0, |r| r.attempts);
            if retries >= allowed {
                return Err(FetchError::Retry {
                    attempts: retries,
                    last: Box::new(err),
                });
            }

            let delay = retry::retry_delay(config, retries)?;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                retry = retries + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                code = %err.code(),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    /// `GET url`, decoded into `T`.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.execute(url, RequestConfig::new()).await
    }

    /// `POST url` with a JSON body, decoded into `T`.
    ///
    /// # Errors
    /// See [`Self::execute`]; also `ESERIALIZE` if `body` cannot be encoded.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, FetchError> {
        let per_call = RequestConfig::new().method(reqwest::Method::POST).json(body)?;
        self.execute(url, per_call).await
    }

    /// `PUT url` with a JSON body, decoded into `T`.
    ///
    /// # Errors
    /// See [`Self::post`].
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, FetchError> {
        let per_call = RequestConfig::new().method(reqwest::Method::PUT).json(body)?;
        self.execute(url, per_call).await
    }

    /// `DELETE url`, decoded into `T`.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.execute(url, RequestConfig::new().method(reqwest::Method::DELETE))
            .await
    }

    async fn attempt(
        &self,
        url: &str,
        per_call: &RequestConfig,
        request_chain: &[Arc<dyn RequestInterceptor>],
        response_chain: &[Arc<dyn ResponseInterceptor>],
    ) -> Result<(Value, EffectiveConfig), FetchError> {
        let config = resolve(url, &self.config(), per_call);
        let target = config.target_url()?;
        let key = derive_key(
            &config.method,
            target.as_str(),
            config.body.as_ref(),
            config.cache.storage,
        )
        .map_err(|e| e.with_config(&config))?;

        // cache hits skip interceptors and the transport entirely
        if config.cache.reads(&config.method)
            && let Some(data) = self.cache.get(&key, &config.cache).await
        {
            return Ok((data, config));
        }
        // the key was derived from these settings, so the write must use them too
        let cache = config.cache.clone();
        let method = config.method.clone();

        let config = run_request_chain(request_chain, config).await?;
        let request = build_request(&config)?;

        let response = self.send(request, &config).await?;
        let response = run_response_chain(response_chain, response, &config).await?;

        let status = response.status();
        if !config.is_valid_status(status) {
            return Err(FetchError::Http {
                status,
                response: Box::new(response),
                config: Box::new(config),
            });
        }

        let data = config
            .serializer
            .deserialize(&response, config.response_type)
            .map_err(|e| e.with_config(&config))?;
        if cache.writes(&method) {
            self.cache.set(&key, data.clone(), &cache).await;
        }
        Ok((data, config))
    }

    async fn send(
        &self,
        request: TransportRequest,
        config: &EffectiveConfig,
    ) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        let guard = InFlightGuard::register(&self.in_flight, &url);
        let token = guard.token().clone();

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => SendOutcome::Cancelled,
            res = self.transport.send(request, token.clone()) => SendOutcome::Completed(res),
            () = tokio::time::sleep(config.timeout) => SendOutcome::TimedOut,
        };
        drop(guard);

        match outcome {
            SendOutcome::Completed(Ok(response)) => Ok(response),
            SendOutcome::Completed(Err(e)) => Err(FetchError::Transport {
                kind: e.kind,
                message: e.message,
                config: Box::new(config.clone()),
            }),
            SendOutcome::Cancelled => Err(FetchError::Cancelled {
                url,
                config: Box::new(config.clone()),
            }),
            SendOutcome::TimedOut => {
                token.cancel();
                Err(FetchError::Timeout {
                    timeout_ms: u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
                    config: Box::new(config.clone()),
                })
            }
        }
    }
}

fn build_request(config: &EffectiveConfig) -> Result<TransportRequest, FetchError> {
    let url = config.target_url()?;
    let mut headers = config.headers.clone();
    let body = match &config.body {
        Some(value) => {
            let encoded = config
                .serializer
                .serialize(value)
                .map_err(|e| e.with_config(config))?;
            if let Some(content_type) = config.serializer.content_type() {
                headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| content_type.to_string());
            }
            Some(Bytes::from(encoded))
        }
        None => None,
    };
    Ok(TransportRequest {
        method: config.method.clone(),
        url,
        headers,
        body,
    })
}
