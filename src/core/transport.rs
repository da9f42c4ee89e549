//! The primitive HTTP send operation the engine is built on.
//!
//! [`ReqwestTransport`] is the default. Anything implementing [`Transport`] can stand in
//! for it (tests use scripted in-process transports).

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::error::FetchError;

/// Coarse classification of transport failures, used for retry eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The connection dropped mid-request or the transport observed the cancellation token.
    Aborted,
    /// Anything else (invalid header, malformed request, ...).
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Aborted => "aborted",
            Self::Other => "other",
        })
    }
}

/// A failure reported by a [`Transport`] before any response was produced.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A fully resolved request handed to the transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

/// A completed HTTP response with its body fully buffered.
///
/// Cloning is cheap: the body is reference-counted, so interceptors can inspect it
/// without consuming it.
#[derive(Clone, Debug)]
pub struct Response {
    url: String,
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Decode the body as UTF-8 text.
    ///
    /// # Errors
    /// Returns `ESERIALIZE` if the body is not valid UTF-8.
    pub fn text(&self) -> Result<String, FetchError> {
        String::from_utf8(self.body.to_vec()).map_err(FetchError::serialize)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    /// Returns `ESERIALIZE` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(FetchError::serialize)
    }
}

/// The single primitive operation the engine needs from the network layer.
///
/// Implementations should abort promptly once `cancel` is triggered. The engine also
/// races every call against the token, so a transport that ignores it is dropped
/// rather than awaited.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn send_inner(&self, request: TransportRequest) -> Result<Response, TransportError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::new(TransportErrorKind::Other, format!("invalid header name {name}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::new(TransportErrorKind::Other, format!("invalid header value for {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        let mut req = self
            .http
            .request(request.method, request.url.clone())
            .headers(headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let url = resp.url().to_string();
        let body = resp.bytes().await.map_err(classify)?;
        Ok(Response::new(url, status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<Response, TransportError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::new(TransportErrorKind::Aborted, "request aborted")),
            res = self.send_inner(request) => res,
        }
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    let kind = if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_request() || e.is_body() || e.is_timeout() {
        TransportErrorKind::Aborted
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, e.to_string())
}
