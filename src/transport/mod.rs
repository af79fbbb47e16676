// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authenticated, retrying HTTP transport.
//!
//! The transport supports exactly two request shapes against one fixed API:
//!
//! - `GET` state reads (`/api/states`, `/api/states/{entity_id}`)
//! - `POST` service calls (`/api/services/{domain}/{service}`) with a JSON body
//!
//! # Layers
//!
//! - [`HttpBackend`]: performs one attempt. [`ReqwestBackend`] is the real
//!   implementation; tests substitute their own to count attempts.
//! - [`Transport`]: link check, retry loop, liveness feeding, size guard
//!   and status reporting around a backend.
//! - [`RetryPolicy`]: attempt count and backoff shared by every retry loop.

mod client;
#[cfg(feature = "http")]
mod http;
mod retry;

pub use client::Transport;
#[cfg(feature = "http")]
pub use http::ReqwestBackend;
pub use retry::{BackoffKind, RetryPolicy};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;

/// HTTP method used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// State read. Never carries a body.
    Get,
    /// Service call. Always carries a JSON body.
    Post,
}

impl Method {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HttpRequest / HttpResponse
// ============================================================================

/// One fully-resolved request attempt handed to an [`HttpBackend`].
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    base_url: String,
    path: String,
    token: String,
    body: Option<String>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        method: Method,
        base_url: impl Into<String>,
        path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            path: path.into(),
            token: token.into(),
            body: None,
            timeout: crate::config::SyncConfig::DEFAULT_TIMEOUT,
            max_response_bytes: crate::config::SyncConfig::DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum accepted response body size.
    #[must_use]
    pub fn with_max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the base URL (`scheme://host:port`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the full URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the maximum accepted response body size.
    #[must_use]
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Checks the method/body pairing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a GET with a body or a POST without one.
    pub fn validate(&self) -> Result<(), TransportError> {
        match (self.method, self.body.is_some()) {
            (Method::Get, true) => Err(TransportError::InvalidRequest(
                "GET requests cannot carry a body".to_string(),
            )),
            (Method::Post, false) => Err(TransportError::InvalidRequest(
                "POST requests require a body".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url())
            .field("token", &"<redacted>")
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Raw response from one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    reason: Option<String>,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: None,
            body: body.into(),
        }
    }

    /// Sets the reason phrase.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the reason phrase, if the backend supplied one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

// ============================================================================
// HttpBackend
// ============================================================================

/// Performs a single HTTP attempt.
///
/// Implementations do not retry and do not check the link; [`Transport`]
/// does both. They should honor [`HttpRequest::timeout`], although the
/// transport enforces it independently.
pub trait HttpBackend: Send + Sync + 'static {
    /// Sends the request and returns the raw response.
    ///
    /// Non-2xx responses are returned as `Ok`; the transport classifies them.
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<B: HttpBackend> HttpBackend for Arc<B> {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).send(request)
    }
}
