// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! reqwest-backed [`HttpBackend`].

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::TransportError;
use crate::transport::{HttpBackend, HttpRequest, HttpResponse, Method};

/// HTTP backend using `reqwest`.
///
/// GET requests share one persistent client (and its keep-alive connection
/// pool) per base URL; the client is rebuilt only when the base URL changes.
/// Every POST attempt uses a freshly built client with no idle pooling.
/// The timeout is taken from each [`HttpRequest`], not from the client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use hass_sync_lib::{SyncConfig, SyncEngine};
/// use hass_sync_lib::transport::ReqwestBackend;
///
/// # fn example() -> hass_sync_lib::Result<()> {
/// let config = SyncConfig::new("192.168.1.20", "long-lived-token")
///     .with_switches(["switch.pump", "switch.fan"]);
/// let engine = SyncEngine::builder(config, ReqwestBackend::new()).build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ReqwestBackend {
    read_client: Mutex<Option<(String, Client)>>,
}

impl ReqwestBackend {
    /// Keep-alive probe interval for the persistent read connection.
    pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

    /// Creates a backend. Clients are built lazily on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the base URL of the current persistent read client, if any.
    #[must_use]
    pub fn read_base_url(&self) -> Option<String> {
        self.read_client.lock().as_ref().map(|(base, _)| base.clone())
    }

    fn read_client(&self, request: &HttpRequest) -> Result<Client, TransportError> {
        let mut slot = self.read_client.lock();
        if let Some((base, client)) = slot.as_ref()
            && base == request.base_url()
        {
            return Ok(client.clone());
        }

        if let Some((old, _)) = slot.as_ref() {
            tracing::debug!(old = %old, new = %request.base_url(), "Base URL changed, recreating read client");
        }
        let client = Client::builder()
            .tcp_keepalive(Self::KEEP_ALIVE)
            .pool_max_idle_per_host(1)
            .build()?;
        *slot = Some((request.base_url().to_string(), client.clone()));
        Ok(client)
    }

    fn write_client() -> Result<Client, TransportError> {
        Ok(Client::builder()
            .pool_max_idle_per_host(0)
            .build()?)
    }
}

impl HttpBackend for ReqwestBackend {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url();
        let builder = match request.method() {
            Method::Get => self.read_client(request)?.get(&url),
            Method::Post => Self::write_client()?
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(request.body().unwrap_or_default().to_string()),
        };

        let response = builder
            .timeout(request.timeout())
            .bearer_auth(request.token())
            .send()
            .await
            .map_err(|e| classify(e, request.timeout()))?;

        let status = response.status();
        if let Some(length) = response.content_length()
            && usize::try_from(length).unwrap_or(usize::MAX) > request.max_response_bytes()
        {
            return Err(TransportError::ResponseTooLarge {
                size: usize::try_from(length).unwrap_or(usize::MAX),
                limit: request.max_response_bytes(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, request.timeout()))?;

        tracing::debug!(status = status.as_u16(), bytes = body.len(), "Received HTTP response");

        Ok(HttpResponse::new(status.as_u16(), body.to_vec())
            .with_reason(status.canonical_reason().unwrap_or("Unknown")))
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
    } else if err.is_connect() {
        TransportError::ConnectFailed(err.to_string())
    } else {
        TransportError::Http(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_client_is_reused_per_base_url() {
        let backend = ReqwestBackend::new();
        let a = HttpRequest::new(Method::Get, "http://a:8123", "/api/states", "t");
        let b = HttpRequest::new(Method::Get, "http://b:8123", "/api/states", "t");

        backend.read_client(&a).unwrap();
        assert_eq!(backend.read_base_url().as_deref(), Some("http://a:8123"));
        backend.read_client(&a).unwrap();
        assert_eq!(backend.read_base_url().as_deref(), Some("http://a:8123"));
        backend.read_client(&b).unwrap();
        assert_eq!(backend.read_base_url().as_deref(), Some("http://b:8123"));
    }
}
