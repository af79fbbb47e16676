// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry loop around an [`HttpBackend`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::link::{LinkMonitor, Liveness, feed_while};
use crate::status::{StatusMachine, SyncStatus};
use crate::transport::{HttpBackend, HttpRequest, Method};

/// Performs logical requests against the automation server.
///
/// One logical request is up to `retry.max_attempts()` attempts. Before each
/// attempt the link is checked; a down link fails immediately with
/// [`TransportError::LinkDown`] without touching the backend.
///
/// State reads (GET) report progress to the status machine: `Syncing` at
/// every attempt start and `SyncFailed` once the request is given up.
/// Service calls (POST) leave the status untouched.
pub struct Transport<B> {
    backend: B,
    config: Arc<SyncConfig>,
    link: Arc<dyn LinkMonitor>,
    liveness: Arc<dyn Liveness>,
    status: Arc<StatusMachine>,
}

impl<B: HttpBackend> Transport<B> {
    /// Creates a transport.
    #[must_use]
    pub fn new(
        backend: B,
        config: Arc<SyncConfig>,
        link: Arc<dyn LinkMonitor>,
        liveness: Arc<dyn Liveness>,
        status: Arc<StatusMachine>,
    ) -> Self {
        Self {
            backend,
            config,
            link,
            liveness,
            status,
        }
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetches `path` with GET and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt, or `LinkDown`.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.request(Method::Get, path, None).await
    }

    /// Posts a JSON body to `path` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt, or `LinkDown`.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, TransportError> {
        self.request(Method::Post, path, Some(body.to_string()))
            .await
    }

    /// Performs one logical request.
    ///
    /// `body` is required for POST and forbidden for GET.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a bad method/body pairing, `LinkDown` if
    /// the link is down before an attempt, `ResponseTooLarge` for an oversize
    /// body, or the error of the final attempt once retries are exhausted.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = HttpRequest::new(
            method,
            self.config.base_url(),
            path,
            self.config.token(),
        )
        .with_timeout(self.config.timeout())
        .with_max_response_bytes(self.config.max_response_bytes());
        if let Some(body) = body {
            request = request.with_body(body);
        }
        request.validate()?;

        let reports_status = method == Method::Get;
        let policy = self.config.retry();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if !self.link.is_link_up() {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    attempt,
                    "Link down, request not sent"
                );
                self.report(reports_status, SyncStatus::SyncFailed);
                return Err(TransportError::LinkDown);
            }

            self.report(reports_status, SyncStatus::Syncing);
            self.liveness.feed();

            tracing::debug!(
                method = %method,
                url = %request.url(),
                attempt,
                max_attempts = policy.max_attempts(),
                "Sending request"
            );

            let started = Instant::now();
            let result = self.attempt(&request).await;
            let elapsed = started.elapsed();
            self.liveness.feed();

            if elapsed > request.timeout() / 2 {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    elapsed_ms = millis(elapsed),
                    timeout_ms = millis(request.timeout()),
                    "Slow request"
                );
            }

            let err = match result {
                Ok(body) => {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        attempt,
                        bytes = body.len(),
                        elapsed_ms = millis(elapsed),
                        "Request succeeded"
                    );
                    return Ok(body);
                }
                Err(err) => err,
            };

            if !err.is_retryable() || !policy.has_attempt_after(attempt) {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    attempt,
                    error = %err,
                    "Request failed"
                );
                self.report(reports_status, SyncStatus::SyncFailed);
                return Err(err);
            }

            let delay = policy.delay_for_attempt(attempt);
            tracing::debug!(
                method = %method,
                path = %path,
                attempt,
                error = %err,
                delay_ms = millis(delay),
                "Request attempt failed, retrying"
            );
            self.liveness.feed();
            feed_while(
                self.liveness.as_ref(),
                self.config.liveness_interval(),
                tokio::time::sleep(delay),
            )
            .await;
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<Vec<u8>, TransportError> {
        let timeout = request.timeout();
        let send = tokio::time::timeout(timeout, self.backend.send(request));
        let response = feed_while(self.liveness.as_ref(), self.config.liveness_interval(), send)
            .await
            .map_err(|_| TransportError::Timeout(millis(timeout)))??;

        if !response.is_success() {
            return Err(TransportError::HttpStatus {
                status: response.status(),
                reason: response.reason().unwrap_or("Unknown").to_string(),
            });
        }

        let size = response.body().len();
        if size > request.max_response_bytes() {
            return Err(TransportError::ResponseTooLarge {
                size,
                limit: request.max_response_bytes(),
            });
        }

        Ok(response.into_body())
    }

    fn report(&self, enabled: bool, status: SyncStatus) {
        if enabled {
            self.status.change(status);
        }
    }
}

impl<B> std::fmt::Debug for Transport<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.config.base_url())
            .field("retry", self.config.retry())
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
