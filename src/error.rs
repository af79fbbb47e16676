// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `hass_sync_lib` crate.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`TransportError`]: a logical HTTP request failed (link down, timeout,
//!   non-2xx status, ...)
//! - [`ParseError`]: an entity-state payload could not be decoded, or the
//!   background parser declined or lost a job
//! - [`ConfigError`]: the injected configuration record is unusable
//!
//! Transport and parser errors never cross task boundaries on their own; they
//! are returned to the scheduler or the command dispatcher, which decide what
//! to do with them.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A request against the automation server failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A state payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The configuration record is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The switch is not part of the configured switch list.
    #[error("unknown switch: {0}")]
    UnknownSwitch(String),

    /// The switch was disabled after repeated sync failures.
    #[error("switch {0} is disabled after repeated sync failures")]
    SwitchDisabled(String),

    /// No scene entity is configured.
    #[error("no scene entity configured")]
    NoSceneConfigured,

    /// The engine has not been started or has been shut down.
    #[error("sync engine is not running")]
    NotRunning,
}

/// Errors produced by a single logical HTTP request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link layer reports no network path. Never retried.
    #[error("network link is down")]
    LinkDown,

    /// The request did not complete within the per-request timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The connection could not be established or broke mid-request.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} - {reason}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        reason: String,
    },

    /// The response body exceeded the configured maximum size.
    #[error("response of {size} bytes exceeds limit of {limit} bytes")]
    ResponseTooLarge {
        /// Size of the received body.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The request itself was malformed (e.g. a GET with a body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Low-level HTTP client error.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Returns true if another attempt could succeed.
    ///
    /// `LinkDown`, oversize bodies and malformed requests fail the same way
    /// every time, so the retry loop stops on them immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LinkDown | Self::ResponseTooLarge { .. } | Self::InvalidRequest(_) => false,
            Self::Timeout(_) | Self::ConnectFailed(_) | Self::HttpStatus { .. } => true,
            #[cfg(feature = "http")]
            Self::Http(_) => true,
        }
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            #[cfg(feature = "http")]
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Errors related to decoding entity-state payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is JSON but not an entity object or array of them.
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// The background parse queue is full.
    #[error("parse queue is full")]
    QueueFull,

    /// The scratch pool cannot hold a copy of the payload.
    #[error("scratch pool exhausted: requested {requested} bytes, {available} available")]
    PoolExhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes still available in the pool.
        available: usize,
    },

    /// The background worker has stopped.
    #[error("parse worker is not running")]
    WorkerUnavailable,

    /// The background parse did not complete in time.
    #[error("background parse timed out after {0} ms")]
    Timeout(u64),
}

/// Errors in the injected configuration record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An entity id is empty, too long, or not of the form `domain.object`.
    #[error("invalid entity id: {0:?}")]
    InvalidEntityId(String),

    /// A numeric setting is out of its allowed range.
    #[error("{field} must be at least {min}, got {actual}")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// Minimum allowed value.
        min: u64,
        /// The value that was provided.
        actual: u64,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
