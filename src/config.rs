// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static configuration for the sync engine.
//!
//! The configuration is loaded once by an external collaborator and handed
//! to [`SyncEngine`](crate::SyncEngine), which shares it read-only between
//! every component. It can be built in code with the `with_*` methods or
//! deserialized from any serde format; durations are encoded as
//! milliseconds.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::RetryPolicy;
use crate::types::MAX_ENTITY_ID_LEN;

/// Configuration for the sync engine.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::SyncConfig;
/// use std::time::Duration;
///
/// let config = SyncConfig::new("homeassistant.local", "long-lived-token")
///     .with_switches(["switch.pump", "switch.wave_maker", "switch.light"])
///     .with_scene("scene.evening")
///     .with_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.base_url(), "http://homeassistant.local:8123");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    host: String,
    port: u16,
    use_https: bool,
    token: String,
    #[serde(with = "serde_millis")]
    timeout: Duration,
    retry: RetryPolicy,
    #[serde(with = "serde_millis")]
    poll_interval: Duration,
    #[serde(with = "serde_millis")]
    sleep_slice: Duration,
    #[serde(with = "serde_millis")]
    liveness_interval: Duration,
    #[serde(with = "serde_millis")]
    request_spacing: Duration,
    #[serde(with = "serde_millis")]
    failure_spacing: Duration,
    async_parse_threshold: usize,
    #[serde(with = "serde_millis")]
    parse_timeout: Duration,
    max_response_bytes: usize,
    parse_queue_capacity: usize,
    scratch_pool_bytes: usize,
    switches: Vec<String>,
    scene: Option<String>,
    auto_disable_after: Option<u32>,
    refresh_after_command: bool,
}

impl SyncConfig {
    /// Default Home Assistant port.
    pub const DEFAULT_PORT: u16 = 8123;
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Default polling period.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default granularity of the scheduler's sleep.
    pub const DEFAULT_SLEEP_SLICE: Duration = Duration::from_secs(1);
    /// Default interval at which long waits feed the liveness signal.
    pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(1);
    /// Default delay between individual fetches after a success.
    pub const DEFAULT_REQUEST_SPACING: Duration = Duration::from_millis(100);
    /// Default delay between individual fetches after a failure.
    pub const DEFAULT_FAILURE_SPACING: Duration = Duration::from_millis(250);
    /// Payloads above this size are parsed on the background worker.
    pub const DEFAULT_ASYNC_PARSE_THRESHOLD: usize = 16 * 1024;
    /// Default bound on waiting for a background parse.
    pub const DEFAULT_PARSE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default maximum accepted response body.
    pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 128 * 1024;
    /// Default number of outstanding background parse jobs.
    pub const DEFAULT_PARSE_QUEUE_CAPACITY: usize = 2;
    /// Default size of the scratch pool backing background parse jobs.
    pub const DEFAULT_SCRATCH_POOL_BYTES: usize = 256 * 1024;

    /// Creates a configuration for the given server host and bearer token.
    #[must_use]
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables HTTPS.
    #[must_use]
    pub fn with_https(mut self) -> Self {
        self.use_https = true;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy used by every request.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the polling period.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the slice the scheduler sleeps in between liveness feeds.
    #[must_use]
    pub fn with_sleep_slice(mut self, slice: Duration) -> Self {
        self.sleep_slice = slice;
        self
    }

    /// Sets how often long waits feed the liveness signal.
    #[must_use]
    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Sets the delays between individual fetches (after success, after failure).
    #[must_use]
    pub fn with_request_spacing(mut self, after_success: Duration, after_failure: Duration) -> Self {
        self.request_spacing = after_success;
        self.failure_spacing = after_failure;
        self
    }

    /// Sets the payload size above which parsing moves to the background worker.
    #[must_use]
    pub fn with_async_parse_threshold(mut self, bytes: usize) -> Self {
        self.async_parse_threshold = bytes;
        self
    }

    /// Sets how long a caller waits for a background parse.
    #[must_use]
    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = timeout;
        self
    }

    /// Sets the maximum accepted response body size.
    #[must_use]
    pub fn with_max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    /// Sets the background parse queue capacity.
    #[must_use]
    pub fn with_parse_queue_capacity(mut self, capacity: usize) -> Self {
        self.parse_queue_capacity = capacity;
        self
    }

    /// Sets the scratch pool size for background parse jobs.
    #[must_use]
    pub fn with_scratch_pool_bytes(mut self, bytes: usize) -> Self {
        self.scratch_pool_bytes = bytes;
        self
    }

    /// Sets the switch entities to synchronize, in display order.
    #[must_use]
    pub fn with_switches<I, S>(mut self, switches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.switches = switches.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the scene entity triggered by the scene button.
    #[must_use]
    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    /// Disables a switch after `cycles` consecutive failed sync cycles.
    ///
    /// Off by default: failed switches are retried forever.
    #[must_use]
    pub fn with_auto_disable_after(mut self, cycles: u32) -> Self {
        self.auto_disable_after = Some(cycles);
        self
    }

    /// Controls whether a successful command requests an immediate sync.
    #[must_use]
    pub fn with_refresh_after_command(mut self, enabled: bool) -> Self {
        self.refresh_after_command = enabled;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether HTTPS is enabled.
    #[must_use]
    pub fn use_https(&self) -> bool {
        self.use_https
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the polling period.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the scheduler sleep slice.
    #[must_use]
    pub fn sleep_slice(&self) -> Duration {
        self.sleep_slice
    }

    /// Returns the liveness feed interval for long waits.
    #[must_use]
    pub fn liveness_interval(&self) -> Duration {
        self.liveness_interval
    }

    /// Returns the delay between individual fetches after a success.
    #[must_use]
    pub fn request_spacing(&self) -> Duration {
        self.request_spacing
    }

    /// Returns the delay between individual fetches after a failure.
    #[must_use]
    pub fn failure_spacing(&self) -> Duration {
        self.failure_spacing
    }

    /// Returns the async parse threshold in bytes.
    #[must_use]
    pub fn async_parse_threshold(&self) -> usize {
        self.async_parse_threshold
    }

    /// Returns the background parse wait bound.
    #[must_use]
    pub fn parse_timeout(&self) -> Duration {
        self.parse_timeout
    }

    /// Returns the maximum accepted response body size.
    #[must_use]
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Returns the background parse queue capacity.
    #[must_use]
    pub fn parse_queue_capacity(&self) -> usize {
        self.parse_queue_capacity
    }

    /// Returns the scratch pool size.
    #[must_use]
    pub fn scratch_pool_bytes(&self) -> usize {
        self.scratch_pool_bytes
    }

    /// Returns the configured switch entity ids.
    #[must_use]
    pub fn switches(&self) -> &[String] {
        &self.switches
    }

    /// Returns the configured scene entity id.
    #[must_use]
    pub fn scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    /// Returns the auto-disable threshold, if enabled.
    #[must_use]
    pub fn auto_disable_after(&self) -> Option<u32> {
        self.auto_disable_after
    }

    /// Returns whether commands request an immediate sync on success.
    #[must_use]
    pub fn refresh_after_command(&self) -> bool {
        self.refresh_after_command
    }

    /// Builds the base URL from this configuration.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Checks that the configuration can drive the engine.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the host, token or switch list is empty, an
    /// entity id is malformed, or a timing value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("token"));
        }
        if self.switches.is_empty() {
            return Err(ConfigError::MissingField("switches"));
        }
        for id in self.switches.iter().chain(self.scene.iter()) {
            validate_entity_id(id)?;
        }

        check_min("timeout", duration_ms(self.timeout), 1)?;
        check_min("poll_interval", duration_ms(self.poll_interval), 1)?;
        check_min("sleep_slice", duration_ms(self.sleep_slice), 1)?;
        check_min("liveness_interval", duration_ms(self.liveness_interval), 1)?;
        check_min("parse_timeout", duration_ms(self.parse_timeout), 1)?;
        check_min("parse_queue_capacity", self.parse_queue_capacity as u64, 1)?;
        check_min("max_response_bytes", self.max_response_bytes as u64, 2)?;
        if let Some(cycles) = self.auto_disable_after {
            check_min("auto_disable_after", u64::from(cycles), 1)?;
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: Self::DEFAULT_PORT,
            use_https: false,
            token: String::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            sleep_slice: Self::DEFAULT_SLEEP_SLICE,
            liveness_interval: Self::DEFAULT_LIVENESS_INTERVAL,
            request_spacing: Self::DEFAULT_REQUEST_SPACING,
            failure_spacing: Self::DEFAULT_FAILURE_SPACING,
            async_parse_threshold: Self::DEFAULT_ASYNC_PARSE_THRESHOLD,
            parse_timeout: Self::DEFAULT_PARSE_TIMEOUT,
            max_response_bytes: Self::DEFAULT_MAX_RESPONSE_BYTES,
            parse_queue_capacity: Self::DEFAULT_PARSE_QUEUE_CAPACITY,
            scratch_pool_bytes: Self::DEFAULT_SCRATCH_POOL_BYTES,
            switches: Vec::new(),
            scene: None,
            auto_disable_after: None,
            refresh_after_command: true,
        }
    }
}

// The token never reaches logs.
impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("base_url", &self.base_url())
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .field("switches", &self.switches)
            .field("scene", &self.scene)
            .field("auto_disable_after", &self.auto_disable_after)
            .finish_non_exhaustive()
    }
}

fn validate_entity_id(id: &str) -> Result<(), ConfigError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ENTITY_ID_LEN
        && id
            .split_once('.')
            .is_some_and(|(domain, object)| !domain.is_empty() && !object.is_empty())
        && !id.contains(char::is_whitespace)
        && !id.contains('/');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEntityId(id.to_string()))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn check_min(field: &'static str, actual: u64, min: u64) -> Result<(), ConfigError> {
    if actual < min {
        return Err(ConfigError::OutOfRange { field, min, actual });
    }
    Ok(())
}

/// Serde helper encoding a [`Duration`] as whole milliseconds.
pub(crate) mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::duration_ms(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
