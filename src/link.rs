// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Link-layer and liveness hooks.
//!
//! The engine does not own the network link or the process watchdog. It asks
//! a [`LinkMonitor`] whether a network path exists before each request and
//! feeds a [`Liveness`] sink while it blocks, so a host watchdog can tell a
//! slow request from a hung task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Reports whether the network link is usable.
pub trait LinkMonitor: Send + Sync {
    /// Returns true if requests can currently reach the network.
    fn is_link_up(&self) -> bool;
}

/// Receives liveness signals from long-running engine work.
pub trait Liveness: Send + Sync {
    /// Signals that the calling task is still making progress.
    fn feed(&self);
}

impl<T: LinkMonitor + ?Sized> LinkMonitor for Arc<T> {
    fn is_link_up(&self) -> bool {
        (**self).is_link_up()
    }
}

impl<T: Liveness + ?Sized> Liveness for Arc<T> {
    fn feed(&self) {
        (**self).feed();
    }
}

// ============================================================================
// Link monitors
// ============================================================================

/// A link monitor that always reports the link as up.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysUp;

impl LinkMonitor for AlwaysUp {
    fn is_link_up(&self) -> bool {
        true
    }
}

/// A link monitor backed by a shared flag.
///
/// The host's network stack flips the flag; the engine only reads it.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::link::{LinkFlag, LinkMonitor};
///
/// let flag = LinkFlag::new(false);
/// assert!(!flag.is_link_up());
/// flag.set(true);
/// assert!(flag.is_link_up());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkFlag {
    up: Arc<AtomicBool>,
}

impl LinkFlag {
    /// Creates a flag with the given initial state.
    #[must_use]
    pub fn new(up: bool) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(up)),
        }
    }

    /// Updates the link state.
    pub fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

impl LinkMonitor for LinkFlag {
    fn is_link_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Liveness sinks
// ============================================================================

/// A liveness sink that ignores every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLiveness;

impl Liveness for NoopLiveness {
    fn feed(&self) {}
}

/// A liveness sink that counts signals.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct CountingLiveness {
    count: Arc<AtomicU64>,
}

impl CountingLiveness {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times [`Liveness::feed`] was called.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Liveness for CountingLiveness {
    fn feed(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives `fut` to completion, feeding `liveness` every `interval` meanwhile.
///
/// The sink is not fed at entry; callers feed explicitly around the wait.
pub(crate) async fn feed_while<F: Future>(
    liveness: &dyn Liveness,
    interval: Duration,
    fut: F,
) -> F::Output {
    tokio::pin!(fut);
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            out = &mut fut => return out,
            _ = ticker.tick() => liveness.feed(),
        }
    }
}
