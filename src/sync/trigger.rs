// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Immediate-sync request flag.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-flag "sync now" request.
///
/// Any number of requests before the scheduler looks collapse into one
/// cycle. Raising the flag also wakes a scheduler that is sleeping between
/// cycles.
#[derive(Debug, Default)]
pub struct SyncTrigger {
    requested: AtomicBool,
    notify: Notify,
}

impl SyncTrigger {
    /// Creates a lowered trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes the scheduler.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Lowers the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Returns true if a sync was requested and not yet taken.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Completes after the next [`request`](Self::request).
    ///
    /// A request made while nobody waits is remembered for the next caller.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
