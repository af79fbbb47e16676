// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synchronization status state machine.
//!
//! [`StatusMachine`] holds the single current [`SyncStatus`]. Writers call
//! [`StatusMachine::change`]; a value equal to the current one is ignored, so
//! observers see each distinct transition exactly once.
//!
//! Observers either register the single status callback or poll a
//! [`tokio::sync::watch`] receiver.
//!
//! ```text
//! Offline -> Syncing -> {Ready | StatesSynced | PartialSync | SyncFailed} -> Syncing -> ...
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::subscription::SubscriptionId;

/// Current synchronization health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not initialized, or shut down.
    #[default]
    Offline,
    /// A request against the server is in flight.
    Syncing,
    /// Initialized and idle.
    Ready,
    /// Every configured entity was read back.
    StatesSynced,
    /// Some configured entities were read back.
    PartialSync,
    /// No configured entity could be read back.
    SyncFailed,
}

impl SyncStatus {
    /// Returns the user-facing status text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Syncing => "Syncing...",
            Self::Ready => "Ready",
            Self::StatesSynced => "States Synced",
            Self::PartialSync => "Partial Sync",
            Self::SyncFailed => "Sync Failed",
        }
    }

    /// Returns true for `Ready` and `StatesSynced`.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::StatesSynced)
    }

    /// Returns true for `Syncing`.
    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status transition, as delivered to the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    previous: SyncStatus,
    status: SyncStatus,
}

impl StatusUpdate {
    /// Returns the status before the transition.
    #[must_use]
    pub fn previous(&self) -> SyncStatus {
        self.previous
    }

    /// Returns the new status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Returns true if the new status counts as ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Returns true if a sync is in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.status.is_syncing()
    }

    /// Returns the user-facing status text.
    #[must_use]
    pub fn text(&self) -> &'static str {
        self.status.as_str()
    }
}

type StatusCallback = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

struct Inner {
    current: SyncStatus,
    callback: Option<(SubscriptionId, StatusCallback)>,
    pending: VecDeque<StatusUpdate>,
}

/// Holds the current [`SyncStatus`] and notifies one observer of changes.
///
/// The lock guards only the value update. Callbacks run with no lock held,
/// in the order the changes were made; a callback that calls back into
/// [`change`](Self::change) has its own transition queued behind the one
/// being delivered.
pub struct StatusMachine {
    inner: Mutex<Inner>,
    dispatching: AtomicBool,
    watch_tx: watch::Sender<SyncStatus>,
}

impl StatusMachine {
    /// Creates a machine in the `Offline` state.
    #[must_use]
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(SyncStatus::Offline);
        Self {
            inner: Mutex::new(Inner {
                current: SyncStatus::Offline,
                callback: None,
                pending: VecDeque::new(),
            }),
            dispatching: AtomicBool::new(false),
            watch_tx,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn current(&self) -> SyncStatus {
        self.inner.lock().current
    }

    /// Moves to `status`, notifying the observer if the value changed.
    ///
    /// Returns `true` if a transition happened.
    pub fn change(&self, status: SyncStatus) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.current == status {
                return false;
            }
            let update = StatusUpdate {
                previous: inner.current,
                status,
            };
            inner.current = status;
            inner.pending.push_back(update);
            self.watch_tx.send_replace(status);
            tracing::debug!(from = %update.previous, to = %status, "Sync status changed");
        }
        self.drain();
        true
    }

    /// Returns to `Offline`.
    pub fn deinit(&self) {
        self.change(SyncStatus::Offline);
    }

    /// Sets the status callback, replacing any previous one.
    pub fn register_callback<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        let replaced = self
            .inner
            .lock()
            .callback
            .replace((id, Arc::new(callback)));
        if let Some((old, _)) = replaced {
            tracing::debug!(old = %old, new = %id, "Status callback replaced");
        }
        id
    }

    /// Removes the status callback, whatever its id.
    pub fn clear_callback(&self) {
        self.inner.lock().callback = None;
    }

    /// Removes the status callback if it is the one identified by `id`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.callback.as_ref().is_some_and(|(current, _)| *current == id) {
            inner.callback = None;
            true
        } else {
            false
        }
    }

    /// Returns true if a status callback is registered.
    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.inner.lock().callback.is_some()
    }

    /// Returns the id of the registered status callback.
    #[must_use]
    pub fn callback_id(&self) -> Option<SubscriptionId> {
        self.inner.lock().callback.as_ref().map(|(id, _)| *id)
    }

    /// Returns a receiver that always holds the latest status.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.watch_tx.subscribe()
    }

    // Delivers queued updates. Only one caller drains at a time; the others
    // leave their update in the queue for it.
    fn drain(&self) {
        loop {
            if self
                .dispatching
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            {
                let _guard = DispatchGuard(&self.dispatching);
                loop {
                    let next = {
                        let mut inner = self.inner.lock();
                        let update = inner.pending.pop_front();
                        update.map(|update| {
                            let callback = inner.callback.as_ref().map(|(_, cb)| Arc::clone(cb));
                            (update, callback)
                        })
                    };
                    match next {
                        Some((update, Some(callback))) => callback(&update),
                        Some((_, None)) => {}
                        None => break,
                    }
                }
            }
            // A change may have been queued between the last pop and the
            // flag reset.
            if self.inner.lock().pending.is_empty() {
                return;
            }
        }
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StatusMachine")
            .field("current", &inner.current)
            .field("has_callback", &inner.callback.is_some())
            .finish_non_exhaustive()
    }
}

struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn recorder(machine: &StatusMachine) -> Arc<Mutex<Vec<StatusUpdate>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        machine.register_callback(move |update| sink.lock().push(*update));
        seen
    }

    #[test]
    fn starts_offline() {
        let machine = StatusMachine::new();
        assert_eq!(machine.current(), SyncStatus::Offline);
        assert!(!machine.has_callback());
    }

    #[test]
    fn same_status_notifies_once() {
        let machine = StatusMachine::new();
        let seen = recorder(&machine);

        assert!(machine.change(SyncStatus::Syncing));
        assert!(!machine.change(SyncStatus::Syncing));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].previous(), SyncStatus::Offline);
        assert!(seen[0].is_syncing());
        assert_eq!(seen[0].text(), "Syncing...");
    }

    #[test]
    fn derived_flags() {
        assert!(SyncStatus::Ready.is_ready());
        assert!(SyncStatus::StatesSynced.is_ready());
        assert!(!SyncStatus::PartialSync.is_ready());
        assert!(!SyncStatus::SyncFailed.is_ready());
        assert!(SyncStatus::Syncing.is_syncing());
        assert!(!SyncStatus::Ready.is_syncing());
    }

    #[test]
    fn status_texts() {
        let texts: Vec<_> = [
            SyncStatus::Offline,
            SyncStatus::Syncing,
            SyncStatus::Ready,
            SyncStatus::StatesSynced,
            SyncStatus::PartialSync,
            SyncStatus::SyncFailed,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            texts,
            [
                "Offline",
                "Syncing...",
                "Ready",
                "States Synced",
                "Partial Sync",
                "Sync Failed"
            ]
        );
    }

    #[test]
    fn notifications_follow_change_order() {
        let machine = StatusMachine::new();
        let seen = recorder(&machine);

        machine.change(SyncStatus::Ready);
        machine.change(SyncStatus::Syncing);
        machine.change(SyncStatus::PartialSync);
        machine.deinit();

        let statuses: Vec<_> = seen.lock().iter().map(StatusUpdate::status).collect();
        assert_eq!(
            statuses,
            [
                SyncStatus::Ready,
                SyncStatus::Syncing,
                SyncStatus::PartialSync,
                SyncStatus::Offline
            ]
        );
    }

    #[test]
    fn registering_replaces_previous_callback() {
        let machine = StatusMachine::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let f = first.clone();
        let old_id = machine.register_callback(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        let new_id = machine.register_callback(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        machine.change(SyncStatus::Ready);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert!(!machine.unsubscribe(old_id));
        assert!(machine.unsubscribe(new_id));
        assert!(!machine.has_callback());
    }

    #[test]
    fn callback_can_reenter_change() {
        let machine = Arc::new(StatusMachine::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reentrant = machine.clone();
        let sink = seen.clone();
        machine.register_callback(move |update| {
            sink.lock().push(update.status());
            if update.status() == SyncStatus::SyncFailed {
                reentrant.change(SyncStatus::Ready);
            }
        });

        machine.change(SyncStatus::SyncFailed);

        assert_eq!(*seen.lock(), vec![SyncStatus::SyncFailed, SyncStatus::Ready]);
        assert_eq!(machine.current(), SyncStatus::Ready);
    }

    #[test]
    fn watch_receiver_sees_latest() {
        let machine = StatusMachine::new();
        let rx = machine.watch();
        machine.change(SyncStatus::Syncing);
        machine.change(SyncStatus::StatesSynced);
        assert_eq!(*rx.borrow(), SyncStatus::StatesSynced);
    }
}
