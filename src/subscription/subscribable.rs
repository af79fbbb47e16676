// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for sync notifications.

use crate::status::StatusUpdate;
use crate::subscription::SubscriptionId;

/// Trait for types that publish sync notifications.
///
/// Implemented by [`SyncEngine`](crate::SyncEngine). UI layers usually take
/// `&impl Subscribable` so they can be tested against a stub.
pub trait Subscribable {
    /// Sets the status-change callback, replacing any previous one.
    ///
    /// The callback fires once per distinct status transition, never while
    /// the status lock is held.
    fn on_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static;

    /// Subscribes to "states synced" notifications.
    ///
    /// The callback receives the on/off state of each configured switch in
    /// configured order.
    fn on_states_synced<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[bool]) + Send + Sync + 'static;

    /// Unsubscribes a callback by its subscription ID.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
