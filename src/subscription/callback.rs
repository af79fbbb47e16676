// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for sync notifications.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Registry for "states synced" callbacks

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Unique identifier for a subscription.
///
/// IDs are unique for the lifetime of the process, so an id from the status
/// slot can never accidentally remove a states-synced callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    /// Allocates a fresh subscription ID.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Callback receiving the on/off state of every configured switch, in order.
type StatesSyncedCallback = Arc<dyn Fn(&[bool]) + Send + Sync>;

/// Registry for "states synced" callbacks.
///
/// Callbacks run in registration order. Dispatch snapshots the registered
/// callbacks first and invokes them with no lock held, so a callback may
/// subscribe or unsubscribe without deadlocking.
pub struct CallbackRegistry {
    states_synced: RwLock<BTreeMap<SubscriptionId, StatesSyncedCallback>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states_synced: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a callback fired after every cycle that matched at least one entity.
    pub fn on_states_synced<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[bool]) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.states_synced.write().insert(id, Arc::new(callback));
        id
    }

    /// Unregisters a callback by its subscription ID.
    ///
    /// Returns `true` if a callback was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.states_synced.write().remove(&id).is_some()
    }

    /// Clears all callbacks.
    pub fn clear(&self) {
        self.states_synced.write().clear();
    }

    /// Dispatches switch states to every registered callback.
    pub fn dispatch_states_synced(&self, switch_states: &[bool]) {
        let callbacks: Vec<StatesSyncedCallback> =
            self.states_synced.read().values().cloned().collect();
        for callback in callbacks {
            callback(switch_states);
        }
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.states_synced.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
