// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription system for sync notifications.
//!
//! # Overview
//!
//! Two notifications leave the engine:
//!
//! - **status changes**: held in a single slot on the status machine
//!   (registering a new callback replaces the previous one)
//! - **states synced**: any number of callbacks in a [`CallbackRegistry`],
//!   fired after every cycle that matched at least one entity
//!
//! Both hand out a [`SubscriptionId`] so "who is subscribed" is explicit
//! state that can be inspected and revoked.
//!
//! # Usage
//!
//! ```no_run
//! use hass_sync_lib::subscription::Subscribable;
//! # fn example(engine: &impl Subscribable) {
//! let sub_id = engine.on_states_synced(|switches| {
//!     println!("switch states: {switches:?}");
//! });
//!
//! // Later, unsubscribe
//! engine.unsubscribe(sub_id);
//! # }
//! ```

mod callback;
mod subscribable;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
