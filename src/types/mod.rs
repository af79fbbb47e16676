// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the sync engine.
//!
//! # Types
//!
//! - [`EntityState`] - One decoded entity slot (id, state, friendly name, timestamp)
//! - [`SwitchState`] - Interpretation of a switch entity's state string
//! - [`ServiceCallRequest`] - A single `POST /api/services/{domain}/{service}` call

mod entity_state;
mod service_call;
mod switch;

pub use entity_state::{
    EntityState, MAX_ENTITY_ID_LEN, MAX_FRIENDLY_NAME_LEN, MAX_STATE_LEN, truncate_utf8,
};
pub use service_call::ServiceCallRequest;
pub use switch::SwitchState;
