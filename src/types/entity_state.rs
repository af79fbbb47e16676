// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded entity state records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SwitchState;

/// Maximum stored length of an entity id, in bytes.
pub const MAX_ENTITY_ID_LEN: usize = 63;
/// Maximum stored length of a state string, in bytes.
pub const MAX_STATE_LEN: usize = 255;
/// Maximum stored length of a friendly name, in bytes.
pub const MAX_FRIENDLY_NAME_LEN: usize = 63;

/// State of one entity, as decoded from the server.
///
/// A default (empty) record is the "not found" slot: an entity absent from
/// the response leaves `entity_id` empty. Records are immutable once filled.
///
/// `last_updated` is the time the record was decoded, not the server's own
/// timestamp.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::types::{EntityState, SwitchState};
///
/// let missing = EntityState::default();
/// assert!(!missing.is_found());
///
/// let pump = EntityState::new("switch.pump", "on", "Water Pump");
/// assert!(pump.is_found());
/// assert_eq!(pump.switch_state(), SwitchState::On);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    entity_id: String,
    state: String,
    friendly_name: String,
    last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    /// Creates a filled record stamped with the current time.
    ///
    /// Fields longer than their limits are truncated on a character boundary.
    #[must_use]
    pub fn new(
        entity_id: impl AsRef<str>,
        state: impl AsRef<str>,
        friendly_name: impl AsRef<str>,
    ) -> Self {
        Self::with_timestamp(entity_id, state, friendly_name, Utc::now())
    }

    /// Creates a filled record with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        entity_id: impl AsRef<str>,
        state: impl AsRef<str>,
        friendly_name: impl AsRef<str>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: truncate_utf8(entity_id.as_ref(), MAX_ENTITY_ID_LEN).to_string(),
            state: truncate_utf8(state.as_ref(), MAX_STATE_LEN).to_string(),
            friendly_name: truncate_utf8(friendly_name.as_ref(), MAX_FRIENDLY_NAME_LEN)
                .to_string(),
            last_updated: Some(last_updated),
        }
    }

    /// Returns true if this slot was filled from the response.
    #[must_use]
    pub fn is_found(&self) -> bool {
        !self.entity_id.is_empty()
    }

    /// Returns the entity id, or an empty string for a "not found" slot.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the raw state string (e.g. `"on"`).
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns the friendly name, or an empty string if the server sent none.
    #[must_use]
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Returns when this record was decoded.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Interprets the state string as a switch state.
    #[must_use]
    pub fn switch_state(&self) -> SwitchState {
        if self.is_found() {
            SwitchState::from_state_str(&self.state)
        } else {
            SwitchState::Unknown
        }
    }
}

/// Truncates `s` to at most `max_bytes`, backing off to a character boundary.
#[must_use]
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_found() {
        let state = EntityState::default();
        assert!(!state.is_found());
        assert_eq!(state.entity_id(), "");
        assert!(state.last_updated().is_none());
        assert_eq!(state.switch_state(), SwitchState::Unknown);
    }

    #[test]
    fn new_sets_timestamp() {
        let state = EntityState::new("switch.pump", "off", "");
        assert!(state.last_updated().is_some());
        assert_eq!(state.switch_state(), SwitchState::Off);
    }

    #[test]
    fn long_fields_are_truncated() {
        let long_state = "x".repeat(400);
        let state = EntityState::new("sensor.big", &long_state, "n".repeat(100));
        assert_eq!(state.state().len(), MAX_STATE_LEN);
        assert_eq!(state.friendly_name().len(), MAX_FRIENDLY_NAME_LEN);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "é" is two bytes; cutting at 3 would split the second one.
        assert_eq!(truncate_utf8("éé", 3), "é");
        assert_eq!(truncate_utf8("abc", 10), "abc");
        assert_eq!(truncate_utf8("abc", 2), "ab");
    }
}
