// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch state interpretation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a switch entity as reported by the server.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::types::SwitchState;
///
/// assert_eq!(SwitchState::from_state_str("on"), SwitchState::On);
/// assert_eq!(SwitchState::from_state_str("unavailable"), SwitchState::Unavailable);
/// assert!(SwitchState::On.is_on());
/// assert!(!SwitchState::Unknown.is_on());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    /// State not known yet, or not a recognized value.
    #[default]
    Unknown,
    /// Switch is on.
    On,
    /// Switch is off.
    Off,
    /// The server cannot reach the switch.
    Unavailable,
}

impl SwitchState {
    /// Interprets a state string. Matching is exact, as the server emits lowercase.
    #[must_use]
    pub fn from_state_str(state: &str) -> Self {
        match state {
            "on" => Self::On,
            "off" => Self::Off,
            "unavailable" => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    /// Returns true only for [`SwitchState::On`].
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    /// Returns true for `On` and `Off`.
    #[must_use]
    pub const fn is_known(self) -> bool {
        matches!(self, Self::On | Self::Off)
    }

    /// Returns the canonical string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Off => "off",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for SwitchState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}
