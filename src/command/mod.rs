// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-control commands.
//!
//! A command is a user intent that maps to exactly one service call on the
//! automation server.
//!
//! # Available Commands
//!
//! | Command Type | Service | Example |
//! |-------------|---------|---------|
//! | [`SwitchCommand`] | `switch.turn_on` / `switch.turn_off` | Pump on |
//! | [`SceneCommand`] | `scene.turn_on` | Evening scene |
//! | [`ServiceCallRequest`] | any | `light.turn_on` with brightness |
//!
//! Commands never change local switch state. The next sync cycle (raised
//! immediately after a successful command, unless disabled) reads the
//! result back from the server.
//!
//! # Examples
//!
//! ```
//! use hass_sync_lib::command::{Command, SwitchCommand};
//!
//! let cmd = SwitchCommand::turn_on("switch.pump");
//! assert_eq!(cmd.domain(), "switch");
//! assert_eq!(cmd.service(), "turn_on");
//! assert_eq!(cmd.to_service_call().path(), "/api/services/switch/turn_on");
//! ```

mod dispatcher;

pub use dispatcher::CommandDispatcher;

use crate::types::ServiceCallRequest;

/// An intent that becomes a single service call.
pub trait Command {
    /// Returns the service domain (e.g. `"switch"`).
    fn domain(&self) -> &str;

    /// Returns the service name (e.g. `"turn_on"`).
    fn service(&self) -> &str;

    /// Returns the target entity.
    fn entity_id(&self) -> &str;

    /// Builds the service call.
    fn to_service_call(&self) -> ServiceCallRequest {
        ServiceCallRequest::new(self.domain(), self.service(), self.entity_id())
    }
}

/// Turns a switch on or off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCommand {
    entity_id: String,
    on: bool,
}

impl SwitchCommand {
    /// Creates a command setting `entity_id` to `on`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, on: bool) -> Self {
        Self {
            entity_id: entity_id.into(),
            on,
        }
    }

    /// `switch.turn_on`.
    #[must_use]
    pub fn turn_on(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, true)
    }

    /// `switch.turn_off`.
    #[must_use]
    pub fn turn_off(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, false)
    }

    /// Returns the requested state.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Command for SwitchCommand {
    fn domain(&self) -> &str {
        "switch"
    }

    fn service(&self) -> &str {
        if self.on { "turn_on" } else { "turn_off" }
    }

    fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

/// Activates a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneCommand {
    entity_id: String,
}

impl SceneCommand {
    /// Creates a command activating `entity_id`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
        }
    }
}

impl Command for SceneCommand {
    fn domain(&self) -> &str {
        "scene"
    }

    fn service(&self) -> &str {
        "turn_on"
    }

    fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Command for ServiceCallRequest {
    fn domain(&self) -> &str {
        ServiceCallRequest::domain(self)
    }

    fn service(&self) -> &str {
        ServiceCallRequest::service(self)
    }

    fn entity_id(&self) -> &str {
        ServiceCallRequest::entity_id(self)
    }

    fn to_service_call(&self) -> ServiceCallRequest {
        self.clone()
    }
}
