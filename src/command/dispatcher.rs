// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sends commands through the transport.

use std::sync::Arc;

use crate::command::{Command, SceneCommand, SwitchCommand};
use crate::error::{Error, Result};
use crate::sync::SyncContext;
use crate::transport::HttpBackend;
use crate::types::ServiceCallRequest;

/// Fire-and-report command sender.
///
/// Each call is one POST through the transport with the full retry policy.
/// Transport errors go straight back to the caller; the sync status is never
/// touched. A successful call raises the immediate-sync flag when
/// `refresh_after_command` is enabled.
pub struct CommandDispatcher<B> {
    context: Arc<SyncContext<B>>,
}

impl<B: HttpBackend> CommandDispatcher<B> {
    pub(crate) fn new(context: Arc<SyncContext<B>>) -> Self {
        Self { context }
    }

    /// Turns a configured switch on or off.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSwitch` if `entity_id` is not configured,
    /// `SwitchDisabled` if it was disabled after repeated sync failures, or
    /// the transport error of the service call.
    pub async fn set_switch(&self, entity_id: &str, on: bool) -> Result<()> {
        match self.context.switches.is_disabled(entity_id) {
            None => return Err(Error::UnknownSwitch(entity_id.to_string())),
            Some(true) => return Err(Error::SwitchDisabled(entity_id.to_string())),
            Some(false) => {}
        }
        self.send(&SwitchCommand::new(entity_id, on)).await
    }

    /// Activates the configured scene.
    ///
    /// # Errors
    ///
    /// Returns `NoSceneConfigured` or the transport error of the service call.
    pub async fn trigger_scene(&self) -> Result<()> {
        let scene = self
            .context
            .config
            .scene()
            .ok_or(Error::NoSceneConfigured)?;
        self.send(&SceneCommand::new(scene)).await
    }

    /// Sends an arbitrary service call.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the service call.
    pub async fn call_service(&self, request: &ServiceCallRequest) -> Result<()> {
        self.send(request).await
    }

    /// Sends any command.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` after shutdown, or the transport error.
    pub async fn send<C: Command + Sync>(&self, command: &C) -> Result<()> {
        if self.context.is_closed() {
            return Err(Error::NotRunning);
        }

        let call = command.to_service_call();
        tracing::info!(
            domain = %call.domain(),
            service = %call.service(),
            entity_id = %call.entity_id(),
            "Sending service call"
        );

        if let Err(e) = self
            .context
            .transport
            .post_json(&call.path(), &call.body())
            .await
        {
            tracing::warn!(
                domain = %call.domain(),
                service = %call.service(),
                entity_id = %call.entity_id(),
                error = %e,
                "Service call failed"
            );
            return Err(e.into());
        }

        if self.context.config.refresh_after_command() {
            self.context.trigger.request();
        }
        Ok(())
    }
}

impl<B> Clone for CommandDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<B> std::fmt::Debug for CommandDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher").finish_non_exhaustive()
    }
}
