// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sync engine context object.

mod builder;

pub use builder::SyncEngineBuilder;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::command::CommandDispatcher;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::parser::ParserStats;
use crate::status::{StatusUpdate, SyncStatus};
use crate::subscription::{Subscribable, SubscriptionId};
use crate::sync::{CycleOutcome, SchedulerHandle, SwitchSnapshot, SyncContext};
use crate::transport::HttpBackend;
use crate::types::ServiceCallRequest;

/// Keeps a fixed set of remote switches in sync with the local device.
///
/// One engine owns the transport, parser worker, status machine, switch
/// bank, subscriber registry and the polling scheduler. Independent engines
/// share nothing.
///
/// # Lifecycle
///
/// - [`link_connected`](Self::link_connected): starts the scheduler (once)
///   and requests an immediate sync
/// - [`link_disconnected`](Self::link_disconnected): stops the scheduler
///   and waits for it to exit
/// - [`shutdown`](Self::shutdown): stops everything and returns to `Offline`
///
/// # Examples
///
/// ```no_run
/// use hass_sync_lib::{SyncConfig, SyncEngine};
/// use hass_sync_lib::subscription::Subscribable;
/// use hass_sync_lib::transport::ReqwestBackend;
///
/// # async fn example() -> hass_sync_lib::Result<()> {
/// let config = SyncConfig::new("192.168.1.20", "token")
///     .with_switches(["switch.pump", "switch.fan"])
///     .with_scene("scene.evening");
/// let engine = SyncEngine::builder(config, ReqwestBackend::new()).build()?;
///
/// engine.on_status_change(|update| println!("{}", update.text()));
/// engine.on_states_synced(|switches| println!("{switches:?}"));
///
/// engine.link_connected().await?;
/// engine.set_switch("switch.pump", true).await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine<B> {
    context: Arc<SyncContext<B>>,
    commands: CommandDispatcher<B>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl<B: HttpBackend> SyncEngine<B> {
    /// Starts building an engine.
    #[must_use]
    pub fn builder(config: SyncConfig, backend: B) -> SyncEngineBuilder<B> {
        SyncEngineBuilder::new(config, backend)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.context.config
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        self.context.transport.backend()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Moves an `Offline` engine to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` after [`shutdown`](Self::shutdown).
    pub fn start(&self) -> Result<()> {
        if self.context.is_closed() {
            return Err(Error::NotRunning);
        }
        if self.context.status.current() == SyncStatus::Offline {
            self.context.status.change(SyncStatus::Ready);
            tracing::info!(base_url = %self.context.config.base_url(), "Sync engine ready");
        }
        Ok(())
    }

    /// Handles the link coming up: starts the scheduler if needed and
    /// requests an immediate sync.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` after [`shutdown`](Self::shutdown).
    pub async fn link_connected(&self) -> Result<()> {
        self.start()?;
        {
            let mut scheduler = self.scheduler.lock();
            if !scheduler.as_ref().is_some_and(SchedulerHandle::is_running) {
                *scheduler = Some(SchedulerHandle::spawn(Arc::clone(&self.context)));
            }
        }
        self.context.trigger.request();
        Ok(())
    }

    /// Handles the link going down: stops the scheduler and waits for it.
    ///
    /// A cycle cut short mid-request ends in `SyncFailed` rather than
    /// leaving the status at `Syncing`.
    pub async fn link_disconnected(&self) {
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            tracing::info!("Link lost, stopping sync scheduler");
            handle.stop().await;
            if self.context.status.current() == SyncStatus::Syncing {
                self.context.status.change(SyncStatus::SyncFailed);
            }
        }
    }

    /// Returns true while the scheduler task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Stops the scheduler and the parser worker and returns to `Offline`.
    ///
    /// Commands and syncs fail with `NotRunning` afterwards.
    pub async fn shutdown(&self) {
        if self.context.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.link_disconnected().await;
        self.context.parser.shutdown();
        self.context.status.deinit();
        tracing::info!("Sync engine shut down");
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Asks the scheduler to run a cycle now instead of waiting for the timer.
    pub fn request_immediate_sync(&self) {
        self.context.trigger.request();
    }

    /// Runs one cycle on the calling task, waiting for any cycle in progress.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` after [`shutdown`](Self::shutdown).
    pub async fn sync_now(&self) -> Result<CycleOutcome> {
        if self.context.is_closed() {
            return Err(Error::NotRunning);
        }
        Ok(self.context.run_cycle().await)
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.context.status.current()
    }

    /// Returns a receiver that always holds the latest status.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.context.status.watch()
    }

    /// Returns true if a status callback is registered.
    #[must_use]
    pub fn has_status_callback(&self) -> bool {
        self.context.status.has_callback()
    }

    /// Removes the status callback.
    pub fn clear_status_callback(&self) {
        self.context.status.clear_callback();
    }

    // =========================================================================
    // Switches
    // =========================================================================

    /// Returns the last-known on/off state of every switch, in configured order.
    #[must_use]
    pub fn switch_states(&self) -> Vec<bool> {
        self.context.switches.switch_states()
    }

    /// Returns a snapshot of one switch.
    #[must_use]
    pub fn switch(&self, entity_id: &str) -> Option<SwitchSnapshot> {
        self.context.switches.snapshot(entity_id)
    }

    /// Returns snapshots of every switch.
    #[must_use]
    pub fn switches(&self) -> Vec<SwitchSnapshot> {
        self.context.switches.snapshots()
    }

    /// Enables or disables commands to a switch.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSwitch` if the switch is not configured.
    pub fn set_switch_enabled(&self, entity_id: &str, enabled: bool) -> Result<()> {
        if self.context.switches.set_enabled(entity_id, enabled) {
            Ok(())
        } else {
            Err(Error::UnknownSwitch(entity_id.to_string()))
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Returns the command dispatcher.
    #[must_use]
    pub fn commands(&self) -> &CommandDispatcher<B> {
        &self.commands
    }

    /// Turns a configured switch on or off.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::set_switch`].
    pub async fn set_switch(&self, entity_id: &str, on: bool) -> Result<()> {
        self.commands.set_switch(entity_id, on).await
    }

    /// Activates the configured scene.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::trigger_scene`].
    pub async fn trigger_scene(&self) -> Result<()> {
        self.commands.trigger_scene().await
    }

    /// Sends an arbitrary service call.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::call_service`].
    pub async fn call_service(&self, request: &ServiceCallRequest) -> Result<()> {
        self.commands.call_service(request).await
    }

    // =========================================================================
    // Parser
    // =========================================================================

    /// Returns parser statistics.
    #[must_use]
    pub fn parser_stats(&self) -> ParserStats {
        self.context.parser.stats()
    }

    /// Resets parser statistics.
    pub fn reset_parser_stats(&self) {
        self.context.parser.reset_stats();
    }

    /// Returns the number of queued background parse jobs.
    #[must_use]
    pub fn parse_queue_depth(&self) -> usize {
        self.context.parser.queue_depth()
    }
}

impl<B: HttpBackend> Subscribable for SyncEngine<B> {
    fn on_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.context.status.register_callback(callback)
    }

    fn on_states_synced<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[bool]) + Send + Sync + 'static,
    {
        self.context.callbacks.on_states_synced(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.context.callbacks.unsubscribe(id) || self.context.status.unsubscribe(id)
    }
}

impl<B> Drop for SyncEngine<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.cancel();
        }
    }
}

impl<B> std::fmt::Debug for SyncEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.context.config)
            .field("status", &self.context.status.current())
            .finish_non_exhaustive()
    }
}
