// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sync engine builder.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::command::CommandDispatcher;
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::Result;
use crate::link::{AlwaysUp, LinkMonitor, Liveness, NoopLiveness};
use crate::parser::ParserWorker;
use crate::status::StatusMachine;
use crate::subscription::CallbackRegistry;
use crate::sync::{SwitchBank, SyncContext, SyncTrigger};
use crate::transport::{HttpBackend, Transport};

/// Builder for [`SyncEngine`].
///
/// Without further configuration the link is assumed to be always up and
/// liveness signals are discarded.
///
/// # Examples
///
/// ```no_run
/// use hass_sync_lib::{SyncConfig, SyncEngine};
/// use hass_sync_lib::link::{CountingLiveness, LinkFlag};
/// use hass_sync_lib::transport::ReqwestBackend;
///
/// # fn example() -> hass_sync_lib::Result<()> {
/// let link = LinkFlag::new(false);
/// let watchdog = CountingLiveness::new();
///
/// let engine = SyncEngine::builder(
///     SyncConfig::new("192.168.1.20", "token").with_switches(["switch.pump"]),
///     ReqwestBackend::new(),
/// )
/// .with_link_monitor(link.clone())
/// .with_liveness(watchdog.clone())
/// .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngineBuilder<B> {
    config: SyncConfig,
    backend: B,
    link: Arc<dyn LinkMonitor>,
    liveness: Arc<dyn Liveness>,
}

impl<B: HttpBackend> SyncEngineBuilder<B> {
    pub(crate) fn new(config: SyncConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            link: Arc::new(AlwaysUp),
            liveness: Arc::new(NoopLiveness),
        }
    }

    /// Sets the link-layer status source.
    #[must_use]
    pub fn with_link_monitor(mut self, link: impl LinkMonitor + 'static) -> Self {
        self.link = Arc::new(link);
        self
    }

    /// Sets the liveness sink fed during long operations.
    #[must_use]
    pub fn with_liveness(mut self, liveness: impl Liveness + 'static) -> Self {
        self.liveness = Arc::new(liveness);
        self
    }

    /// Validates the configuration, starts the parser worker and builds the engine.
    ///
    /// The engine starts `Offline` with no scheduler running.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration or `Error::Parse`
    /// if the parser worker cannot be started.
    pub fn build(self) -> Result<SyncEngine<B>> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let parser =
            ParserWorker::start(config.parse_queue_capacity(), config.scratch_pool_bytes())?;
        let status = Arc::new(StatusMachine::new());
        let transport = Transport::new(
            self.backend,
            Arc::clone(&config),
            Arc::clone(&self.link),
            Arc::clone(&self.liveness),
            Arc::clone(&status),
        );
        let entity_ids: Arc<[String]> = config.switches().iter().cloned().collect();

        let context = Arc::new(SyncContext {
            switches: SwitchBank::new(config.switches().iter().cloned(), config.auto_disable_after()),
            config,
            transport,
            parser,
            status,
            callbacks: CallbackRegistry::new(),
            trigger: SyncTrigger::new(),
            link: self.link,
            liveness: self.liveness,
            entity_ids,
            closed: AtomicBool::new(false),
            cycle_lock: tokio::sync::Mutex::new(()),
        });

        tracing::debug!(config = ?context.config, "Sync engine built");

        Ok(SyncEngine {
            commands: CommandDispatcher::new(Arc::clone(&context)),
            context,
            scheduler: parking_lot::Mutex::new(None),
        })
    }
}

impl<B> std::fmt::Debug for SyncEngineBuilder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
