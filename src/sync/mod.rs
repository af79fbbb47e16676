// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sync cycles and the polling scheduler.
//!
//! # Cycle
//!
//! 1. Feed liveness. If the link is down, report `SyncFailed` and stop.
//! 2. Bulk GET `/api/states` and parse it for the configured switches.
//! 3. All matched: `StatesSynced`. Some matched: `PartialSync`.
//! 4. Nothing matched (or the bulk request failed): GET each switch on its
//!    own, then `StatesSynced`, `PartialSync` or `SyncFailed` depending on how
//!    many of those succeeded.
//! 5. If anything matched, "states synced" subscribers receive the on/off
//!    state of every switch. Unmatched switches report their last-known value.
//!
//! The scheduler runs one cycle at a time and sleeps between cycles in short
//! slices, feeding liveness and watching for immediate-sync requests.

mod fetch;
mod scheduler;
mod switch_bank;
mod trigger;

pub use fetch::{STATES_PATH, entity_state_path};
pub(crate) use scheduler::SchedulerHandle;
pub use switch_bank::{SwitchBank, SwitchSnapshot};
pub use trigger::SyncTrigger;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::SyncConfig;
use crate::link::{LinkMonitor, Liveness, feed_while};
use crate::parser::{EntityStates, ParserWorker};
use crate::status::{StatusMachine, SyncStatus};
use crate::subscription::CallbackRegistry;
use crate::transport::{HttpBackend, Transport};

/// Which fetch path produced a cycle's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPath {
    /// The cycle did not run because the link was down.
    Skipped,
    /// The bulk request matched at least one switch.
    Bulk,
    /// The bulk path failed and per-entity requests were used.
    Individual,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Status the cycle ended in.
    pub status: SyncStatus,
    /// Which path produced the result.
    pub path: FetchPath,
    /// Switches read back.
    pub matched: usize,
    /// Switches configured.
    pub requested: usize,
    /// On/off state of every switch, if subscribers were notified.
    pub switch_states: Option<Vec<bool>>,
}

/// State shared by the engine, the scheduler task and the command dispatcher.
pub(crate) struct SyncContext<B> {
    pub(crate) config: Arc<SyncConfig>,
    pub(crate) transport: Transport<B>,
    pub(crate) parser: ParserWorker,
    pub(crate) status: Arc<StatusMachine>,
    pub(crate) switches: SwitchBank,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) trigger: SyncTrigger,
    pub(crate) link: Arc<dyn LinkMonitor>,
    pub(crate) liveness: Arc<dyn Liveness>,
    pub(crate) entity_ids: Arc<[String]>,
    pub(crate) closed: AtomicBool,
    pub(crate) cycle_lock: tokio::sync::Mutex<()>,
}

impl<B: HttpBackend> SyncContext<B> {
    /// Runs one full cycle. Cycles never overlap.
    pub(crate) async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;
        self.liveness.feed();
        let requested = self.entity_ids.len();

        if !self.link.is_link_up() {
            tracing::warn!("Link down, skipping sync cycle");
            self.status.change(SyncStatus::SyncFailed);
            return CycleOutcome {
                status: SyncStatus::SyncFailed,
                path: FetchPath::Skipped,
                matched: 0,
                requested,
                switch_states: None,
            };
        }

        let (states, path) = match self.fetch_bulk(&self.entity_ids).await {
            Ok(states) if states.matched() > 0 => (states, FetchPath::Bulk),
            Ok(_) => {
                tracing::info!("Bulk response matched no switches, falling back to individual fetches");
                (self.fetch_individual(&self.entity_ids).await, FetchPath::Individual)
            }
            Err(e) => {
                tracing::info!(error = %e, "Bulk fetch failed, falling back to individual fetches");
                (self.fetch_individual(&self.entity_ids).await, FetchPath::Individual)
            }
        };

        self.apply(&states, path)
    }

    fn apply(&self, states: &EntityStates, path: FetchPath) -> CycleOutcome {
        let matched = states.matched();
        let requested = states.requested();
        let status = if matched == requested {
            SyncStatus::StatesSynced
        } else if matched > 0 {
            SyncStatus::PartialSync
        } else {
            SyncStatus::SyncFailed
        };

        let all_states = self.switches.apply(states);
        let switch_states = if matched > 0 {
            self.callbacks.dispatch_states_synced(&all_states);
            Some(all_states)
        } else {
            None
        };

        self.status.change(status);
        tracing::info!(
            matched,
            requested,
            path = ?path,
            status = %status,
            "Sync cycle complete"
        );

        CycleOutcome {
            status,
            path,
            matched,
            requested,
            switch_states,
        }
    }

    pub(crate) async fn sleep_feeding(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        feed_while(
            self.liveness.as_ref(),
            self.config.liveness_interval(),
            tokio::time::sleep(duration),
        )
        .await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::link::{AlwaysUp, NoopLiveness};
    use crate::transport::{HttpRequest, HttpResponse};
    use parking_lot::Mutex;

    const BULK: &str = r#"[{"entity_id": "switch.a", "state": "off"}, {"entity_id": "switch.b", "state": "off"}]"#;

    /// Serves `BULK` for the bulk path and "on" for every single-entity read.
    #[derive(Default)]
    struct Server {
        paths: Mutex<Vec<String>>,
    }

    impl HttpBackend for Server {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.paths.lock().push(request.path().to_string());
            if request.path() == STATES_PATH {
                return Ok(HttpResponse::new(200, BULK));
            }
            let id = request.path().trim_start_matches("/api/states/");
            Ok(HttpResponse::new(
                200,
                format!(r#"{{"entity_id": "{id}", "state": "on"}}"#),
            ))
        }
    }

    fn context(config: SyncConfig, parser: ParserWorker) -> SyncContext<Server> {
        let config = Arc::new(config);
        let status = Arc::new(StatusMachine::new());
        let link: Arc<dyn LinkMonitor> = Arc::new(AlwaysUp);
        let liveness: Arc<dyn Liveness> = Arc::new(NoopLiveness);
        SyncContext {
            transport: Transport::new(
                Server::default(),
                Arc::clone(&config),
                Arc::clone(&link),
                Arc::clone(&liveness),
                Arc::clone(&status),
            ),
            parser,
            switches: SwitchBank::new(config.switches().iter().cloned(), None),
            entity_ids: config.switches().iter().cloned().collect(),
            status,
            callbacks: CallbackRegistry::new(),
            trigger: SyncTrigger::new(),
            link,
            liveness,
            closed: AtomicBool::new(false),
            cycle_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    fn config() -> SyncConfig {
        SyncConfig::new("ha.local", "token")
            .with_switches(["switch.a", "switch.b"])
            .with_async_parse_threshold(16)
            .with_parse_timeout(Duration::from_secs(5))
            .with_request_spacing(Duration::from_millis(1), Duration::from_millis(1))
    }

    #[tokio::test(start_paused = true)]
    async fn background_parse_timeout_falls_back_to_individual_reads() {
        // The queue is never consumed, so the job cannot finish in time.
        let (parser, _queue) = ParserWorker::unstarted(2, 64 * 1024);
        let context = context(config(), parser);

        let outcome = context.run_cycle().await;

        assert_eq!(outcome.path, FetchPath::Individual);
        assert_eq!(outcome.status, SyncStatus::StatesSynced);
        assert_eq!(outcome.switch_states, Some(vec![true, true]));
        assert_eq!(context.parser.stats().timeouts, 1);
        assert_eq!(
            *context.transport.backend().paths.lock(),
            vec!["/api/states", "/api/states/switch.a", "/api/states/switch.b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_parse_queue_parses_bulk_inline() {
        let (parser, _queue) = ParserWorker::unstarted(1, 64 * 1024);
        let ids: Arc<[String]> = Arc::from(vec!["switch.a".to_string()]);
        let _queued = parser.submit(BULK.as_bytes(), ids).unwrap();
        let context = context(config(), parser);

        let outcome = context.run_cycle().await;

        assert_eq!(outcome.path, FetchPath::Bulk);
        assert_eq!(outcome.switch_states, Some(vec![false, false]));
        let stats = context.parser.stats();
        assert_eq!(stats.queue_full, 1);
        assert_eq!(stats.async_jobs, 0);
        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(*context.transport.backend().paths.lock(), vec!["/api/states"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_scratch_pool_parses_bulk_inline() {
        let (parser, _queue) = ParserWorker::unstarted(2, 32);
        let context = context(config(), parser);

        let outcome = context.run_cycle().await;

        assert_eq!(outcome.path, FetchPath::Bulk);
        assert_eq!(outcome.status, SyncStatus::StatesSynced);
        assert_eq!(context.parser.stats().async_jobs, 0);
        assert_eq!(context.parser.queue_depth(), 0);
    }
}
