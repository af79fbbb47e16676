// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cancellable polling loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::sync::SyncContext;
use crate::transport::HttpBackend;

/// Cycles between health log lines.
const HEALTH_LOG_EVERY: u64 = 10;

/// A running scheduler task.
#[derive(Debug)]
pub(crate) struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawns the scheduler on the current runtime.
    pub(crate) fn spawn<B: HttpBackend>(context: Arc<SyncContext<B>>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(context, cancel.clone()));
        Self { cancel, task }
    }

    /// Returns true while the task has not exited.
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the task to stop without waiting.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits for it to exit.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            tracing::error!(error = %e, "Sync scheduler panicked");
        }
    }
}

async fn run<B: HttpBackend>(context: Arc<SyncContext<B>>, cancel: CancellationToken) {
    tracing::info!(
        poll_interval_ms = u64::try_from(context.config.poll_interval().as_millis()).unwrap_or(u64::MAX),
        switches = context.entity_ids.len(),
        "Sync scheduler started"
    );

    let mut cycles: u64 = 0;
    let mut failed_cycles: u64 = 0;

    loop {
        context.trigger.take();

        // Dropping an in-flight cycle abandons its requests; a queued parse
        // job still finishes on the worker and its result is discarded.
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = context.run_cycle() => outcome,
        };

        cycles += 1;
        if outcome.matched == 0 {
            failed_cycles += 1;
        }
        if cycles % HEALTH_LOG_EVERY == 0 {
            let stats = context.parser.stats();
            tracing::debug!(
                cycles,
                failed_cycles,
                status = %context.status.current(),
                parse_jobs = stats.jobs_processed,
                avg_parse_ms = u64::try_from(stats.average_parse_time().as_millis()).unwrap_or(u64::MAX),
                queue_depth = context.parser.queue_depth(),
                "Sync scheduler health"
            );
        }

        if !wait_for_next_cycle(&context, &cancel).await {
            break;
        }
    }

    tracing::info!(cycles, "Sync scheduler stopped");
}

/// Sleeps until the poll interval elapses or a sync is requested.
///
/// Returns `false` if cancelled.
async fn wait_for_next_cycle<B: HttpBackend>(
    context: &SyncContext<B>,
    cancel: &CancellationToken,
) -> bool {
    let deadline = Instant::now() + context.config.poll_interval();
    loop {
        context.liveness.feed();
        if context.trigger.is_requested() {
            tracing::debug!("Immediate sync requested");
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let slice = context.config.sleep_slice().min(deadline - now);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            () = context.trigger.notified() => {}
            () = tokio::time::sleep(slice) => {}
        }
    }
}
