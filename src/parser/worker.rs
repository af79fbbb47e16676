// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background parser worker.
//!
//! One dedicated OS thread consumes [`SyncJob`]s from a bounded queue in
//! submission order. Submitting never blocks: a full queue is reported as
//! [`ParseError::QueueFull`] and the caller parses inline instead.
//!
//! A job owns its payload copy ([`ScratchBuffer`]) and the sending half of a
//! one-shot channel. If the caller stops waiting, it drops the receiving
//! half; the worker still finishes the job, its result is discarded and the
//! buffer goes back to the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::ParseError;
use crate::link::{Liveness, feed_while};
use crate::parser::{EntityStates, ParserStats, ScratchBuffer, ScratchPool, parse_sync};

/// A parse request owned by the worker from submission until completion.
#[derive(Debug)]
pub struct SyncJob {
    id: u64,
    raw_json: ScratchBuffer,
    entity_ids: Arc<[String]>,
    completion: oneshot::Sender<JobOutcome>,
}

/// Result of one background job.
#[derive(Debug)]
pub struct JobOutcome {
    /// Id assigned at submission.
    pub job_id: u64,
    /// Position in the worker's completion order, starting at 1.
    pub sequence: u64,
    /// The parse result.
    pub result: Result<EntityStates, ParseError>,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct PendingParse {
    job_id: u64,
    completion: oneshot::Receiver<JobOutcome>,
    stats: Arc<Mutex<ParserStats>>,
}

impl PendingParse {
    /// Returns the id assigned at submission.
    #[must_use]
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Waits for the job, feeding `liveness` every `interval`.
    ///
    /// On timeout the handle is dropped: the job still runs to completion
    /// on the worker, but its result is discarded.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the job does not finish in time,
    /// `WorkerUnavailable` if the worker went away, or the job's own parse
    /// error.
    pub async fn wait(
        self,
        timeout: Duration,
        liveness: &dyn Liveness,
        interval: Duration,
    ) -> Result<EntityStates, ParseError> {
        self.wait_outcome(timeout, liveness, interval)
            .await
            .and_then(|outcome| outcome.result)
    }

    /// Like [`wait`](Self::wait) but returns the full outcome.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or `WorkerUnavailable`.
    pub async fn wait_outcome(
        self,
        timeout: Duration,
        liveness: &dyn Liveness,
        interval: Duration,
    ) -> Result<JobOutcome, ParseError> {
        let waited = feed_while(
            liveness,
            interval,
            tokio::time::timeout(timeout, self.completion),
        )
        .await;
        match waited {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(ParseError::WorkerUnavailable),
            Err(_) => {
                self.stats.lock().timeouts += 1;
                tracing::warn!(
                    job_id = self.job_id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Background parse timed out, result will be discarded"
                );
                Err(ParseError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }
}

/// Dedicated background parser.
pub struct ParserWorker {
    sender: Mutex<Option<mpsc::Sender<SyncJob>>>,
    pool: ScratchPool,
    stats: Arc<Mutex<ParserStats>>,
    next_job_id: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ParserWorker {
    /// Name of the worker thread.
    pub const THREAD_NAME: &'static str = "entity-parser";

    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns `WorkerUnavailable` if the thread cannot be spawned.
    pub fn start(queue_capacity: usize, pool_bytes: usize) -> Result<Self, ParseError> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let stats = Arc::new(Mutex::new(ParserStats::default()));
        let thread_stats = Arc::clone(&stats);
        let handle = std::thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || run(rx, &thread_stats))
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn parser thread");
                ParseError::WorkerUnavailable
            })?;

        tracing::debug!(queue_capacity, pool_bytes, "Parser worker started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            pool: ScratchPool::new(pool_bytes),
            stats,
            next_job_id: AtomicU64::new(1),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Copies `json` into the scratch pool and queues it.
    ///
    /// # Errors
    ///
    /// Returns `PoolExhausted`, `QueueFull` or `WorkerUnavailable`; the
    /// caller is expected to fall back to [`parse_inline`](Self::parse_inline).
    pub fn submit(
        &self,
        json: &[u8],
        entity_ids: Arc<[String]>,
    ) -> Result<PendingParse, ParseError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(ParseError::WorkerUnavailable)?;

        let raw_json = self.pool.copy_from(json)?;
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (completion, rx) = oneshot::channel();
        let job = SyncJob {
            id: job_id,
            raw_json,
            entity_ids,
            completion,
        };

        match sender.try_send(job) {
            Ok(()) => {
                tracing::debug!(job_id, bytes = json.len(), "Parse job queued");
                Ok(PendingParse {
                    job_id,
                    completion: rx,
                    stats: Arc::clone(&self.stats),
                })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.lock().queue_full += 1;
                tracing::debug!(job_id, "Parse queue full");
                Err(ParseError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ParseError::WorkerUnavailable),
        }
    }

    /// Parses on the calling thread, recording statistics.
    ///
    /// # Errors
    ///
    /// See [`parse_sync`].
    pub fn parse_inline(
        &self,
        json: &[u8],
        entity_ids: &[String],
    ) -> Result<EntityStates, ParseError> {
        timed_parse(json, entity_ids, &self.stats, false)
    }

    /// Returns the number of jobs waiting in the queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Returns true while the worker accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Returns a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> ParserStats {
        self.stats.lock().clone()
    }

    /// Resets the statistics.
    pub fn reset_stats(&self) {
        *self.stats.lock() = ParserStats::default();
    }

    /// Returns the scratch pool.
    #[must_use]
    pub fn pool(&self) -> &ScratchPool {
        &self.pool
    }

    /// Closes the queue. Queued jobs are still completed, then the thread exits.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            tracing::debug!("Parser worker shutting down");
        }
        // Detached: the thread exits once the queue drains.
        drop(self.thread.lock().take());
    }

    /// Creates a worker whose queue is never consumed.
    #[cfg(test)]
    pub(crate) fn unstarted(queue_capacity: usize, pool_bytes: usize) -> (Self, mpsc::Receiver<SyncJob>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = Self {
            sender: Mutex::new(Some(tx)),
            pool: ScratchPool::new(pool_bytes),
            stats: Arc::new(Mutex::new(ParserStats::default())),
            next_job_id: AtomicU64::new(1),
            thread: Mutex::new(None),
        };
        (worker, rx)
    }
}

impl Drop for ParserWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ParserWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserWorker")
            .field("running", &self.is_running())
            .field("queue_depth", &self.queue_depth())
            .field("pool_in_use", &self.pool.in_use())
            .finish_non_exhaustive()
    }
}

fn run(mut rx: mpsc::Receiver<SyncJob>, stats: &Mutex<ParserStats>) {
    let mut sequence: u64 = 0;
    while let Some(job) = rx.blocking_recv() {
        sequence += 1;
        let SyncJob {
            id,
            raw_json,
            entity_ids,
            completion,
        } = job;

        let result = timed_parse(raw_json.as_slice(), &entity_ids, stats, true);
        drop(raw_json);

        let outcome = JobOutcome {
            job_id: id,
            sequence,
            result,
        };
        if completion.send(outcome).is_err() {
            tracing::debug!(job_id = id, "Parse result discarded, requester stopped waiting");
        }
    }
    tracing::debug!("Parser worker stopped");
}

fn timed_parse(
    json: &[u8],
    entity_ids: &[String],
    stats: &Mutex<ParserStats>,
    background: bool,
) -> Result<EntityStates, ParseError> {
    let started = Instant::now();
    let result = parse_sync(json, entity_ids);
    let elapsed = started.elapsed();

    {
        let mut stats = stats.lock();
        stats.record(json.len(), elapsed, &result, entity_ids.len());
        if background {
            stats.async_jobs += 1;
        }
    }

    match &result {
        Ok(states) => tracing::debug!(
            bytes = json.len(),
            matched = states.matched(),
            requested = states.requested(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            background,
            "Parsed entity states"
        ),
        Err(e) => tracing::warn!(bytes = json.len(), error = %e, background, "Failed to parse entity states"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::NoopLiveness;

    fn ids(list: &[&str]) -> Arc<[String]> {
        list.iter().map(ToString::to_string).collect()
    }

    const BODY: &[u8] = br#"[{"entity_id": "switch.a", "state": "on"}]"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_parse_matches_inline() {
        let worker = ParserWorker::start(2, 4096).unwrap();
        let pending = worker.submit(BODY, ids(&["switch.a", "switch.b"])).unwrap();

        let states = pending
            .wait(Duration::from_secs(5), &NoopLiveness, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(states.matched(), 1);
        assert_eq!(states.requested(), 2);
        let stats = worker.stats();
        assert_eq!(stats.async_jobs, 1);
        assert_eq!(stats.entities_found, 1);
        assert_eq!(stats.entities_missing, 1);
        assert_eq!(worker.pool().in_use(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn jobs_complete_in_submission_order() {
        let worker = ParserWorker::start(3, 1 << 20).unwrap();

        // Descending sizes: order must not depend on payload size.
        let big: Vec<u8> = {
            let mut items: Vec<String> = (0..2000)
                .map(|i| format!(r#"{{"entity_id": "sensor.s{i}", "state": "{i}"}}"#))
                .collect();
            items.push(r#"{"entity_id": "switch.a", "state": "on"}"#.to_string());
            format!("[{}]", items.join(",")).into_bytes()
        };
        let medium = br#"[{"entity_id": "sensor.x", "state": "1"}, {"entity_id": "switch.a", "state": "off"}]"#;

        let j1 = worker.submit(&big, ids(&["switch.a"])).unwrap();
        let j2 = worker.submit(medium, ids(&["switch.a"])).unwrap();
        let j3 = worker.submit(BODY, ids(&["switch.a"])).unwrap();

        let mut sequences = Vec::new();
        for pending in [j1, j2, j3] {
            let outcome = pending
                .wait_outcome(Duration::from_secs(10), &NoopLiveness, Duration::from_millis(50))
                .await
                .unwrap();
            assert!(outcome.result.is_ok());
            sequences.push(outcome.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn full_queue_fails_fast() {
        let (worker, _rx) = ParserWorker::unstarted(2, 4096);

        let _j1 = worker.submit(BODY, ids(&["switch.a"])).unwrap();
        let _j2 = worker.submit(BODY, ids(&["switch.a"])).unwrap();
        assert_eq!(worker.queue_depth(), 2);

        let err = worker.submit(BODY, ids(&["switch.a"])).unwrap_err();
        assert!(matches!(err, ParseError::QueueFull));
        assert_eq!(worker.stats().queue_full, 1);
        // The declined job's buffer went straight back to the pool.
        assert_eq!(worker.pool().in_use(), 2 * BODY.len());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_wait_discards_result() {
        let (worker, mut rx) = ParserWorker::unstarted(2, 4096);
        let pending = worker.submit(BODY, ids(&["switch.a"])).unwrap();

        let err = pending
            .wait(Duration::from_millis(100), &NoopLiveness, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Timeout(100)));
        assert_eq!(worker.stats().timeouts, 1);

        // Completing the abandoned job later frees its buffer without panicking.
        let job = rx.recv().await.unwrap();
        assert!(job.completion.send(JobOutcome {
            job_id: job.id,
            sequence: 1,
            result: Ok(EntityStates::empty(1)),
        }).is_err());
        drop(job.raw_json);
        assert_eq!(worker.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let worker = ParserWorker::start(2, 4096).unwrap();
        worker.shutdown();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.submit(BODY, ids(&["switch.a"])),
            Err(ParseError::WorkerUnavailable)
        ));
    }

    #[test]
    fn inline_parse_records_stats() {
        let (worker, _rx) = ParserWorker::unstarted(1, 16);
        let states = worker.parse_inline(BODY, &["switch.a".to_string()]).unwrap();
        assert_eq!(states.matched(), 1);
        let stats = worker.stats();
        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(stats.async_jobs, 0);
        assert_eq!(stats.largest_response_bytes, BODY.len());
    }
}
