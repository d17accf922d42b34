//! Worker pool, cancellation, and stat harvesting
//!
//! One OS thread per worker. Each worker owns a [`ThreadStat`] record guarded
//! by its own lock, so harvesting one worker's stats never blocks another
//! worker's progress. The orchestrator interacts with the pool only through
//! those per-record locks and a shared [`CancelToken`]; there is no other
//! shared mutable state.
//!
//! ## Worker lifecycle
//!
//! ```text
//! Spawned -> Running -> {Draining-on-cancel | Faulted} -> Joined
//! ```
//!
//! Cancellation is cooperative: workers observe the token at loop
//! boundaries, never mid-request. A worker that hits an unrecoverable
//! request error records it into its own status and stops; the rest of the
//! pool keeps generating load. Shutdown joins every thread (no timeout) and
//! logs each failed worker's status exactly once.
//!
//! The request-issuance cadence is not decided here: policies inject it
//! through the [`Pacing`] strategy and the [`WorkerPool::spawn_worker`]
//! seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::binder::RequestBinder;
use crate::client::{ClientFactory, RequestTiming};
use crate::data::InputDataStore;
use crate::error::{CargadorError, Result};

// ============================================================================
// Per-request records and cumulative counters
// ============================================================================

/// Send/receive instants for one completed request
///
/// Records within one worker's log are in issuance order; across workers
/// there is no defined relative order.
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord {
    /// Instant the request was handed to the transport
    pub start: Instant,
    /// Instant the response was fully received
    pub end: Instant,
}

impl RequestRecord {
    /// End-to-end latency of this request
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.end.duration_since(self.start)
    }
}

/// Cumulative completion counters for one worker's contexts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStat {
    /// Requests completed successfully
    pub completed_request_count: u64,
    /// Sum of end-to-end request latencies
    pub cumulative_total_request_time: Duration,
    /// Sum of transport send times
    pub cumulative_send_time: Duration,
    /// Sum of transport receive times
    pub cumulative_receive_time: Duration,
}

impl ContextStat {
    /// Add another stat's counters into this one
    pub fn accumulate(&mut self, other: &Self) {
        self.completed_request_count += other.completed_request_count;
        self.cumulative_total_request_time += other.cumulative_total_request_time;
        self.cumulative_send_time += other.cumulative_send_time;
        self.cumulative_receive_time += other.cumulative_receive_time;
    }
}

/// Per-worker mutable record: status, timestamp log, cumulative counters
///
/// Written only by its owning worker; read and drained by the orchestrator
/// under the record's lock.
#[derive(Debug, Default)]
pub struct ThreadStat {
    status: Option<CargadorError>,
    request_timestamps: Vec<RequestRecord>,
    context_stat: ContextStat,
}

impl ThreadStat {
    /// Whether this worker has not recorded an error
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_none()
    }

    /// First error this worker recorded, if any
    #[must_use]
    pub fn error(&self) -> Option<&CargadorError> {
        self.status.as_ref()
    }

    /// Cumulative counters accumulated so far
    #[must_use]
    pub fn context_stat(&self) -> &ContextStat {
        &self.context_stat
    }

    /// Timestamp records accumulated since the last drain
    #[must_use]
    pub fn pending_timestamps(&self) -> usize {
        self.request_timestamps.len()
    }

    /// Append one completed request's record and update counters
    pub fn record_request(&mut self, record: RequestRecord, timing: &RequestTiming) {
        self.context_stat.completed_request_count += 1;
        self.context_stat.cumulative_total_request_time += record.latency();
        self.context_stat.cumulative_send_time += timing.send_time;
        self.context_stat.cumulative_receive_time += timing.receive_time;
        self.request_timestamps.push(record);
    }

    /// Record a runtime failure; the first error wins
    pub fn record_error(&mut self, error: CargadorError) {
        if self.status.is_none() {
            self.status = Some(error);
        }
    }
}

// ============================================================================
// Cooperative cancellation
// ============================================================================

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared cancellation signal with a wake condition
///
/// Signalling is eventual and non-preemptive: an in-flight request is
/// allowed to complete before its worker observes the token. Cancelling an
/// already-cancelled token is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation and wake every blocked waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let _guard = self
            .inner
            .lock
            .lock()
            .expect("cancel token lock poisoned");
        self.inner.wake.notify_all();
    }

    /// Block until cancelled or the timeout elapses
    ///
    /// Returns whether the token is cancelled on wake-up, so idle workers
    /// can use this directly as their loop condition.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let guard = self
            .inner
            .lock
            .lock()
            .expect("cancel token lock poisoned");
        let (_guard, _timed_out) = self
            .inner
            .wake
            .wait_timeout_while(guard, timeout, |_| !self.is_cancelled())
            .expect("cancel token condvar poisoned");
        self.is_cancelled()
    }
}

// ============================================================================
// Pacing strategy
// ============================================================================

/// Request-issuance cadence, injected by the concurrency policy
///
/// Implementations must observe the cancellation token and return `false`
/// once it is set; the pool checks the token at every loop boundary as
/// well, so a request cycle is never started after cancellation is
/// observed.
pub trait Pacing: Send + Sync {
    /// Block until the next request should be issued
    ///
    /// Returns `false` when the worker should stop issuing requests.
    fn next_request(&self, worker_id: usize, cancel: &CancelToken) -> bool;
}

/// Issue requests back-to-back, one in flight per worker
#[derive(Debug, Clone, Copy, Default)]
pub struct Saturating;

impl Pacing for Saturating {
    fn next_request(&self, _worker_id: usize, cancel: &CancelToken) -> bool {
        !cancel.is_cancelled()
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// Pool-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of workers the pool will ever hold; stat capacity is
    /// reserved up front for all of them
    pub max_workers: usize,
    /// Batch size applied to every request
    pub batch_size: usize,
    /// Base sequence length for stateful load patterns
    pub sequence_length: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 16,
            batch_size: 1,
            sequence_length: 20,
        }
    }
}

impl PoolConfig {
    /// Set the maximum worker count
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the per-request batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the base sequence length
    #[must_use]
    pub fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = sequence_length;
        self
    }
}

/// Handle given to each worker: its id, stat record, and the shared token
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: usize,
    stat: Arc<Mutex<ThreadStat>>,
    cancel: CancelToken,
}

impl WorkerHandle {
    /// Stable worker id assigned at spawn time
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// The pool's shared cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record one completed request into this worker's stat
    pub fn record_request(&self, record: RequestRecord, timing: &RequestTiming) {
        lock_stat(&self.stat).record_request(record, timing);
    }

    /// Record a runtime failure into this worker's status
    pub fn record_error(&self, error: CargadorError) {
        lock_stat(&self.stat).record_error(error);
    }
}

/// Owns the worker threads, their stat records, and the shutdown protocol
#[derive(Debug)]
pub struct WorkerPool {
    config: PoolConfig,
    cancel: CancelToken,
    threads: Vec<JoinHandle<()>>,
    thread_stats: Vec<Arc<Mutex<ThreadStat>>>,
    errors_logged: bool,
}

impl WorkerPool {
    /// Create a pool with capacity reserved for `config.max_workers`
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        // Reserved before any thread starts so the stat arena never
        // reallocates while concurrent readers hold entries.
        let capacity = config.max_workers;
        Self {
            config,
            cancel: CancelToken::new(),
            threads: Vec::with_capacity(capacity),
            thread_stats: Vec::with_capacity(capacity),
            errors_logged: false,
        }
    }

    /// Pool configuration
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// A clone of the pool's cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Number of workers spawned so far
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.thread_stats.len()
    }

    /// Spawn one worker running the given closure
    ///
    /// The closure receives a [`WorkerHandle`] carrying the worker's id, its
    /// pre-allocated stat record, and the shared cancellation token; it owns
    /// the request cycle from there. Returns the worker id.
    ///
    /// # Errors
    /// Returns a configuration error once `max_workers` workers exist.
    pub fn spawn_worker<F>(&mut self, work: F) -> Result<usize>
    where
        F: FnOnce(WorkerHandle) + Send + 'static,
    {
        if self.threads.len() == self.config.max_workers {
            return Err(CargadorError::InvalidConfiguration {
                reason: format!(
                    "worker capacity {} exhausted, cannot spawn another worker",
                    self.config.max_workers
                ),
            });
        }
        let id = self.threads.len();
        let stat = Arc::new(Mutex::new(ThreadStat::default()));
        self.thread_stats.push(Arc::clone(&stat));
        let handle = WorkerHandle {
            id,
            stat,
            cancel: self.cancel.clone(),
        };
        self.threads.push(thread::spawn(move || work(handle)));
        Ok(id)
    }

    /// Spawn one worker running the standard request loop
    ///
    /// The worker opens a context, then repeats {observe cancellation via
    /// `pacing` -> bind inputs -> issue the request -> record timestamp and
    /// counters} until cancelled or faulted.
    ///
    /// # Errors
    /// Returns a configuration error once `max_workers` workers exist.
    pub fn spawn_request_worker(
        &mut self,
        factory: Arc<dyn ClientFactory>,
        store: Arc<InputDataStore>,
        pacing: Arc<dyn Pacing>,
    ) -> Result<usize> {
        let batch_size = self.config.batch_size;
        self.spawn_worker(move |handle| {
            let mut binder = RequestBinder::new(batch_size);
            run_request_loop(&handle, factory.as_ref(), &store, &mut binder, pacing.as_ref());
        })
    }

    /// Drain every worker's timestamp log into `new_timestamps`
    ///
    /// The previous contents of `new_timestamps` are replaced. Each record
    /// is returned to exactly one caller and never duplicated or lost, even
    /// while workers keep appending concurrently.
    pub fn swap_timestamps(&self, new_timestamps: &mut Vec<RequestRecord>) {
        let mut total = Vec::new();
        for stat in &self.thread_stats {
            let mut guard = lock_stat(stat);
            total.append(&mut guard.request_timestamps);
        }
        std::mem::swap(&mut total, new_timestamps);
    }

    /// Sum cumulative counters across all workers
    ///
    /// Non-destructive: repeated calls return monotonically non-decreasing
    /// totals until [`WorkerPool::reset_stats`] is called.
    #[must_use]
    pub fn accumulated_stat(&self) -> ContextStat {
        let mut total = ContextStat::default();
        for stat in &self.thread_stats {
            total.accumulate(&lock_stat(stat).context_stat);
        }
        total
    }

    /// Clear every worker's counters and pending timestamps
    pub fn reset_stats(&self) {
        for stat in &self.thread_stats {
            let mut guard = lock_stat(stat);
            guard.request_timestamps.clear();
            guard.context_stat = ContextStat::default();
        }
    }

    /// Aggregate pool health: any faulted worker fails the check
    ///
    /// Per-worker detail is not repeated here; it is logged once at
    /// shutdown.
    ///
    /// # Errors
    /// Returns [`CargadorError::UnhealthyPool`] if any worker's status is
    /// non-ok.
    pub fn check_health(&self) -> Result<()> {
        let failed = self
            .thread_stats
            .iter()
            .filter(|stat| !lock_stat(stat).is_ok())
            .count();
        if failed > 0 {
            return Err(CargadorError::UnhealthyPool { failed });
        }
        Ok(())
    }

    /// Cancel, join every worker, and log failed statuses exactly once
    ///
    /// Joining has no timeout: a worker stuck inside the external request
    /// call blocks teardown until the transport's own timeout fires.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        for (id, thread) in self.threads.drain(..).enumerate() {
            if thread.join().is_err() {
                tracing::error!(worker = id, "worker thread panicked");
            }
        }
        if !self.errors_logged {
            self.errors_logged = true;
            for (id, stat) in self.thread_stats.iter().enumerate() {
                if let Some(error) = lock_stat(stat).error() {
                    tracing::error!(worker = id, %error, "worker finished with error");
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_stat(stat: &Arc<Mutex<ThreadStat>>) -> MutexGuard<'_, ThreadStat> {
    stat.lock().expect("thread stat lock poisoned")
}

/// Standard request cycle shared by all pacing policies
///
/// Opens one context per worker and repeats {pace -> bind -> run -> record}
/// until the pacing strategy stops or an unrecoverable error is recorded.
/// Errors never propagate out of the worker; they land in its own status.
pub fn run_request_loop(
    handle: &WorkerHandle,
    factory: &dyn ClientFactory,
    store: &InputDataStore,
    binder: &mut RequestBinder,
    pacing: &dyn Pacing,
) {
    let mut ctx = match factory.create_context() {
        Ok(ctx) => ctx,
        Err(error) => {
            handle.record_error(error);
            return;
        }
    };

    while !handle.is_cancelled() && pacing.next_request(handle.id(), handle.cancel_token()) {
        if let Err(error) = binder.prepare(ctx.as_mut(), store) {
            handle.record_error(error);
            return;
        }
        let start = Instant::now();
        match ctx.run() {
            Ok(timing) => {
                let record = RequestRecord {
                    start,
                    end: Instant::now(),
                };
                handle.record_request(record, &timing);
            }
            Err(error) => {
                handle.record_error(error);
                return;
            }
        }
    }
}

// ============================================================================
// Sequence length randomizer
// ============================================================================

/// Vary a base sequence length by a uniform random offset
///
/// Returns `base + trunc(uniform(-1,1) * offset_ratio * base)`, clamped to a
/// minimum of 1. A ratio of 0 returns the base length exactly.
#[must_use]
pub fn random_sequence_length(base: usize, offset_ratio: f64) -> usize {
    let jitter = (2.0 * rand::thread_rng().gen::<f64>() - 1.0) * offset_ratio * base as f64;
    let offset = jitter as i64;
    let length = base as i64 + offset;
    if length <= 0 {
        1
    } else {
        length as usize
    }
}
