//! Outbound call scheduler.
//!
//! [`CallScheduler`] throttles calls to a rate-limited generation API
//! shared by every tool invocation in the process:
//!
//! - at most `max_parallel` calls execute at once;
//! - call *starts* are spaced by `min_interval_between_start` plus a
//!   random jitter, globally across all callers;
//! - transient failures (see [`is_retryable`]) are retried with capped
//!   exponential backoff plus jitter, up to `max_attempts` attempts.
//!
//! Per-call lifecycle:
//! `queued → spacing-delay → executing → {succeeded | retry-delay → executing | failed}`.
//!
//! The queue is strictly FIFO for starts: the start instant is reserved
//! when a call is dequeued, so a call enqueued earlier never starts later.
//! There is no cancellation; a hung call holds its slot until the
//! underlying future resolves.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::{
    GenerationError, CODE_CONNECTION_RESET, CODE_DNS_RETRY, CODE_SCHEDULER_ABORTED,
    CODE_SOCKET_TIMED_OUT, CODE_TIMED_OUT,
};

pub const MAX_PARALLEL: usize = 3;
pub const MIN_INTERVAL_BETWEEN_START_MS: u64 = 200;
pub const START_JITTER_MS: u64 = 200;
pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_RETRY_DELAY_MS: u64 = 500;
pub const MAX_RETRY_DELAY_MS: u64 = 4000;
pub const RETRY_JITTER_MS: u64 = 200;

/// HTTP statuses that indicate a transient upstream condition.
const RETRYABLE_STATUSES: &[u16] = &[408, 425, 429, 500, 502, 503, 504];

/// Provider reason codes for rate limiting / resource exhaustion.
const RETRYABLE_REASONS: &[&str] = &[
    "RESOURCE_EXHAUSTED",
    "RATE_LIMIT_EXCEEDED",
    "RATELIMITEXCEEDED",
    "USERRATELIMITEXCEEDED",
];

const RETRYABLE_CODES: &[&str] = &[
    CODE_CONNECTION_RESET,
    CODE_TIMED_OUT,
    CODE_DNS_RETRY,
    CODE_SOCKET_TIMED_OUT,
];

const RETRYABLE_MESSAGE_HINTS: &[&str] =
    &["rate limit", "temporarily unavailable", "timeout", "network"];

/// Message fragments that mark an error as terminal regardless of status.
const TERMINAL_MESSAGE_HINTS: &[&str] = &["quota", "insufficient"];

// ── Config ───────────────────────────────────────────────────

/// Tunables for a [`CallScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
    pub min_interval_between_start: Duration,
    pub start_jitter: Duration,
    pub max_attempts: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: MAX_PARALLEL,
            min_interval_between_start: Duration::from_millis(MIN_INTERVAL_BETWEEN_START_MS),
            start_jitter: Duration::from_millis(START_JITTER_MS),
            max_attempts: MAX_ATTEMPTS,
            base_retry_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max_retry_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            retry_jitter: Duration::from_millis(RETRY_JITTER_MS),
        }
    }
}

impl SchedulerConfig {
    /// Deterministic part of the retry delay after failed attempt `attempt`
    /// (1-based): `min(max_retry_delay, base_retry_delay * 2^(attempt-1))`.
    pub fn backoff_base(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }

    /// Full retry delay: [`backoff_base`](Self::backoff_base) plus a
    /// uniform jitter in `[0, retry_jitter]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base(attempt) + random_up_to(self.retry_jitter)
    }
}

fn random_up_to(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

// ── Classification ───────────────────────────────────────────

/// Decide whether a failed generation call is worth retrying.
///
/// Quota / insufficient-resource errors are terminal even when their
/// status or wording would otherwise look transient.
pub fn is_retryable(err: &GenerationError) -> bool {
    let msg = err.message.to_lowercase();
    if TERMINAL_MESSAGE_HINTS.iter().any(|h| msg.contains(h)) {
        return false;
    }
    if err.status.is_some_and(|s| RETRYABLE_STATUSES.contains(&s)) {
        return true;
    }
    if let Some(reason) = &err.reason {
        let upper = reason.to_uppercase();
        if RETRYABLE_REASONS.contains(&upper.as_str()) {
            return true;
        }
    }
    if let Some(code) = &err.code {
        if RETRYABLE_CODES.contains(&code.to_uppercase().as_str()) {
            return true;
        }
    }
    RETRYABLE_MESSAGE_HINTS.iter().any(|h| msg.contains(h))
}

// ── Scheduler ────────────────────────────────────────────────

/// A queued unit of work.  Receives the reserved start instant.
type Job = Box<dyn FnOnce(Instant) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct State {
    queue: VecDeque<Job>,
    active: usize,
    last_start: Option<Instant>,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
}

/// Snapshot of scheduler occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub active: usize,
    pub queued: usize,
}

/// Concurrency-bounded, start-spaced, retrying call scheduler.
///
/// Cloning yields another handle to the same queue.  Build one at process
/// startup and hand clones to every component issuing generation calls.
#[derive(Clone)]
pub struct CallScheduler {
    inner: Arc<Inner>,
}

impl Default for CallScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl CallScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            max_parallel: config.max_parallel.max(1),
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    active: 0,
                    last_start: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> SchedulerStats {
        let st = self.inner.lock();
        SchedulerStats {
            active: st.active,
            queued: st.queue.len(),
        }
    }

    /// Enqueue `call` and resolve with its eventual outcome.
    ///
    /// `call` is invoked once per attempt, so it must be able to rebuild
    /// its future from scratch.  Must be called within a Tokio runtime.
    pub async fn schedule<T, F, Fut>(&self, call: F) -> Result<T, GenerationError>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, GenerationError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let config = self.inner.config.clone();
        let job: Job = Box::new(move |start_at: Instant| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                tokio::time::sleep_until(start_at).await;
                let result = run_with_retry(&config, call).await;
                let _ = tx.send(result);
            })
        });

        {
            let mut st = self.inner.lock();
            st.queue.push_back(job);
            debug!(queued = st.queue.len(), active = st.active, "generation call queued");
        }
        Inner::drain(&self.inner);

        rx.await.map_err(|_| {
            GenerationError::transport(
                CODE_SCHEDULER_ABORTED,
                "scheduled call ended without reporting a result",
            )
        })?
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic inside a job never happens while the lock is held, so a
        // poisoned lock still guards consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start as many queued jobs as the concurrency limit allows.
    fn drain(this: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("call scheduler drained outside a Tokio runtime; queued calls stay pending");
            return;
        };

        let mut ready = Vec::new();
        {
            let mut st = this.lock();
            while st.active < this.config.max_parallel {
                let Some(job) = st.queue.pop_front() else {
                    break;
                };
                st.active += 1;

                let now = Instant::now();
                let earliest = match st.last_start {
                    Some(prev) => (prev + this.config.min_interval_between_start).max(now),
                    None => now,
                };
                let start_at = earliest + random_up_to(this.config.start_jitter);
                st.last_start = Some(start_at);
                debug!(
                    active = st.active,
                    queued = st.queue.len(),
                    delay_ms = start_at.saturating_duration_since(now).as_millis() as u64,
                    "generation call dequeued"
                );
                ready.push((job, start_at));
            }
        }

        for (job, start_at) in ready {
            let slot = SlotGuard {
                inner: Arc::clone(this),
            };
            handle.spawn(async move {
                let _slot = slot;
                job(start_at).await;
            });
        }
    }
}

/// Releases one active slot when dropped (including on panic) and
/// triggers another drain from a fresh task.
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut st = self.inner.lock();
            st.active = st.active.saturating_sub(1);
        }
        let inner = Arc::clone(&self.inner);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { Inner::drain(&inner) });
        }
    }
}

/// Run `call` until it succeeds, fails terminally, or exhausts attempts.
async fn run_with_retry<T, F, Fut>(config: &SchedulerConfig, mut call: F) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = is_retryable(&err);
                if !retryable || attempt >= config.max_attempts {
                    warn!(
                        attempt,
                        max_attempts = config.max_attempts,
                        retryable,
                        error = %err,
                        "generation call failed"
                    );
                    return Err(err);
                }
                let delay = config.backoff_delay(attempt);
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient generation failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
