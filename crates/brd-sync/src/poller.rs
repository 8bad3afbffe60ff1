//! Bounded polling for long-running backend jobs
//!
//! [`AsyncJobPoller::poll`] spawns one task per job. The task waits one
//! interval, calls the status check, and repeats until the job reaches a
//! terminal status, runs out of attempts, or is cancelled. Handles share
//! nothing with each other.
//!
//! Guarantees:
//! - the first check happens after one interval, never immediately
//! - `on_terminal` runs at most once, and never after `cancel()`
//! - exhaustion is silent: `on_terminal` does not run, the outcome is
//!   [`PollOutcome::Exhausted`]

use crate::error::SyncError;
use brd_model::EntityId;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Backend-issued job identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` or `failed`
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How a poll run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Terminal status reached; `on_terminal` ran with it
    Terminal(JobStatus),
    /// `max_attempts` checks without a terminal status
    Exhausted { attempts: u32 },
    /// Cancelled through the handle
    Cancelled,
}

/// Poll parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollOptions {
    #[inline]
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Callback run once on a terminal status
pub type OnTerminal = Box<dyn FnOnce(JobStatus) + Send + 'static>;

/// Boxed status check
pub type StatusCheck = Box<dyn FnMut() -> BoxFuture<'static, Result<JobStatus, SyncError>> + Send>;

#[derive(Debug)]
struct JobShared {
    resource_id: EntityId,
    options: PollOptions,
    attempts: AtomicU32,
    cancelled: AtomicBool,
    /// Claimed by whichever of `cancel()` and a terminal status comes first
    settled: AtomicBool,
    wake: Notify,
    outcome: watch::Sender<Option<PollOutcome>>,
}

impl JobShared {
    fn finish(&self, outcome: PollOutcome) {
        self.outcome.send_replace(Some(outcome));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a terminal status may still be delivered; at most one caller wins
    fn claim_terminal(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.notified().await;
        }
    }
}

/// Handle to one in-flight poll run
///
/// Cloning shares the run; cancelling any clone cancels it.
#[derive(Debug, Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
}

impl JobHandle {
    /// Resource the job works on
    #[inline]
    #[must_use]
    pub fn resource_id(&self) -> &EntityId {
        &self.shared.resource_id
    }

    /// Status checks issued so far
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.options.interval
    }

    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.shared.options.max_attempts
    }

    /// Stop future checks. A check already in flight is abandoned and its
    /// result never reaches `on_terminal`.
    pub fn cancel(&self) {
        self.shared.settled.store(true, Ordering::SeqCst);
        if !self.shared.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!(resource = %self.shared.resource_id, "poll cancelled");
        }
        self.shared.wake.notify_one();
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Outcome, if the run is over
    #[must_use]
    pub fn outcome(&self) -> Option<PollOutcome> {
        *self.shared.outcome.borrow()
    }

    /// Wait for the run to end
    pub async fn finished(&self) -> PollOutcome {
        let mut rx = self.shared.outcome.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return PollOutcome::Cancelled;
            }
        }
    }
}

/// Spawns bounded poll runs
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncJobPoller;

impl AsyncJobPoller {
    /// Start polling `check` for `resource_id`
    ///
    /// Must be called inside a tokio runtime.
    pub fn poll<F, Fut>(
        resource_id: impl Into<EntityId>,
        mut check: F,
        options: PollOptions,
        on_terminal: impl FnOnce(JobStatus) + Send + 'static,
    ) -> JobHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<JobStatus, SyncError>> + Send + 'static,
    {
        let boxed: StatusCheck =
            Box::new(move || -> BoxFuture<'static, Result<JobStatus, SyncError>> {
                Box::pin(check())
            });
        Self::poll_boxed(resource_id.into(), boxed, options, Box::new(on_terminal))
    }

    fn poll_boxed(
        resource_id: EntityId,
        check: StatusCheck,
        options: PollOptions,
        on_terminal: OnTerminal,
    ) -> JobHandle {
        let (outcome, _) = watch::channel(None);
        let shared = Arc::new(JobShared {
            resource_id,
            options,
            attempts: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            settled: AtomicBool::new(false),
            wake: Notify::new(),
            outcome,
        });

        tokio::spawn(run(Arc::clone(&shared), check, on_terminal));
        JobHandle { shared }
    }
}

async fn run(shared: Arc<JobShared>, mut check: StatusCheck, on_terminal: OnTerminal) {
    let PollOptions {
        interval,
        max_attempts,
    } = shared.options;

    loop {
        let attempts = shared.attempts.load(Ordering::SeqCst);
        if attempts >= max_attempts {
            tracing::info!(resource = %shared.resource_id, attempts, "poll exhausted");
            shared.finish(PollOutcome::Exhausted { attempts });
            return;
        }

        tokio::select! {
            biased;
            () = shared.cancelled() => {
                shared.finish(PollOutcome::Cancelled);
                return;
            }
            () = tokio::time::sleep(interval) => {}
        }

        shared.attempts.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            biased;
            () = shared.cancelled() => {
                shared.finish(PollOutcome::Cancelled);
                return;
            }
            result = check() => result,
        };

        match result {
            Ok(status) if status.is_terminal() => {
                if !shared.claim_terminal() {
                    shared.finish(PollOutcome::Cancelled);
                    return;
                }
                tracing::debug!(resource = %shared.resource_id, ?status, "poll reached terminal status");
                on_terminal(status);
                shared.finish(PollOutcome::Terminal(status));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                // A failed check counts as an attempt; the job itself may be fine
                tracing::warn!(resource = %shared.resource_id, error = %e, "status check failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn options(max_attempts: u32) -> PollOptions {
        PollOptions::new(Duration::from_millis(100), max_attempts)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_checks_exactly_max_attempts() {
        let calls = counter();
        let terminal = counter();
        let (c, t) = (Arc::clone(&calls), Arc::clone(&terminal));

        let handle = AsyncJobPoller::poll(
            "doc-1",
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(JobStatus::Pending)
                }
            },
            options(5),
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(handle.finished().await, PollOutcome::Exhausted { attempts: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(terminal.load(Ordering::SeqCst), 0);
        assert_eq!(handle.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_waits_one_interval() {
        let calls = counter();
        let c = Arc::clone(&calls);
        let handle = AsyncJobPoller::poll(
            "doc-1",
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(JobStatus::Running)
                }
            },
            options(10),
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_status_fires_callback_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = counter();
        let (s, c) = (Arc::clone(&seen), Arc::clone(&calls));

        let handle = AsyncJobPoller::poll(
            "doc-1",
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n < 2 {
                        JobStatus::Running
                    } else {
                        JobStatus::Completed
                    })
                }
            },
            options(10),
            move |status| s.lock().unwrap().push(status),
        );

        assert_eq!(handle.finished().await, PollOutcome::Terminal(JobStatus::Completed));
        assert_eq!(*seen.lock().unwrap(), vec![JobStatus::Completed]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_is_terminal() {
        let handle = AsyncJobPoller::poll(
            "doc-1",
            || async { Ok(JobStatus::Failed) },
            options(3),
            |_| {},
        );
        assert_eq!(handle.finished().await, PollOutcome::Terminal(JobStatus::Failed));
        assert_eq!(handle.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_count_as_attempts() {
        let handle = AsyncJobPoller::poll(
            "doc-1",
            || async { Err(SyncError::Backend(BackendError::Transport("down".into()))) },
            options(3),
            |_| {},
        );
        assert_eq!(handle.finished().await, PollOutcome::Exhausted { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_in_flight_check_discards_result() {
        let terminal = counter();
        let t = Arc::clone(&terminal);
        let (dispatched_tx, dispatched_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some((dispatched_tx, release_rx))));

        let handle = AsyncJobPoller::poll(
            "doc-1",
            move || {
                let pair = gate.lock().unwrap().take();
                async move {
                    if let Some((dispatched, release)) = pair {
                        let _ = dispatched.send(());
                        let _ = release.await;
                    }
                    Ok(JobStatus::Completed)
                }
            },
            options(10),
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );

        dispatched_rx.await.unwrap();
        handle.cancel();
        let _ = release_tx.send(());

        assert_eq!(handle.finished().await, PollOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(terminal.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_check() {
        let calls = counter();
        let c = Arc::clone(&calls);
        let handle = AsyncJobPoller::poll(
            "doc-1",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(JobStatus::Completed) }
            },
            options(10),
            |_| panic!("must not run after cancel"),
        );

        handle.cancel();
        assert_eq!(handle.finished().await, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancel_and_completion_agree() {
        for _ in 0..200 {
            let terminal = counter();
            let t = Arc::clone(&terminal);
            let handle = AsyncJobPoller::poll(
                "doc-1",
                || async { Ok(JobStatus::Completed) },
                PollOptions::new(Duration::from_millis(1), 3),
                move |_| {
                    t.fetch_add(1, Ordering::SeqCst);
                },
            );

            let canceller = handle.clone();
            let cancel = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                canceller.cancel();
            });
            let outcome = handle.finished().await;
            cancel.await.unwrap();

            let fired = terminal.load(Ordering::SeqCst);
            match outcome {
                PollOutcome::Terminal(_) => assert_eq!(fired, 1),
                PollOutcome::Cancelled => assert_eq!(fired, 0),
                PollOutcome::Exhausted { .. } => panic!("completed job exhausted"),
            }
        }
    }

    #[test]
    fn cancel_claims_before_terminal() {
        let (outcome, _) = watch::channel(None);
        let shared = JobShared {
            resource_id: EntityId::from("doc-1"),
            options: options(1),
            attempts: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            settled: AtomicBool::new(false),
            wake: Notify::new(),
            outcome,
        };
        let handle = JobHandle {
            shared: Arc::new(shared),
        };

        handle.cancel();
        assert!(!handle.shared.claim_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn handles_are_independent() {
        let a = AsyncJobPoller::poll("a", || async { Ok(JobStatus::Pending) }, options(2), |_| {});
        let b = AsyncJobPoller::poll("b", || async { Ok(JobStatus::Completed) }, options(2), |_| {});

        a.cancel();
        assert_eq!(a.finished().await, PollOutcome::Cancelled);
        assert_eq!(b.finished().await, PollOutcome::Terminal(JobStatus::Completed));
        assert_eq!(b.resource_id().as_str(), "b");
    }
}
