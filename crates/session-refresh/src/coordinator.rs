//! Single-refresher coordination
//!
//! The coordinator owns the only shared mutable state of the subsystem: the
//! "refresh in progress" flag and two waiting queues (paused request
//! continuations and paused stream factories). All three live behind one
//! mutex that is never held across an `.await`, so observing the flag and then
//! either opening a window or joining one is a single atomic step.
//!
//! Windows:
//! - Idle → RefreshWindow on `begin()` / `acquire()` returning `Refresher`
//! - RefreshWindow → Idle on `finish()`, the only point the queues drain

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Deferred stream (re)connection, run once a refresh succeeds.
pub type StreamFactory = Box<dyn FnOnce() + Send + 'static>;

/// How a refresh window settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failure(String),
}

impl RefreshOutcome {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failure(_) => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Success)
    }

    /// `Ok(())` on success, `RefreshFailed` carrying the reason otherwise.
    pub fn into_result(self) -> Result<()> {
        match self {
            RefreshOutcome::Success => Ok(()),
            RefreshOutcome::Failure(reason) => Err(Error::RefreshFailed(reason)),
        }
    }
}

/// Snapshot of the waiting queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub continuations: usize,
    pub stream_factories: usize,
}

#[derive(Default)]
struct State {
    in_progress: bool,
    continuations: Vec<oneshot::Sender<RefreshOutcome>>,
    stream_factories: Vec<StreamFactory>,
}

/// Serializes credential refreshes for one session.
///
/// Construct once per process and share it (`Arc<RefreshCoordinator>`) with the
/// interception layer and the stream reconnector.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panicking factory must not wedge every later refresh, so poisoning is
    /// ignored: the state is consistent at every unlock point.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a refresh window is currently open.
    pub fn is_in_progress(&self) -> bool {
        self.lock().in_progress
    }

    /// Open a refresh window. Returns false (and changes nothing) if one is
    /// already open, so a racing second caller can never become a refresher.
    pub fn begin(&self) -> bool {
        let mut state = self.lock();
        if state.in_progress {
            return false;
        }
        state.in_progress = true;
        debug!("refresh window opened");
        true
    }

    /// Close the refresh window and release every waiter.
    ///
    /// Both queues are swapped out under the lock before anything is released,
    /// so an enqueue racing with this call lands in a fresh window instead of
    /// a half-drained one. Continuations receive the outcome; stream factories
    /// run on success and are dropped uninvoked on failure.
    pub fn finish(&self, outcome: RefreshOutcome) {
        let (continuations, stream_factories) = {
            let mut state = self.lock();
            if !state.in_progress {
                warn!(
                    outcome = outcome.label(),
                    "finish called with no refresh in progress"
                );
                return;
            }
            state.in_progress = false;
            (
                std::mem::take(&mut state.continuations),
                std::mem::take(&mut state.stream_factories),
            )
        };

        info!(
            outcome = outcome.label(),
            waiters = continuations.len(),
            streams = stream_factories.len(),
            "session refresh settled"
        );
        crate::metrics::record_refresh(outcome.label());

        for tx in continuations {
            // A closed receiver is a waiter that gave up; nothing to release.
            let _ = tx.send(outcome.clone());
        }

        if outcome.is_success() {
            for factory in stream_factories {
                factory();
            }
        } else if !stream_factories.is_empty() {
            debug!(
                streams = stream_factories.len(),
                "dropping deferred stream connections after failed refresh"
            );
        }
    }

    /// Queue a paused request until the open window settles.
    ///
    /// Fails with `NotRefreshing` when no window is open.
    pub fn enqueue_continuation(&self) -> Result<Continuation> {
        let mut state = self.lock();
        if !state.in_progress {
            return Err(Error::NotRefreshing);
        }
        crate::metrics::record_waiter();
        Ok(Self::push_continuation(&mut state))
    }

    /// Queue a stream factory until the open window settles.
    ///
    /// When no window is open the factory is handed back for the caller to
    /// run immediately.
    pub fn enqueue_stream_factory(
        &self,
        factory: StreamFactory,
    ) -> std::result::Result<(), StreamFactory> {
        let mut state = self.lock();
        if !state.in_progress {
            return Err(factory);
        }
        state.stream_factories.push(factory);
        debug!(
            streams = state.stream_factories.len(),
            "stream connection deferred until refresh settles"
        );
        crate::metrics::record_stream_deferred();
        Ok(())
    }

    /// Either open a new window (this caller runs the refresh) or join the
    /// open one, in a single critical section.
    ///
    /// The guard owns a handle on the coordinator so the refresh can be moved
    /// onto its own task, away from the caller that triggered it.
    pub fn acquire(self: &Arc<Self>) -> RefreshTicket {
        let mut state = self.lock();
        if state.in_progress {
            crate::metrics::record_waiter();
            return RefreshTicket::Waiter(Self::push_continuation(&mut state));
        }
        state.in_progress = true;
        debug!("refresh window opened");
        RefreshTicket::Refresher(RefreshGuard {
            coordinator: Arc::clone(self),
            settled: false,
        })
    }

    pub fn queue_depths(&self) -> QueueDepths {
        let state = self.lock();
        QueueDepths {
            continuations: state.continuations.len(),
            stream_factories: state.stream_factories.len(),
        }
    }

    fn push_continuation(state: &mut State) -> Continuation {
        let (tx, rx) = oneshot::channel();
        state.continuations.push(tx);
        debug!(
            waiters = state.continuations.len(),
            "refresh in progress, waiting for outcome"
        );
        Continuation { rx }
    }
}

/// Role handed out by `RefreshCoordinator::acquire`.
pub enum RefreshTicket {
    /// This caller opened the window and must settle it.
    Refresher(RefreshGuard),
    /// Another caller is refreshing; wait for its outcome.
    Waiter(Continuation),
}

/// Proof that the holder opened the current refresh window.
///
/// Dropping it without calling `finish` (the task running the refresh
/// panicked or was torn down with its runtime) settles the window as a
/// failure so no waiter is stranded.
#[must_use = "dropping the guard fails the refresh window"]
pub struct RefreshGuard {
    coordinator: Arc<RefreshCoordinator>,
    settled: bool,
}

impl RefreshGuard {
    /// Join the window this guard opened, like any other waiter.
    ///
    /// Not counted as a waiter: the holder is the one refreshing.
    pub fn subscribe(&self) -> Continuation {
        RefreshCoordinator::push_continuation(&mut self.coordinator.lock())
    }

    pub fn finish(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.finish(outcome);
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresher dropped before settling, failing waiters");
            self.coordinator
                .finish(RefreshOutcome::Failure("refresh abandoned".into()));
        }
    }
}

/// A paused caller's handle on the open window's outcome.
///
/// Dropping it cancels only this waiter.
#[derive(Debug)]
pub struct Continuation {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl Continuation {
    /// Resolve once the window settles: `Ok(())` on success, `RefreshFailed` otherwise.
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(Error::RefreshFailed(
                "refresh window closed without releasing waiter".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(counter: &Arc<AtomicUsize>) -> StreamFactory {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn begin_transitions_once() {
        let coordinator = RefreshCoordinator::new();
        assert!(!coordinator.is_in_progress());
        assert!(coordinator.begin());
        assert!(coordinator.is_in_progress());
        // Second begin while open must not succeed
        assert!(!coordinator.begin());
        coordinator.finish(RefreshOutcome::Success);
        assert!(!coordinator.is_in_progress());
    }

    #[test]
    fn enqueue_requires_open_window() {
        let coordinator = RefreshCoordinator::new();
        assert_eq!(
            coordinator.enqueue_continuation().unwrap_err(),
            Error::NotRefreshing
        );

        let ran = Arc::new(AtomicUsize::new(0));
        let handed_back = coordinator
            .enqueue_stream_factory(counting_factory(&ran))
            .unwrap_err();
        handed_back();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.queue_depths(), QueueDepths::default());
    }

    #[tokio::test]
    async fn success_resumes_every_continuation() {
        let coordinator = RefreshCoordinator::new();
        assert!(coordinator.begin());
        let waiters: Vec<_> = (0..4)
            .map(|_| coordinator.enqueue_continuation().unwrap())
            .collect();
        assert_eq!(coordinator.queue_depths().continuations, 4);

        coordinator.finish(RefreshOutcome::Success);

        for waiter in waiters {
            assert_eq!(waiter.wait().await, Ok(()));
        }
    }

    #[tokio::test]
    async fn failure_rejects_every_continuation() {
        let coordinator = RefreshCoordinator::new();
        assert!(coordinator.begin());
        let waiters: Vec<_> = (0..3)
            .map(|_| coordinator.enqueue_continuation().unwrap())
            .collect();

        coordinator.finish(RefreshOutcome::Failure("session revoked".into()));

        for waiter in waiters {
            assert_eq!(
                waiter.wait().await,
                Err(Error::RefreshFailed("session revoked".into()))
            );
        }
    }

    #[test]
    fn finish_drains_both_queues_in_either_outcome() {
        for outcome in [
            RefreshOutcome::Success,
            RefreshOutcome::Failure("nope".into()),
        ] {
            let coordinator = RefreshCoordinator::new();
            let ran = Arc::new(AtomicUsize::new(0));
            assert!(coordinator.begin());
            let _waiter = coordinator.enqueue_continuation().unwrap();
            assert!(
                coordinator
                    .enqueue_stream_factory(counting_factory(&ran))
                    .is_ok()
            );
            assert_eq!(
                coordinator.queue_depths(),
                QueueDepths {
                    continuations: 1,
                    stream_factories: 1
                }
            );

            coordinator.finish(outcome);

            assert_eq!(coordinator.queue_depths(), QueueDepths::default());
            assert!(!coordinator.is_in_progress());
        }
    }

    #[test]
    fn stream_factories_run_only_on_success() {
        let coordinator = RefreshCoordinator::new();
        let ran = Arc::new(AtomicUsize::new(0));

        assert!(coordinator.begin());
        for _ in 0..2 {
            assert!(
                coordinator
                    .enqueue_stream_factory(counting_factory(&ran))
                    .is_ok()
            );
        }
        coordinator.finish(RefreshOutcome::Failure("expired".into()));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert!(coordinator.begin());
        for _ in 0..2 {
            assert!(
                coordinator
                    .enqueue_stream_factory(counting_factory(&ran))
                    .is_ok()
            );
        }
        coordinator.finish(RefreshOutcome::Success);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn finish_while_idle_is_noop() {
        let coordinator = RefreshCoordinator::new();
        coordinator.finish(RefreshOutcome::Success);
        assert!(!coordinator.is_in_progress());
        assert_eq!(coordinator.queue_depths(), QueueDepths::default());
    }

    #[tokio::test]
    async fn acquire_hands_out_one_refresher() {
        let coordinator = Arc::new(RefreshCoordinator::new());

        let guard = match coordinator.acquire() {
            RefreshTicket::Refresher(guard) => guard,
            RefreshTicket::Waiter(_) => panic!("first caller must refresh"),
        };
        let waiters: Vec<_> = (0..3)
            .map(|_| match coordinator.acquire() {
                RefreshTicket::Waiter(waiter) => waiter,
                RefreshTicket::Refresher(_) => panic!("second refresher in one window"),
            })
            .collect();

        guard.finish(RefreshOutcome::Success);

        for waiter in waiters {
            assert_eq!(waiter.wait().await, Ok(()));
        }
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn dropped_guard_fails_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let guard = match coordinator.acquire() {
            RefreshTicket::Refresher(guard) => guard,
            RefreshTicket::Waiter(_) => panic!("first caller must refresh"),
        };
        let waiter = coordinator.enqueue_continuation().unwrap();

        drop(guard);

        assert_eq!(
            waiter.wait().await,
            Err(Error::RefreshFailed("refresh abandoned".into()))
        );
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn guard_holder_receives_its_own_outcome() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let guard = match coordinator.acquire() {
            RefreshTicket::Refresher(guard) => guard,
            RefreshTicket::Waiter(_) => panic!("first caller must refresh"),
        };
        let own = guard.subscribe();
        let other = coordinator.enqueue_continuation().unwrap();
        assert_eq!(coordinator.queue_depths().continuations, 2);

        guard.finish(RefreshOutcome::Failure("revoked".into()));

        assert_eq!(own.wait().await, Err(Error::RefreshFailed("revoked".into())));
        assert_eq!(other.wait().await, Err(Error::RefreshFailed("revoked".into())));
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_affect_others() {
        let coordinator = RefreshCoordinator::new();
        assert!(coordinator.begin());
        let cancelled = coordinator.enqueue_continuation().unwrap();
        let kept = coordinator.enqueue_continuation().unwrap();
        drop(cancelled);

        coordinator.finish(RefreshOutcome::Success);

        assert_eq!(kept.wait().await, Ok(()));
    }

    #[test]
    fn late_arrival_opens_fresh_window() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        assert!(coordinator.begin());
        coordinator.finish(RefreshOutcome::Success);

        // The drained window is gone; a late caller becomes a new refresher
        assert!(matches!(
            coordinator.acquire(),
            RefreshTicket::Refresher(_)
        ));
    }
}
