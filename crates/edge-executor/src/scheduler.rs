//! Drain scheduling and shutdown.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use edge_core::RequestId;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::DrainError;
use crate::queue::{AfterQueue, DrainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    /// `None` waits for in-flight work indefinitely.
    Draining { deadline: Option<Instant> },
}

/// Receiving end of the server's shutdown broadcast.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownState>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(ShutdownState::Running);
        Self { rx }
    }

    pub fn is_shutting_down(&self) -> bool {
        !matches!(*self.rx.borrow(), ShutdownState::Running)
    }

    /// Deadline for in-flight deferred work, once shutdown has begun.
    pub fn deadline(&self) -> Option<Instant> {
        match *self.rx.borrow() {
            ShutdownState::Draining { deadline } => deadline,
            ShutdownState::Running => None,
        }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline().is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Resolves when the grace deadline is reached. Pending forever when no
    /// deadline is ever set.
    pub async fn expired(&mut self) {
        loop {
            let state = *self.rx.borrow_and_update();
            match state {
                ShutdownState::Draining {
                    deadline: Some(deadline),
                } => {
                    tokio::time::sleep_until(deadline).await;
                    return;
                }
                ShutdownState::Draining { deadline: None } => {
                    std::future::pending::<()>().await;
                }
                ShutdownState::Running => {
                    if self.rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }
}

/// Results kept for `wait_idle` callers. Older ones are discarded first.
pub const RETAINED_RESULTS: usize = 1024;

#[derive(Debug)]
struct Drains {
    running: watch::Sender<usize>,
    finished: Mutex<VecDeque<DrainResult>>,
}

impl Drains {
    fn finished(&self) -> MutexGuard<'_, VecDeque<DrainResult>> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        request_id: &RequestId,
        outcome: std::thread::Result<Result<DrainResult, DrainError>>,
    ) {
        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(
                    request_id = %request_id,
                    completed = result.completed,
                    denied = result.denied,
                    failed = result.failed,
                    "drain finished"
                );
                let mut finished = self.finished();
                if finished.len() == RETAINED_RESULTS {
                    finished.pop_front();
                }
                finished.push_back(result);
            }
            Ok(Err(err)) => tracing::warn!(request_id = %request_id, error = %err, "drain failed"),
            Err(_) => tracing::error!(request_id = %request_id, "drain task panicked"),
        }
        self.running.send_modify(|running| *running = running.saturating_sub(1));
    }
}

/// Runs queue drains in the background once responses are produced.
///
/// Drains of different requests run concurrently; each queue is still
/// drained sequentially. Drains are detached: they outlive the scheduler
/// and are forgotten once finished and collected. Must be used inside a
/// tokio runtime.
#[derive(Debug)]
pub struct DrainScheduler {
    shutdown_tx: watch::Sender<ShutdownState>,
    drains: Arc<Drains>,
}

impl Default for DrainScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(ShutdownState::Running);
        let (running, _) = watch::channel(0);
        Self {
            shutdown_tx,
            drains: Arc::new(Drains {
                running,
                finished: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Drain `queue` in the background.
    pub fn spawn(&self, queue: Arc<AfterQueue>) {
        let signal = self.signal();
        let drains = self.drains.clone();
        let request_id = queue.context().request_id().clone();
        tracing::trace!(
            request_id = %request_id,
            pending = queue.len(),
            "scheduling drain"
        );

        self.drains.running.send_modify(|running| *running += 1);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(queue.drain(&signal)).catch_unwind().await;
            drains.record(&request_id, outcome);
        });
    }

    /// Drains still running.
    pub fn in_flight(&self) -> usize {
        *self.drains.running.borrow()
    }

    /// Wait until no drain is running, including ones spawned while
    /// waiting, then take the results not collected yet.
    ///
    /// Concurrent callers all wait for the same drains; the results go to
    /// whichever caller collects first.
    pub async fn wait_idle(&self) -> Vec<DrainResult> {
        let mut running = self.drains.running.subscribe();
        // The sender lives in `self.drains`, so this cannot fail.
        let _ = running.wait_for(|running| *running == 0).await;
        self.drains.finished().drain(..).collect()
    }

    /// Begin shutdown and wait for in-flight drains.
    ///
    /// With a grace period, tasks not yet started once it elapses are
    /// dropped and running ones are cancelled. `None` waits for everything.
    pub async fn shutdown(&self, grace: Option<Duration>) -> Vec<DrainResult> {
        let deadline = grace.map(|grace| Instant::now() + grace);
        self.shutdown_tx
            .send_replace(ShutdownState::Draining { deadline });
        tracing::info!(
            grace_ms = grace.map(|g| g.as_millis() as u64),
            in_flight = self.in_flight(),
            "shutting down deferred work"
        );
        self.wait_idle().await
    }
}
