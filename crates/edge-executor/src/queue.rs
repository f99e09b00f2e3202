//! Per-request after-response queue.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use edge_core::{ContextPhase, RequestContext};
use edge_observability::{LogEntry, LogLevel};
use edge_security::{CapabilityDeniedError, CapabilityGuard, RequestApis};
use futures::FutureExt;
use serde::Serialize;

use crate::error::{DrainError, RegistrationError, TaskExecutionError};
use crate::scheduler::ShutdownSignal;
use crate::scope::RequestScope;
use crate::task::DeferredTask;

/// How one deferred task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ran to completion.
    Completed,
    /// Stopped on a guarded API; the guard already reported it.
    Denied(CapabilityDeniedError),
    /// Failed on its own logic or panicked.
    Failed(TaskExecutionError),
    /// Still running when the shutdown grace period elapsed.
    Cancelled,
}

/// Summary of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainResult {
    pub request_id: String,
    pub route: String,
    pub completed: usize,
    pub denied: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Tasks never started because the shutdown deadline passed.
    pub dropped: usize,
    pub elapsed_ms: u64,
}

impl DrainResult {
    fn new(ctx: &RequestContext) -> Self {
        Self {
            request_id: ctx.request_id().to_string(),
            route: ctx.route().to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Denied(_) => self.denied += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Tasks that were registered on the queue.
    pub fn total(&self) -> usize {
        self.completed + self.denied + self.failed + self.cancelled + self.dropped
    }
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<DeferredTask>,
    next_ordinal: u64,
    drain_started: bool,
}

/// Ordered queue of deferred tasks for one request.
///
/// Tasks run strictly one after another in registration order, each handed
/// the shared request context. When the queue is empty the context is torn
/// down; registration and that decision share one lock, so no task is ever
/// stranded.
#[derive(Debug)]
pub struct AfterQueue {
    context: Arc<RequestContext>,
    guard: Arc<CapabilityGuard>,
    state: Mutex<QueueState>,
}

impl AfterQueue {
    /// Create the queue for `context`.
    pub fn new(context: Arc<RequestContext>, guard: Arc<CapabilityGuard>) -> Arc<Self> {
        Arc::new(Self {
            context,
            guard,
            state: Mutex::new(QueueState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }

    /// Scope for code running on behalf of this request.
    pub fn scope(self: &Arc<Self>) -> RequestScope {
        RequestScope::new(
            RequestApis::new(self.context.clone(), self.guard.clone()),
            self.clone(),
        )
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `task`, returning its FIFO ordinal.
    pub fn register(&self, mut task: DeferredTask) -> Result<u64, RegistrationError> {
        let mut state = self.lock();
        if self.context.phase() == ContextPhase::TornDown {
            return Err(RegistrationError::ContextTornDown {
                request_id: self.context.request_id().clone(),
                route: self.context.route().to_string(),
            });
        }

        let ordinal = state.next_ordinal;
        state.next_ordinal += 1;
        task.assign(ordinal, self.context.route());
        state.tasks.push_back(task);

        tracing::trace!(
            request_id = %self.context.request_id(),
            route = %self.context.route(),
            ordinal,
            "deferred task registered"
        );
        Ok(ordinal)
    }

    /// Run every queued task, then tear the context down.
    ///
    /// Advances a still-live context to `ResponseSent` first. Tasks added
    /// while draining run in the same drain. Resolves only after all awaited
    /// work inside every task has finished.
    pub async fn drain(self: &Arc<Self>, shutdown: &ShutdownSignal) -> Result<DrainResult, DrainError> {
        {
            let mut state = self.lock();
            if state.drain_started {
                return Err(DrainError::AlreadyDrained(self.context.request_id().clone()));
            }
            state.drain_started = true;
        }

        if self.context.phase() == ContextPhase::Live {
            self.context.advance_to(ContextPhase::ResponseSent)?;
        }

        let started = Instant::now();
        let mut result = DrainResult::new(&self.context);

        while let Some(task) = self.next_task(shutdown, &mut result)? {
            let outcome = self.run_task(task, shutdown).await;
            result.record(&outcome);
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            request_id = %result.request_id,
            route = %result.route,
            completed = result.completed,
            denied = result.denied,
            failed = result.failed,
            cancelled = result.cancelled,
            dropped = result.dropped,
            "deferred tasks drained"
        );
        Ok(result)
    }

    /// Pop the next task, or tear down when there is nothing left to start.
    fn next_task(
        &self,
        shutdown: &ShutdownSignal,
        result: &mut DrainResult,
    ) -> Result<Option<DeferredTask>, DrainError> {
        let mut state = self.lock();

        if shutdown.deadline_passed() && !state.tasks.is_empty() {
            let dropped = state.tasks.len();
            state.tasks.clear();
            self.context.advance_to(ContextPhase::TornDown)?;
            drop(state);

            result.dropped += dropped;
            self.report(
                LogLevel::Warn,
                format!(
                    "Dropped {} deferred task(s) for route {}: shutdown grace period elapsed",
                    dropped,
                    self.context.route()
                ),
            );
            return Ok(None);
        }

        match state.tasks.pop_front() {
            Some(task) => Ok(Some(task)),
            None => {
                self.context.advance_to(ContextPhase::TornDown)?;
                Ok(None)
            }
        }
    }

    async fn run_task(self: &Arc<Self>, task: DeferredTask, shutdown: &ShutdownSignal) -> TaskOutcome {
        let ordinal = task.enqueued_at();
        let route = task.route().to_string();
        let run = AssertUnwindSafe(task.run(self.scope())).catch_unwind();
        let mut expiry = shutdown.clone();

        let result = tokio::select! {
            result = run => result,
            _ = expiry.expired() => {
                self.report(
                    LogLevel::Warn,
                    format!(
                        "Cancelled deferred task #{} for route {}: shutdown grace period elapsed",
                        ordinal, route
                    ),
                );
                return TaskOutcome::Cancelled;
            }
        };

        match result {
            Ok(Ok(())) => TaskOutcome::Completed,
            Ok(Err(err)) => match err.downcast::<CapabilityDeniedError>() {
                Ok(denied) => {
                    tracing::debug!(
                        route = %route,
                        ordinal,
                        capability = denied.capability.name(),
                        "deferred task stopped on a denied capability"
                    );
                    TaskOutcome::Denied(denied)
                }
                Err(err) => self.failed(TaskExecutionError::Failed {
                    route,
                    ordinal,
                    message: format!("{:#}", err),
                }),
            },
            Err(panic) => self.failed(TaskExecutionError::Panicked {
                route,
                ordinal,
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    fn failed(&self, error: TaskExecutionError) -> TaskOutcome {
        self.guard.reporter().report(
            LogEntry::for_request(LogLevel::Error, format!("Error: {}", error), &self.context)
                .field_u64("task", error.ordinal()),
        );
        TaskOutcome::Failed(error)
    }

    fn report(&self, level: LogLevel, message: String) {
        self.guard
            .reporter()
            .report(LogEntry::for_request(level, message, &self.context));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
