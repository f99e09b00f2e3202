//! Deferred task records.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::scope::RequestScope;

/// Future returned by a deferred callback.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Boxed zero-argument unit of work, handed the request scope when it runs.
pub type TaskFn = Box<dyn FnOnce(RequestScope) -> TaskFuture + Send>;

/// Work scheduled to run after the primary response.
///
/// Owned by the queue until executed. `run` consumes the record, so a task
/// can never be entered twice.
pub struct DeferredTask {
    callback: TaskFn,
    enqueued_at: u64,
    route: String,
}

impl DeferredTask {
    /// Wrap an async callback.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: FnOnce(RequestScope) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |scope| callback(scope).boxed()),
            enqueued_at: 0,
            route: String::new(),
        }
    }

    /// FIFO ordinal within the request, assigned at registration.
    pub fn enqueued_at(&self) -> u64 {
        self.enqueued_at
    }

    /// Route the task was registered for, used for diagnostics.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub(crate) fn assign(&mut self, enqueued_at: u64, route: &str) {
        self.enqueued_at = enqueued_at;
        self.route = route.to_string();
    }

    /// The callback is invoked on first poll, so a panic while building the
    /// future is caught with the rest of the task.
    pub(crate) fn run(self, scope: RequestScope) -> TaskFuture {
        let callback = self.callback;
        async move { callback(scope).await }.boxed()
    }
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("enqueued_at", &self.enqueued_at)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}
