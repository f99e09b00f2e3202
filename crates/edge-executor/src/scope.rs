//! Request scope handed to handlers and deferred tasks.

use std::future::Future;
use std::sync::Arc;

use edge_core::RequestContext;
use edge_security::RequestApis;

use crate::error::RegistrationError;
use crate::queue::AfterQueue;
use crate::task::DeferredTask;

/// Everything application code may touch for one request: the guarded
/// request APIs and the `after()` registration surface.
///
/// Passed explicitly into the render and into every deferred task; there is
/// no ambient "current request".
#[derive(Debug, Clone)]
pub struct RequestScope {
    apis: RequestApis,
    queue: Arc<AfterQueue>,
}

impl RequestScope {
    pub(crate) fn new(apis: RequestApis, queue: Arc<AfterQueue>) -> Self {
        Self { apis, queue }
    }

    /// Guarded request APIs.
    pub fn apis(&self) -> &RequestApis {
        &self.apis
    }

    /// The shared request context.
    pub fn context(&self) -> &Arc<RequestContext> {
        self.apis.context()
    }

    /// Route path of the request.
    pub fn route(&self) -> &str {
        self.apis.route()
    }

    /// Schedule `callback` to run after the response has been produced.
    ///
    /// Fails once the request context has been torn down.
    pub fn after<F, Fut>(&self, callback: F) -> Result<(), RegistrationError>
    where
        F: FnOnce(RequestScope) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.queue.register(DeferredTask::new(callback)).map(|_| ())
    }
}
