//! Application route registry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use edge_core::{RouteConfig, WorkloadManifest};
use edge_executor::RequestScope;

/// Renders a route.
///
/// Handlers receive the request scope explicitly: guarded request APIs plus
/// `after()` for deferred work. The returned string is the response body.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, scope: RequestScope) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(RequestScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn call(&self, scope: RequestScope) -> anyhow::Result<String> {
        (self)(scope).await
    }
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    pub config: RouteConfig,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Application builder.
///
/// # Example
///
/// ```rust,ignore
/// let app = App::new("my-app")
///     .route(RouteConfig::page("/"), |scope: RequestScope| async move {
///         scope.after(|scope| async move {
///             scope.apis().log("after the response");
///             Ok(())
///         })?;
///         Ok("hello".to_string())
///     });
/// ```
#[derive(Debug, Clone)]
pub struct App {
    name: String,
    version: String,
    routes: Vec<Route>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            routes: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a route. A later registration for the same path replaces
    /// the earlier one.
    pub fn route(mut self, config: RouteConfig, handler: impl Handler + 'static) -> Self {
        self.routes.retain(|r| r.config.path != config.path);
        self.routes.push(Route {
            config,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the route registered for `path`.
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.config.path == path)
    }

    /// Describe the application as a workload manifest.
    pub fn manifest(&self) -> WorkloadManifest {
        self.routes.iter().fold(
            WorkloadManifest::new(&self.name, &self.version),
            |manifest, route| manifest.with_route(route.config.clone()),
        )
    }
}
