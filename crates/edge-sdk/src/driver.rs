//! Render driver.
//!
//! Plays the host server's part around the deferred-execution core: creates
//! a context per request, runs the route handler, marks the response as
//! sent, and hands the queue to the drain scheduler. Production builds
//! prerender static routes once and replay them afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use edge_core::{
    AfterConfig, ConnectionInfo, ContextPhase, Method, PhaseError, RenderPhase, RequestContext,
    RequestId, ServerMode,
};
use edge_executor::{AfterQueue, DrainError, DrainResult, DrainScheduler};
use edge_observability::{ExecutionReporter, LogEntry, LogLevel};
use edge_security::CapabilityGuard;
use http::header::{HeaderName, HeaderValue, COOKIE};
use http::HeaderMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::app::{App, Route};

/// Errors surfaced to the caller of a render.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no route matches {0}")]
    RouteNotFound(String),

    #[error("method {method} is not allowed for route {route}")]
    MethodNotAllowed { route: String, method: Method },

    #[error("route {route} failed to render: {message}")]
    Handler { route: String, message: String },

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Drain(#[from] DrainError),
}

/// A request as received by the server.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub connection: ConnectionInfo,
}

impl IncomingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            connection: ConnectionInfo::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Append a header. Invalid names or values are skipped with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(name, "skipping invalid request header"),
        }
        self
    }

    /// Append a `name=value` cookie.
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header(COOKIE.as_str(), &format!("{}={}", name, value))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }
}

/// The primary response of a render.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub request_id: RequestId,
    pub route: String,
    pub body: String,
    pub render_phase: RenderPhase,
    /// Served from a build-time prerender rather than evaluated now.
    pub from_prerender: bool,
}

/// Output of evaluating a static route ahead of request time.
///
/// A failed evaluation is kept too, so requests replay the failure instead
/// of evaluating the route again.
#[derive(Debug, Clone, Serialize)]
pub struct PrerenderedRoute {
    pub path: String,
    pub request_id: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub drain: DrainResult,
}

impl PrerenderedRoute {
    fn replay(&self) -> Result<String, RenderError> {
        match self.error {
            Some(ref message) => Err(RenderError::Handler {
                route: self.path.clone(),
                message: message.clone(),
            }),
            None => Ok(self.body.clone()),
        }
    }
}

/// Routes evaluated by a production build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub routes: Vec<PrerenderedRoute>,
}

impl BuildReport {
    /// Routes whose handler failed.
    pub fn failures(&self) -> impl Iterator<Item = &PrerenderedRoute> {
        self.routes.iter().filter(|route| route.error.is_some())
    }

    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Drives requests and builds for an `App`.
#[derive(Debug)]
pub struct RenderDriver {
    app: Arc<App>,
    config: AfterConfig,
    guard: Arc<CapabilityGuard>,
    scheduler: DrainScheduler,
    prerendered: Mutex<HashMap<String, PrerenderedRoute>>,
}

impl RenderDriver {
    /// Renders must run inside a tokio runtime; drains are spawned as tokio tasks.
    pub fn new(app: App, config: AfterConfig, reporter: ExecutionReporter) -> Self {
        Self {
            app: Arc::new(app),
            config,
            guard: Arc::new(CapabilityGuard::new(reporter)),
            scheduler: DrainScheduler::new(),
            prerendered: Mutex::new(HashMap::new()),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn mode(&self) -> ServerMode {
        self.config.mode
    }

    pub fn reporter(&self) -> &ExecutionReporter {
        self.guard.reporter()
    }

    /// Prerender every static route not prerendered yet.
    ///
    /// Each route is evaluated exactly once, including its deferred work,
    /// which is drained before the build moves on. A failing handler does
    /// not stop the build; its route is listed in `BuildReport::failures`.
    /// Development builds prerender nothing.
    pub async fn build(&self) -> Result<BuildReport, RenderError> {
        let mut cache = self.prerendered.lock().await;
        let mut report = BuildReport::default();

        for route in self.app.routes() {
            if route.config.render_phase(self.config.mode) != RenderPhase::StaticPrecomputed {
                continue;
            }
            if !cache.contains_key(route.path()) {
                let prerendered = self.prerender(route).await?;
                cache.insert(route.path().to_string(), prerendered);
            }
            if let Some(prerendered) = cache.get(route.path()) {
                report.routes.push(prerendered.clone());
            }
        }

        tracing::info!(
            routes = report.routes.len(),
            failed = report.failures().count(),
            "build finished"
        );
        Ok(report)
    }

    /// Serve one request.
    ///
    /// Dynamic routes are evaluated now; their deferred work is scheduled
    /// after the body is produced and is not awaited here. Static routes are
    /// replayed from the build.
    pub async fn render(&self, request: IncomingRequest) -> Result<Rendered, RenderError> {
        let route = self
            .app
            .find(&request.path)
            .ok_or_else(|| RenderError::RouteNotFound(request.path.clone()))?;

        if !route.config.accepts(request.method) {
            return Err(RenderError::MethodNotAllowed {
                route: route.config.path.clone(),
                method: request.method,
            });
        }

        match route.config.render_phase(self.config.mode) {
            RenderPhase::StaticPrecomputed => self.replay(route).await,
            RenderPhase::Dynamic => self.render_dynamic(route, request).await,
        }
    }

    /// Wait for every scheduled drain.
    pub async fn settle(&self) -> Vec<DrainResult> {
        self.scheduler.wait_idle().await
    }

    /// Begin shutdown and wait for deferred work within the configured grace.
    pub async fn shutdown(&self) -> Vec<DrainResult> {
        self.scheduler.shutdown(self.config.shutdown_grace()).await
    }

    async fn render_dynamic(
        &self,
        route: &Route,
        request: IncomingRequest,
    ) -> Result<Rendered, RenderError> {
        let ctx = Arc::new(
            RequestContext::new(request.method, route.path())
                .with_headers(request.headers)
                .with_connection(request.connection)
                .with_render_phase(RenderPhase::Dynamic),
        );
        let queue = AfterQueue::new(ctx.clone(), self.guard.clone());

        tracing::debug!(request_id = %ctx.request_id(), route = route.path(), "rendering");
        let body = route.handler().call(queue.scope()).await;

        ctx.advance_to(ContextPhase::ResponseSent)?;
        self.scheduler.spawn(queue);

        let body = body.map_err(|err| self.handler_failed(&ctx, err))?;
        Ok(Rendered {
            request_id: ctx.request_id().clone(),
            route: route.path().to_string(),
            body,
            render_phase: RenderPhase::Dynamic,
            from_prerender: false,
        })
    }

    async fn replay(&self, route: &Route) -> Result<Rendered, RenderError> {
        let mut cache = self.prerendered.lock().await;
        if !cache.contains_key(route.path()) {
            tracing::debug!(route = route.path(), "prerendering on first request");
            let prerendered = self.prerender(route).await?;
            cache.insert(route.path().to_string(), prerendered);
        }

        let body = match cache.get(route.path()) {
            Some(prerendered) => prerendered.replay()?,
            None => String::new(),
        };
        Ok(Rendered {
            request_id: RequestId::generate(),
            route: route.path().to_string(),
            body,
            render_phase: RenderPhase::StaticPrecomputed,
            from_prerender: true,
        })
    }

    async fn prerender(&self, route: &Route) -> Result<PrerenderedRoute, RenderError> {
        let ctx = Arc::new(
            RequestContext::new(Method::Get, route.path())
                .with_render_phase(RenderPhase::StaticPrecomputed),
        );
        let queue = AfterQueue::new(ctx.clone(), self.guard.clone());

        let body = route.handler().call(queue.scope()).await;
        ctx.advance_to(ContextPhase::ResponseSent)?;
        let drain = queue.drain(&self.scheduler.signal()).await?;

        let (body, error) = match body {
            Ok(body) => (body, None),
            Err(err) => (String::new(), Some(self.report_handler_error(&ctx, err))),
        };
        tracing::debug!(
            route = route.path(),
            completed = drain.completed,
            denied = drain.denied,
            failed = error.is_some(),
            "prerendered"
        );
        Ok(PrerenderedRoute {
            path: route.path().to_string(),
            request_id: ctx.request_id().to_string(),
            body,
            error,
            drain,
        })
    }

    fn handler_failed(&self, ctx: &RequestContext, err: anyhow::Error) -> RenderError {
        RenderError::Handler {
            route: ctx.route().to_string(),
            message: self.report_handler_error(ctx, err),
        }
    }

    fn report_handler_error(&self, ctx: &RequestContext, err: anyhow::Error) -> String {
        let message = format!("{:#}", err);
        self.guard.reporter().report(LogEntry::for_request(
            LogLevel::Error,
            format!("Error: {}", message),
            ctx,
        ));
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::{DynamicSetting, RouteConfig, DRAFT_MODE_COOKIE};
    use edge_executor::RequestScope;
    use edge_observability::MemorySink;

    struct Fixture {
        driver: RenderDriver,
        runtime: Arc<MemorySink>,
        build: Arc<MemorySink>,
    }

    async fn hello(scope: RequestScope) -> anyhow::Result<String> {
        scope.after(|scope| async move {
            scope.apis().log(format!("after {}", scope.route()));
            Ok(())
        })?;
        Ok(format!("hello from {}", scope.route()))
    }

    fn fixture(config: AfterConfig) -> Fixture {
        let runtime = Arc::new(MemorySink::new());
        let build = Arc::new(MemorySink::new());
        let app = App::new("test")
            .route(RouteConfig::page("/dynamic"), hello)
            .route(
                RouteConfig::page("/static").with_dynamic(DynamicSetting::ForceStatic),
                hello,
            )
            .route(RouteConfig::server_action("/action"), hello)
            .route(RouteConfig::page("/broken"), |_: RequestScope| async {
                Err::<String, _>(anyhow::anyhow!("render exploded"))
            })
            .route(
                RouteConfig::page("/static-broken").with_dynamic(DynamicSetting::ForceStatic),
                |scope: RequestScope| async move {
                    scope.after(|scope| async move {
                        scope.apis().headers()?;
                        Ok(())
                    })?;
                    Err::<String, _>(anyhow::anyhow!("prerender exploded"))
                },
            )
            .route(
                RouteConfig::page("/static-after").with_dynamic(DynamicSetting::ForceStatic),
                hello,
            );
        Fixture {
            driver: RenderDriver::new(
                app,
                config,
                ExecutionReporter::new(runtime.clone(), build.clone()),
            ),
            runtime,
            build,
        }
    }

    #[test]
    fn test_incoming_request_cookie() {
        let request = IncomingRequest::get("/").cookie(DRAFT_MODE_COOKIE, "1");
        assert_eq!(
            request.headers.get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("__prerender_bypass=1")
        );
    }

    #[test]
    fn test_incoming_request_skips_invalid_header() {
        let request = IncomingRequest::get("/").header("bad header", "x");
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_render_dynamic_then_settle() {
        let fx = fixture(AfterConfig::development());

        let rendered = fx.driver.render(IncomingRequest::get("/dynamic")).await.unwrap();
        assert_eq!(rendered.body, "hello from /dynamic");
        assert!(!rendered.from_prerender);

        let results = fx.driver.settle().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].completed, 1);
        assert!(fx.runtime.contains("after /dynamic"));
        assert!(fx.build.is_empty());
    }

    #[tokio::test]
    async fn test_render_unknown_route() {
        let fx = fixture(AfterConfig::development());
        let err = fx.driver.render(IncomingRequest::get("/nope")).await.unwrap_err();
        assert!(matches!(err, RenderError::RouteNotFound(path) if path == "/nope"));
    }

    #[tokio::test]
    async fn test_server_action_requires_post() {
        let fx = fixture(AfterConfig::production());

        let err = fx.driver.render(IncomingRequest::get("/action")).await.unwrap_err();
        assert!(matches!(err, RenderError::MethodNotAllowed { method: Method::Get, .. }));

        let rendered = fx.driver.render(IncomingRequest::post("/action")).await.unwrap();
        assert_eq!(rendered.render_phase, RenderPhase::Dynamic);
    }

    #[tokio::test]
    async fn test_build_prerenders_static_once() {
        let fx = fixture(AfterConfig::production());

        let report = fx.driver.build().await.unwrap();
        assert_eq!(report.routes.len(), 3);
        assert_eq!(report.routes[0].path, "/static");
        assert_eq!(report.routes[0].drain.completed, 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["routes"][0]["path"], "/static");

        let rendered = fx.driver.render(IncomingRequest::get("/static")).await.unwrap();
        assert!(rendered.from_prerender);
        assert_eq!(rendered.body, "hello from /static");
        fx.driver.build().await.unwrap();
        fx.driver.settle().await;

        assert_eq!(fx.build.count_matching("after /static"), 1);
        assert!(fx.runtime.is_empty());
    }

    #[tokio::test]
    async fn test_static_route_prerendered_lazily() {
        let fx = fixture(AfterConfig::production());

        fx.driver.render(IncomingRequest::get("/static")).await.unwrap();
        fx.driver.render(IncomingRequest::get("/static")).await.unwrap();

        assert_eq!(fx.build.count_matching("after /static"), 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let fx = fixture(AfterConfig::development());

        let err = fx.driver.render(IncomingRequest::get("/broken")).await.unwrap_err();
        assert!(matches!(err, RenderError::Handler { ref message, .. } if message == "render exploded"));
        assert!(fx.runtime.contains("Error: render exploded"));

        let results = fx.driver.settle().await;
        assert_eq!(results[0].total(), 0);
    }

    #[tokio::test]
    async fn test_failed_prerender_is_evaluated_once() {
        let fx = fixture(AfterConfig::production());

        let report = fx.driver.build().await.unwrap();
        assert!(!report.is_ok());
        let failed: Vec<_> = report.failures().map(|r| r.path.as_str()).collect();
        assert_eq!(failed, ["/static-broken"]);
        assert_eq!(report.routes[1].drain.denied, 1);

        let later = report.routes.iter().find(|r| r.path == "/static-after").unwrap();
        assert_eq!(later.body, "hello from /static-after");

        for _ in 0..3 {
            let err = fx
                .driver
                .render(IncomingRequest::get("/static-broken"))
                .await
                .unwrap_err();
            assert!(matches!(err, RenderError::Handler { ref message, .. } if message == "prerender exploded"));
        }
        fx.driver.build().await.unwrap();

        assert_eq!(fx.build.count_matching("Error: prerender exploded"), 1);
        assert_eq!(fx.build.count_matching("used \"headers\""), 1);
        assert_eq!(fx.build.count_matching("after /static-after"), 1);
        assert!(fx.runtime.is_empty());
    }
}
