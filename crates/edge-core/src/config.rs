//! Route and server configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::Method;

/// When a route's output, and therefore its deferred work, is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPhase {
    /// Rendered per request; diagnostics go to the runtime log.
    Dynamic,
    /// Evaluated ahead of request time; diagnostics go to the build log.
    StaticPrecomputed,
}

impl RenderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::StaticPrecomputed => "static-precomputed",
        }
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the server is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Every route renders on demand.
    #[default]
    #[serde(alias = "dev")]
    Development,
    /// Static routes are prerendered by a build.
    #[serde(alias = "prod")]
    Production,
}

/// Kind of route entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// A rendered page.
    #[default]
    Page,
    /// A request handler returning a raw body.
    RouteHandler,
    /// A form-triggered server action.
    ServerAction,
}

/// A route's opt-in or opt-out of static prerendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DynamicSetting {
    /// Let the renderer decide (treated as dynamic).
    #[default]
    Auto,
    /// Always render per request.
    ForceDynamic,
    /// Prerender; dynamic usage is an error.
    Error,
    /// Prerender regardless of dynamic usage.
    ForceStatic,
}

/// Configuration for a single route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route path (e.g., "/request-apis/page-dynamic").
    pub path: String,
    /// Entry point kind.
    #[serde(default)]
    pub kind: RouteKind,
    /// Prerendering setting.
    #[serde(default)]
    pub dynamic: DynamicSetting,
    /// HTTP methods this route accepts.
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

impl RouteConfig {
    /// Create a new route configuration.
    pub fn new(path: impl Into<String>, kind: RouteKind) -> Self {
        let methods = match kind {
            RouteKind::ServerAction => vec!["POST".to_string()],
            _ => default_methods(),
        };
        Self {
            path: path.into(),
            kind,
            dynamic: DynamicSetting::Auto,
            methods,
        }
    }

    pub fn page(path: impl Into<String>) -> Self {
        Self::new(path, RouteKind::Page)
    }

    pub fn route_handler(path: impl Into<String>) -> Self {
        Self::new(path, RouteKind::RouteHandler)
    }

    pub fn server_action(path: impl Into<String>) -> Self {
        Self::new(path, RouteKind::ServerAction)
    }

    /// Set the prerendering setting.
    pub fn with_dynamic(mut self, dynamic: DynamicSetting) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Set allowed HTTP methods.
    pub fn with_methods(mut self, methods: Vec<&str>) -> Self {
        self.methods = methods.into_iter().map(String::from).collect();
        self
    }

    /// Whether `method` is accepted.
    pub fn accepts(&self, method: Method) -> bool {
        self.methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Render phase of this route under `mode`.
    ///
    /// Development renders everything per request. Production prerenders
    /// `error` and `force-static` routes; server actions always run per
    /// request.
    pub fn render_phase(&self, mode: ServerMode) -> RenderPhase {
        match (mode, self.kind, self.dynamic) {
            (ServerMode::Development, _, _) => RenderPhase::Dynamic,
            (_, RouteKind::ServerAction, _) => RenderPhase::Dynamic,
            (_, _, DynamicSetting::Error | DynamicSetting::ForceStatic) => {
                RenderPhase::StaticPrecomputed
            }
            _ => RenderPhase::Dynamic,
        }
    }
}

/// Runtime configuration for deferred execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterConfig {
    /// Server mode.
    #[serde(default)]
    pub mode: ServerMode,
    /// Grace period for in-flight drains at shutdown. Absent means wait
    /// for every drain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,
}

impl AfterConfig {
    /// Create a configuration for `mode`.
    pub fn new(mode: ServerMode) -> Self {
        Self {
            mode,
            shutdown_grace_ms: None,
        }
    }

    pub fn development() -> Self {
        Self::new(ServerMode::Development)
    }

    pub fn production() -> Self {
        Self::new(ServerMode::Production)
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = Some(grace.as_millis() as u64);
        self
    }

    /// Shutdown grace period, if bounded.
    pub fn shutdown_grace(&self) -> Option<Duration> {
        self.shutdown_grace_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_is_always_dynamic() {
        let route = RouteConfig::page("/static").with_dynamic(DynamicSetting::ForceStatic);
        assert_eq!(
            route.render_phase(ServerMode::Development),
            RenderPhase::Dynamic
        );
    }

    #[test]
    fn test_production_prerenders_static_settings() {
        for dynamic in [DynamicSetting::Error, DynamicSetting::ForceStatic] {
            let page = RouteConfig::page("/p").with_dynamic(dynamic);
            let handler = RouteConfig::route_handler("/h").with_dynamic(dynamic);
            assert_eq!(
                page.render_phase(ServerMode::Production),
                RenderPhase::StaticPrecomputed
            );
            assert_eq!(
                handler.render_phase(ServerMode::Production),
                RenderPhase::StaticPrecomputed
            );
        }

        let dynamic = RouteConfig::page("/d").with_dynamic(DynamicSetting::ForceDynamic);
        assert_eq!(
            dynamic.render_phase(ServerMode::Production),
            RenderPhase::Dynamic
        );
    }

    #[test]
    fn test_server_actions_are_dynamic() {
        let action = RouteConfig::server_action("/a").with_dynamic(DynamicSetting::ForceStatic);
        assert_eq!(action.render_phase(ServerMode::Production), RenderPhase::Dynamic);
        assert!(action.accepts(Method::Post));
        assert!(!action.accepts(Method::Get));
    }

    #[test]
    fn test_route_config_deserialize() {
        let route: RouteConfig = serde_json::from_str(
            r#"{"path": "/x", "kind": "route-handler", "dynamic": "force-static"}"#,
        )
        .unwrap();
        assert_eq!(route.kind, RouteKind::RouteHandler);
        assert_eq!(route.dynamic, DynamicSetting::ForceStatic);
        assert_eq!(route.methods, vec!["GET".to_string()]);
    }

    #[test]
    fn test_after_config_grace() {
        let config = AfterConfig::production().with_shutdown_grace(Duration::from_millis(250));
        assert_eq!(config.shutdown_grace(), Some(Duration::from_millis(250)));
        assert_eq!(AfterConfig::default().shutdown_grace(), None);
        assert_eq!(AfterConfig::default().mode, ServerMode::Development);
    }

    #[test]
    fn test_render_phase_serialization() {
        let json = serde_json::to_string(&RenderPhase::StaticPrecomputed).unwrap();
        assert_eq!(json, r#""static-precomputed""#);
        assert_eq!(RenderPhase::Dynamic.to_string(), "dynamic");
    }
}
