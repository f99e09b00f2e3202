//! Workload manifest.

use serde::{Deserialize, Serialize};

use crate::config::{RenderPhase, RouteConfig, ServerMode};

/// Workload manifest - explicit route listing for a deployable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadManifest {
    /// Unique name for this workload.
    pub name: String,
    /// Semantic version.
    pub version: String,
    /// Routes this workload handles.
    pub routes: Vec<RouteConfig>,
}

impl WorkloadManifest {
    /// Create a new workload manifest.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            routes: Vec::new(),
        }
    }

    /// Add a route to this workload.
    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// Look up a route by exact path.
    pub fn route(&self, path: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.path == path)
    }

    /// Routes a production build evaluates ahead of request time.
    pub fn static_routes(&self, mode: ServerMode) -> impl Iterator<Item = &RouteConfig> {
        self.routes
            .iter()
            .filter(move |r| r.render_phase(mode) == RenderPhase::StaticPrecomputed)
    }
}
