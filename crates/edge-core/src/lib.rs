//! Core abstractions for after-response execution.
//!
//! This crate provides the fundamental types:
//! - `RequestContext` - Per-request dynamic state (headers, cookies, connection, draft mode)
//! - `ContextPhase` - Forward-only lifecycle of that state
//! - `RouteConfig` / `RenderPhase` - When a route's output (and its deferred work) is produced
//! - `AfterConfig` - Server mode and shutdown grace
//! - `WorkloadManifest` - Route listing for a deployable unit

mod config;
mod context;
mod lifecycle;
mod workload;

pub use config::*;
pub use context::*;
pub use lifecycle::*;
pub use workload::*;
