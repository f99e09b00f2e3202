//! Diagnostic routing for after-response execution.
//!
//! This crate provides:
//! - `LogEntry` - Structured diagnostic with request context
//! - `LogSink` - Destination for entries (`MemorySink`, `StderrSink`, `TeeSink`)
//! - `ExecutionReporter` - Routes entries to the runtime or build log by render phase

mod logging;
mod reporter;
mod sink;

pub use logging::*;
pub use reporter::*;
pub use sink::*;

// Re-export the types entries are keyed by
pub use edge_core::{RenderPhase, RequestId};
