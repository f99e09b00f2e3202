//! Routing of diagnostics to the runtime or build log.

use std::sync::Arc;

use edge_core::RenderPhase;

use crate::logging::{LogEntry, LogLevel};
use crate::sink::LogSink;

/// Routes diagnostics by render phase.
///
/// Dynamic renders write to the live runtime log. Static routes are
/// evaluated ahead of request time, so their diagnostics belong to the build
/// log. Message text is never altered; only the destination changes.
#[derive(Debug, Clone)]
pub struct ExecutionReporter {
    runtime: Arc<dyn LogSink>,
    build: Arc<dyn LogSink>,
}

impl ExecutionReporter {
    /// Create a reporter over a runtime sink and a build sink.
    pub fn new(runtime: Arc<dyn LogSink>, build: Arc<dyn LogSink>) -> Self {
        Self { runtime, build }
    }

    /// Sink entries of `phase` are written to.
    pub fn sink_for(&self, phase: RenderPhase) -> &Arc<dyn LogSink> {
        match phase {
            RenderPhase::Dynamic => &self.runtime,
            RenderPhase::StaticPrecomputed => &self.build,
        }
    }

    /// Write `entry` to the sink selected by its render phase.
    pub fn report(&self, entry: LogEntry) {
        emit_tracing(&entry);
        self.sink_for(entry.render_phase).write(&entry);
    }

    /// Report a bare message under `phase`.
    pub fn report_message(&self, level: LogLevel, message: impl Into<String>, phase: RenderPhase) {
        self.report(LogEntry::new(level, message, phase));
    }
}

fn emit_tracing(entry: &LogEntry) {
    let route = entry.route.as_deref().unwrap_or("-");
    let phase = entry.render_phase.as_str();
    match entry.level {
        LogLevel::Error => {
            tracing::error!(target: "edge::after", route, phase, "{}", entry.message)
        }
        LogLevel::Warn => {
            tracing::warn!(target: "edge::after", route, phase, "{}", entry.message)
        }
        LogLevel::Info => {
            tracing::info!(target: "edge::after", route, phase, "{}", entry.message)
        }
        LogLevel::Debug => {
            tracing::debug!(target: "edge::after", route, phase, "{}", entry.message)
        }
        LogLevel::Trace => {
            tracing::trace!(target: "edge::after", route, phase, "{}", entry.message)
        }
    }
}
