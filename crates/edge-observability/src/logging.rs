//! Structured diagnostics with request context.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use edge_core::{RenderPhase, RequestContext};
use serde::{Deserialize, Serialize};

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

/// A structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,
    /// Log message. Diagnostic text is carried here verbatim.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Route path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Render phase the entry was produced under; selects the sink.
    pub render_phase: RenderPhase,
    /// Wall-clock time the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Additional structured fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEntry {
    /// Create an entry with no request context.
    pub fn new(level: LogLevel, message: impl Into<String>, render_phase: RenderPhase) -> Self {
        Self {
            level,
            message: message.into(),
            request_id: None,
            route: None,
            render_phase,
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    /// Create an entry tagged with a request's id, route and render phase.
    pub fn for_request(level: LogLevel, message: impl Into<String>, ctx: &RequestContext) -> Self {
        Self::new(level, message, ctx.render_phase())
            .with_request_id(ctx.request_id().to_string())
            .with_route(ctx.route())
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Add a string field.
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), serde_json::json!(value.into()));
        self
    }

    /// Add an integer field.
    pub fn field_u64(mut self, key: &str, value: u64) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// Format as human-readable string.
    pub fn to_human(&self) -> String {
        let mut s = format!("[{}] {}", self.level, self.message);

        if !self.fields.is_empty() {
            s.push_str(" | ");
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            s.push_str(&fields.join(" "));
        }

        s
    }

    /// Format according to `format`.
    pub fn render(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Json => self.to_json(),
            LogFormat::Human => self.to_human(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::Method;

    #[test]
    fn test_entry_for_request() {
        let ctx = RequestContext::new(Method::Get, "/a").with_render_phase(RenderPhase::StaticPrecomputed);
        let entry = LogEntry::for_request(LogLevel::Error, "boom", &ctx);

        assert_eq!(entry.route.as_deref(), Some("/a"));
        assert_eq!(entry.request_id.as_deref(), Some(ctx.request_id().0.as_str()));
        assert_eq!(entry.render_phase, RenderPhase::StaticPrecomputed);
    }

    #[test]
    fn test_entry_human_format() {
        let entry = LogEntry::new(LogLevel::Warn, "dropped", RenderPhase::Dynamic).field_u64("count", 2);
        assert_eq!(entry.to_human(), "[WARN] dropped | count=2");
    }

    #[test]
    fn test_entry_json_format() {
        let entry = LogEntry::new(LogLevel::Info, "hello", RenderPhase::Dynamic)
            .with_route("/r")
            .field("capability", "headers");
        let value: serde_json::Value = serde_json::from_str(&entry.to_json()).unwrap();

        assert_eq!(value["level"], "info");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["route"], "/r");
        assert_eq!(value["render_phase"], "dynamic");
        assert_eq!(value["capability"], "headers");
        assert!(value.get("request_id").is_none());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Info);
    }
}
