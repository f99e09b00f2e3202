//! Output formatting for the CLI.

use console::style;
use edge_sdk::edge_core::RenderPhase;
use edge_sdk::edge_observability::{LogEntry, LogLevel};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::LogConfig;

/// Output handler for CLI messages.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    /// Create a new output handler.
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    /// Print an info message.
    pub fn info(&self, msg: &str) {
        if self.json {
            return;
        }
        println!("{} {}", style("ℹ").blue(), msg);
    }

    /// Print a success message.
    pub fn success(&self, msg: &str) {
        if self.json {
            return;
        }
        println!("{} {}", style("✓").green(), msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: &str) {
        if self.json {
            return;
        }
        eprintln!("{} {}", style("⚠").yellow(), msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
            return;
        }
        eprintln!("{} {}", style("✗").red(), style(msg).red());
    }

    /// Print a debug message (only in verbose mode).
    pub fn debug(&self, msg: &str) {
        if !self.verbose || self.json {
            return;
        }
        eprintln!("{} {}", style("→").dim(), style(msg).dim());
    }

    /// Print a header/title.
    pub fn header(&self, msg: &str) {
        if self.json {
            return;
        }
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print JSON output.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    /// Print a key-value pair.
    pub fn kv(&self, key: &str, value: &str) {
        if self.json {
            return;
        }
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a table row.
    pub fn table_row(&self, cols: &[&str], widths: &[usize]) {
        if self.json {
            return;
        }
        let formatted: Vec<String> = cols
            .iter()
            .zip(widths.iter())
            .map(|(col, width)| format!("{:width$}", col, width = width))
            .collect();
        println!("  {}", formatted.join("  "));
    }

    /// Print captured diagnostics at or above the configured level.
    pub fn log_entries(&self, entries: &[LogEntry], log: &LogConfig) {
        if self.json {
            return;
        }
        let shown: Vec<_> = entries.iter().filter(|e| e.level >= log.level).collect();
        if shown.is_empty() {
            println!("  {}", style("(empty)").dim());
            return;
        }
        for entry in shown {
            let line = entry.render(log.format);
            match entry.level {
                LogLevel::Error => println!("  {}", style(line).red()),
                LogLevel::Warn => println!("  {}", style(line).yellow()),
                _ => println!("  {}", line),
            }
        }
    }

    /// Create a spinner for indeterminate progress.
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        if self.json {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Colored label for a render phase.
pub fn phase_badge(phase: RenderPhase) -> String {
    match phase {
        RenderPhase::Dynamic => style(phase.as_str()).cyan().to_string(),
        RenderPhase::StaticPrecomputed => style(phase.as_str()).magenta().to_string(),
    }
}

/// Format milliseconds as a human-readable duration.
pub fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}
