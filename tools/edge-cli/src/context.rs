//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use edge_sdk::edge_core::{AfterConfig, ServerMode};
use edge_sdk::edge_observability::{ExecutionReporter, MemorySink};
use edge_sdk::RenderDriver;

use crate::config::CliConfig;
use crate::output::Output;

/// Config file names, in lookup order.
pub const CONFIG_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

/// A driver over the fixture workload with in-memory logs.
pub struct Session {
    pub driver: RenderDriver,
    pub runtime: Arc<MemorySink>,
    pub build: Arc<MemorySink>,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = if let Some(path) = config_path {
            (CliConfig::load(path)?, Some(PathBuf::from(path)))
        } else {
            // Try to find config in current directory or parent directories
            match find_config(&cwd) {
                Some(path) => {
                    let config = CliConfig::load(&path.to_string_lossy())?;
                    (config, Some(path))
                }
                None => (CliConfig::default(), None),
            }
        };

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Server settings, optionally with the mode overridden.
    pub fn server_config(&self, mode: Option<ServerMode>) -> AfterConfig {
        let mut server = self.config.server.clone();
        if let Some(mode) = mode {
            server.mode = mode;
        }
        server
    }

    /// Start a driver for the fixture workload.
    pub fn session(&self, server: AfterConfig) -> Session {
        let runtime = Arc::new(MemorySink::new());
        let build = Arc::new(MemorySink::new());
        let reporter = ExecutionReporter::new(runtime.clone(), build.clone());
        Session {
            driver: RenderDriver::new(after_api_usage::app(), server, reporter),
            runtime,
            build,
        }
    }
}

/// Find config file in directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let config_path = current.join(name);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    None
}
