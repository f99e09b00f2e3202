//! CLI command implementations.

pub mod build;
pub mod config;
pub mod render;
pub mod routes;

use clap::{Args, Subcommand, ValueEnum};
use edge_sdk::edge_core::ServerMode;

/// Server mode selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Development,
    Production,
}

impl From<ModeArg> for ServerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Development => ServerMode::Development,
            ModeArg::Production => ServerMode::Production,
        }
    }
}

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Only print the build log, not the route summary.
    #[arg(long)]
    pub log_only: bool,
}

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    /// Route path to render.
    pub path: String,

    /// HTTP method (default: POST for server actions, GET otherwise).
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Request header as `name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request cookie as `name=value`. Repeatable.
    #[arg(short = 'b', long = "cookie")]
    pub cookies: Vec<String>,

    /// Override the configured server mode.
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Render the route this many times.
    #[arg(short = 'n', long, default_value = "1")]
    pub repeat: usize,
}

/// Arguments for the routes command.
#[derive(Args)]
pub struct RoutesArgs {
    /// Override the configured server mode.
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
