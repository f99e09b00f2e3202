//! Edge CLI - Command line tool for after-response execution workloads.
//!
//! Commands:
//! - `edge build` - Prerender static routes and print the build log
//! - `edge render` - Render a route, wait for deferred work, print the runtime log
//! - `edge routes` - List routes and their render phase
//! - `edge config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, ConfigArgs, RenderArgs, RoutesArgs};

/// Edge CLI - Build and render workloads with after-response work
#[derive(Parser)]
#[command(name = "edge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prerender static routes as a production build
    Build(BuildArgs),

    /// Render a route and run its deferred work
    Render(RenderArgs),

    /// List workload routes
    Routes(RoutesArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = match context::Context::load(config_path, output.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Build(args) => commands::build::run(args, &ctx).await,
        Commands::Render(args) => commands::render::run(args, &ctx).await,
        Commands::Routes(args) => commands::routes::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
