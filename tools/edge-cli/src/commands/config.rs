//! Configuration management commands.

use std::fs;

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx).await,
        ConfigCommand::Init { force } => init_config(force, ctx).await,
        ConfigCommand::Validate => validate_config(ctx).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Current Configuration");

    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    match ctx.config_path {
        Some(ref path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    ctx.output.info("[server]");
    ctx.output.kv("mode", &format!("{:?}", ctx.config.server.mode).to_lowercase());
    ctx.output.kv(
        "shutdown_grace_ms",
        &ctx.config
            .server
            .shutdown_grace_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "unbounded".to_string()),
    );

    ctx.output.info("[log]");
    ctx.output.kv("format", &format!("{:?}", ctx.config.log.format).to_lowercase());
    ctx.output.kv("level", &ctx.config.log.level.to_string().to_lowercase());

    Ok(())
}

async fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("edge.toml");

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, generate_default_config())?;

    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

async fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let mut warnings: Vec<String> = Vec::new();

    if ctx.config_path.is_none() {
        warnings.push("no config file found; using defaults".to_string());
    }

    if ctx.config.server.shutdown_grace_ms == Some(0) {
        warnings.push(
            "server.shutdown_grace_ms = 0 drops all pending deferred work at shutdown".to_string(),
        );
    }

    if warnings.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    ctx.output.success("Configuration is valid (with warnings)");

    Ok(())
}
