//! Production build of the fixture workload.

use anyhow::{bail, Context as _, Result};
use edge_sdk::edge_core::ServerMode;
use edge_sdk::BuildReport;

use super::BuildArgs;
use crate::context::Context;
use crate::output::format_millis;

/// Run the build command.
pub async fn run(args: BuildArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session(ctx.server_config(Some(ServerMode::Production)));

    ctx.output.header("Building workload");
    let spinner = ctx.output.spinner("Prerendering static routes...");
    let report = session.driver.build().await.context("Build failed")?;
    spinner.finish_and_clear();

    let build_log = session.build.entries();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "ok": report.is_ok(),
            "routes": report.routes,
            "build_log": build_log,
        }));
        return finish(&report);
    }

    if !args.log_only {
        ctx.output.success(&format!("Prerendered {} route(s)", report.routes.len()));
        for route in &report.routes {
            if let Some(ref error) = route.error {
                ctx.output.warn(&format!("{}: {}", route.path, error));
            }
            ctx.output.kv(
                &route.path,
                &format!(
                    "{} deferred task(s), {} denied, {} failed in {}",
                    route.drain.total(),
                    route.drain.denied,
                    route.drain.failed,
                    format_millis(route.drain.elapsed_ms)
                ),
            );
        }
    }

    ctx.output.header("Build log");
    ctx.output.log_entries(&build_log, &ctx.config.log);

    finish(&report)
}

fn finish(report: &BuildReport) -> Result<()> {
    let failed = report.failures().count();
    if failed > 0 {
        bail!("Build failed: {} route(s) could not be prerendered", failed);
    }
    Ok(())
}
