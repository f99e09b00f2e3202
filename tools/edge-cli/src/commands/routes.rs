//! List the workload's routes.

use anyhow::Result;

use super::RoutesArgs;
use crate::context::Context;
use crate::output::phase_badge;

/// Run the routes command.
pub async fn run(args: RoutesArgs, ctx: &Context) -> Result<()> {
    let server = ctx.server_config(args.mode.map(Into::into));
    let manifest = after_api_usage::app().manifest();

    if ctx.output.is_json() {
        let routes: Vec<_> = manifest
            .routes
            .iter()
            .map(|route| {
                serde_json::json!({
                    "route": route,
                    "render_phase": route.render_phase(server.mode),
                })
            })
            .collect();
        ctx.output.json(&serde_json::json!({
            "name": manifest.name,
            "version": manifest.version,
            "mode": server.mode,
            "routes": routes,
        }));
        return Ok(());
    }

    ctx.output.header(&format!(
        "{} v{} ({:?})",
        manifest.name, manifest.version, server.mode
    ));

    let widths = [44, 14, 14, 8];
    ctx.output
        .table_row(&["PATH", "KIND", "DYNAMIC", "METHODS"], &widths);
    for route in &manifest.routes {
        let kind = serde_json::to_value(route.kind)?;
        let dynamic = serde_json::to_value(route.dynamic)?;
        let methods = route.methods.join(",");
        ctx.output.table_row(
            &[
                route.path.as_str(),
                kind.as_str().unwrap_or_default(),
                dynamic.as_str().unwrap_or_default(),
                methods.as_str(),
            ],
            &widths,
        );
        ctx.output
            .kv("  phase", &phase_badge(route.render_phase(server.mode)));
    }

    Ok(())
}
