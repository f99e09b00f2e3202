//! Render a route and wait for its deferred work.

use anyhow::{anyhow, bail, Context as _, Result};
use edge_sdk::edge_core::{Method, RouteKind, ServerMode};
use edge_sdk::IncomingRequest;

use super::RenderArgs;
use crate::context::Context;
use crate::output::{format_millis, phase_badge};

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let server = ctx.server_config(args.mode.map(Into::into));
    let session = ctx.session(server.clone());

    let route = session
        .driver
        .app()
        .find(&args.path)
        .ok_or_else(|| anyhow!("No route matches {}. Run `edge routes` to list them.", args.path))?;
    let method = match args.method.as_deref() {
        Some(method) => method.parse::<Method>()?,
        None if route.config.kind == RouteKind::ServerAction => Method::Post,
        None => Method::Get,
    };

    if server.mode == ServerMode::Production {
        ctx.output.debug("Prerendering static routes");
        session.driver.build().await.context("Build failed")?;
    }

    let request = build_request(method, &args)?;
    let mut rendered = Vec::with_capacity(args.repeat);
    for _ in 0..args.repeat.max(1) {
        rendered.push(session.driver.render(request.clone()).await?);
    }

    let drains = session.driver.shutdown().await;
    let runtime_log = session.runtime.entries();

    if ctx.output.is_json() {
        let responses: Vec<_> = rendered
            .iter()
            .map(|r| {
                serde_json::json!({
                    "request_id": r.request_id.to_string(),
                    "route": r.route,
                    "render_phase": r.render_phase,
                    "from_prerender": r.from_prerender,
                    "body": r.body,
                })
            })
            .collect();
        ctx.output.json(&serde_json::json!({
            "responses": responses,
            "drains": drains,
            "runtime_log": runtime_log,
        }));
        return Ok(());
    }

    for response in &rendered {
        ctx.output.header(&format!("{} {}", method, response.route));
        ctx.output.kv("request", &response.request_id.to_string());
        ctx.output.kv("phase", &phase_badge(response.render_phase));
        if response.from_prerender {
            ctx.output.kv("served", "from build");
        }
        ctx.output.kv("body", &response.body);
    }

    for drain in &drains {
        ctx.output.debug(&format!(
            "request {}: {} completed, {} denied, {} failed, {} cancelled, {} dropped in {}",
            drain.request_id,
            drain.completed,
            drain.denied,
            drain.failed,
            drain.cancelled,
            drain.dropped,
            format_millis(drain.elapsed_ms)
        ));
    }

    ctx.output.header("Runtime log");
    ctx.output.log_entries(&runtime_log, &ctx.config.log);

    Ok(())
}

fn build_request(method: Method, args: &RenderArgs) -> Result<IncomingRequest> {
    let mut request = IncomingRequest::new(method, args.path.clone());

    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("Invalid header {:?}, expected `name: value`", header);
        };
        request = request.header(name.trim(), value.trim());
    }

    for cookie in &args.cookies {
        let Some((name, value)) = cookie.split_once('=') else {
            bail!("Invalid cookie {:?}, expected `name=value`", cookie);
        };
        request = request.cookie(name.trim(), value.trim());
    }

    Ok(request)
}
