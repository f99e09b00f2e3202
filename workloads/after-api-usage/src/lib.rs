//! Fixture workload that calls request APIs from deferred work.
//!
//! Two route families, each in page, route handler and server action
//! flavours:
//! - `/request-apis/*` schedules one deferred task per request API
//!   (`headers`, `cookies`, `connection`). Every one of them is denied.
//! - `/draft-mode/*` reads the draft mode status from deferred work and then
//!   tries to enable and disable it. The read degrades to `false`; both
//!   writes are denied.

use edge_sdk::edge_core::{DynamicSetting, RouteConfig};
use edge_sdk::edge_executor::RequestScope;
use edge_sdk::App;

/// Request-API routes and their prerendering settings.
pub const REQUEST_API_ROUTES: &[(&str, Flavour, DynamicSetting)] = &[
    ("/request-apis/page-dynamic", Flavour::Page, DynamicSetting::ForceDynamic),
    ("/request-apis/page-dynamic-error", Flavour::Page, DynamicSetting::Error),
    ("/request-apis/page-force-static", Flavour::Page, DynamicSetting::ForceStatic),
    ("/request-apis/server-action", Flavour::ServerAction, DynamicSetting::Auto),
    ("/request-apis/route-handler-dynamic", Flavour::RouteHandler, DynamicSetting::ForceDynamic),
    ("/request-apis/route-handler-dynamic-error", Flavour::RouteHandler, DynamicSetting::Error),
    ("/request-apis/route-handler-force-static", Flavour::RouteHandler, DynamicSetting::ForceStatic),
];

/// Draft-mode routes and their prerendering settings.
pub const DRAFT_MODE_ROUTES: &[(&str, Flavour, DynamicSetting)] = &[
    ("/draft-mode/page-dynamic", Flavour::Page, DynamicSetting::ForceDynamic),
    ("/draft-mode/page-static", Flavour::Page, DynamicSetting::ForceStatic),
    ("/draft-mode/route-handler-dynamic", Flavour::RouteHandler, DynamicSetting::ForceDynamic),
    ("/draft-mode/route-handler-static", Flavour::RouteHandler, DynamicSetting::ForceStatic),
    ("/draft-mode/server-action", Flavour::ServerAction, DynamicSetting::Auto),
];

/// Entry point kind of a fixture route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    Page,
    RouteHandler,
    ServerAction,
}

impl Flavour {
    fn route(self, path: &str, dynamic: DynamicSetting) -> RouteConfig {
        let config = match self {
            Flavour::Page => RouteConfig::page(path),
            Flavour::RouteHandler => RouteConfig::route_handler(path),
            Flavour::ServerAction => RouteConfig::server_action(path),
        };
        config.with_dynamic(dynamic)
    }
}

/// Build the fixture application.
pub fn app() -> App {
    let app = REQUEST_API_ROUTES
        .iter()
        .fold(App::new("after-api-usage"), |app, (path, flavour, dynamic)| {
            app.route(flavour.route(path, *dynamic), request_apis)
        });

    DRAFT_MODE_ROUTES
        .iter()
        .fold(app, |app, (path, flavour, dynamic)| {
            app.route(flavour.route(path, *dynamic), draft_mode)
        })
}

/// One deferred task per request API.
async fn request_apis(scope: RequestScope) -> anyhow::Result<String> {
    scope.after(|scope| async move {
        scope.apis().headers()?;
        Ok(())
    })?;
    scope.after(|scope| async move {
        scope.apis().cookies()?;
        Ok(())
    })?;
    scope.after(|scope| async move {
        scope.apis().connection()?;
        Ok(())
    })?;
    Ok(format!("<p>{}</p>", scope.route()))
}

async fn draft_mode(scope: RequestScope) -> anyhow::Result<String> {
    scope.after(|scope| async move {
        let apis = scope.apis();
        let draft = apis.draft_mode();
        apis.log(format!("[{}] draft.isEnabled: {}", apis.route(), draft.is_enabled()));

        // Denials are already logged by the guard.
        if let Err(err) = draft.enable() {
            tracing::debug!(%err, "draft mode enable refused");
        }
        if let Err(err) = draft.disable() {
            tracing::debug!(%err, "draft mode disable refused");
        }
        Ok(())
    })?;
    Ok(format!("<p>{}</p>", scope.route()))
}
