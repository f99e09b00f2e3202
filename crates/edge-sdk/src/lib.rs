//! Public SDK for after-response deferred execution.
//!
//! This crate re-exports all platform functionality:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! async fn page(scope: RequestScope) -> anyhow::Result<String> {
//!     scope.after(|scope| async move {
//!         // Runs once the response is out. Request APIs are denied here.
//!         if let Err(err) = scope.apis().headers() {
//!             tracing::debug!(%err, "headers unavailable after the response");
//!         }
//!         Ok(())
//!     })?;
//!     Ok("<h1>hello</h1>".to_string())
//! }
//!
//! let app = App::new("my-app").route(RouteConfig::page("/"), page);
//! let driver = RenderDriver::new(app, AfterConfig::production(), reporter);
//! driver.build().await?;
//! let rendered = driver.render(IncomingRequest::get("/")).await?;
//! ```

mod app;
mod driver;

pub use app::*;
pub use driver::*;

pub use edge_core;
pub use edge_executor;
pub use edge_observability;
pub use edge_security;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::app::*;
    pub use crate::driver::*;
    pub use edge_core::*;
    pub use edge_executor::*;
    pub use edge_observability::*;
    pub use edge_security::*;
}
