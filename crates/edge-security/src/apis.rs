//! Guarded request APIs handed to application code.

use std::sync::Arc;

use edge_core::{ConnectionInfo, CookieJar, RequestContext};
use edge_observability::{LogEntry, LogLevel};
use http::HeaderMap;

use crate::capability::{Capability, DraftModeCall};
use crate::guard::{CapabilityDeniedError, CapabilityGuard};

/// Request APIs for one request, checked against its lifecycle phase.
///
/// Every accessor checks at the moment it is called. A value obtained
/// while the context is live is an immutable snapshot and stays usable.
#[derive(Debug, Clone)]
pub struct RequestApis {
    context: Arc<RequestContext>,
    guard: Arc<CapabilityGuard>,
}

impl RequestApis {
    pub fn new(context: Arc<RequestContext>, guard: Arc<CapabilityGuard>) -> Self {
        Self { context, guard }
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }

    pub fn guard(&self) -> &Arc<CapabilityGuard> {
        &self.guard
    }

    /// Route path of the request.
    pub fn route(&self) -> &str {
        self.context.route()
    }

    /// Request headers.
    pub fn headers(&self) -> Result<&HeaderMap, CapabilityDeniedError> {
        self.guard.enforce(&self.context, Capability::Headers)?;
        Ok(self.context.headers_snapshot())
    }

    /// Request cookies.
    pub fn cookies(&self) -> Result<&CookieJar, CapabilityDeniedError> {
        self.guard.enforce(&self.context, Capability::Cookies)?;
        Ok(self.context.cookies_snapshot())
    }

    /// Client connection descriptor.
    pub fn connection(&self) -> Result<&ConnectionInfo, CapabilityDeniedError> {
        self.guard.enforce(&self.context, Capability::Connection)?;
        Ok(self.context.connection_snapshot())
    }

    /// Draft mode handle.
    pub fn draft_mode(&self) -> DraftMode<'_> {
        DraftMode { apis: self }
    }

    /// Log an application message to the log for this render.
    pub fn log(&self, message: impl Into<String>) {
        self.guard
            .reporter()
            .report(LogEntry::for_request(LogLevel::Info, message, &self.context));
    }

    /// Log an application error to the log for this render.
    pub fn log_error(&self, message: impl Into<String>) {
        self.guard
            .reporter()
            .report(LogEntry::for_request(LogLevel::Error, message, &self.context));
    }
}

/// Draft mode status and toggles.
#[derive(Debug, Clone, Copy)]
pub struct DraftMode<'a> {
    apis: &'a RequestApis,
}

impl DraftMode<'_> {
    /// Whether draft mode is on. Never fails; reads `false` once the
    /// response has been sent, whatever the stored value.
    pub fn is_enabled(&self) -> bool {
        let ctx = &self.apis.context;
        match self.apis.guard.check_read(ctx, Capability::DraftModeRead) {
            None => ctx.draft_mode_enabled(),
            Some(_) => false,
        }
    }

    /// Turn draft mode on.
    pub fn enable(&self) -> Result<(), CapabilityDeniedError> {
        self.set(DraftModeCall::Enable)
    }

    /// Turn draft mode off.
    pub fn disable(&self) -> Result<(), CapabilityDeniedError> {
        self.set(DraftModeCall::Disable)
    }

    fn set(&self, call: DraftModeCall) -> Result<(), CapabilityDeniedError> {
        let ctx = &self.apis.context;
        let capability = Capability::DraftModeWrite(call);
        self.apis.guard.enforce(ctx, capability)?;

        if ctx.set_draft_mode(call.target_value()).is_err() {
            // Phase advanced between the check and the write.
            self.apis.guard.enforce(ctx, capability)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::{Method, DRAFT_MODE_COOKIE};
    use edge_observability::{ExecutionReporter, MemorySink};
    use http::header::{COOKIE, USER_AGENT};
    use http::HeaderValue;

    fn apis(ctx: RequestContext) -> (RequestApis, Arc<MemorySink>) {
        let runtime = Arc::new(MemorySink::new());
        let build = Arc::new(MemorySink::new());
        let guard = CapabilityGuard::new(ExecutionReporter::new(runtime.clone(), build));
        (RequestApis::new(Arc::new(ctx), Arc::new(guard)), runtime)
    }

    fn request() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("test-agent"));
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        RequestContext::new(Method::Get, "/page").with_headers(headers)
    }

    #[test]
    fn test_live_reads() {
        let (apis, runtime) = apis(request());

        assert_eq!(apis.headers().unwrap()[USER_AGENT], "test-agent");
        assert_eq!(apis.cookies().unwrap().get("theme"), Some("dark"));
        assert!(apis.connection().is_ok());
        assert!(runtime.is_empty());
    }

    #[test]
    fn test_reads_denied_after_response() {
        let (apis, runtime) = apis(request());
        apis.context().advance_phase().unwrap();

        assert!(apis.headers().is_err());
        assert!(apis.cookies().is_err());
        assert!(apis.connection().is_err());
        assert_eq!(runtime.len(), 3);
    }

    #[test]
    fn test_snapshot_taken_while_live_stays_usable() {
        let (apis, _) = apis(request());
        let headers = apis.headers().unwrap().clone();
        apis.context().advance_phase().unwrap();

        assert_eq!(headers[USER_AGENT], "test-agent");
    }

    #[test]
    fn test_draft_mode_toggles_while_live() {
        let (apis, _) = apis(request());
        let draft = apis.draft_mode();

        assert!(!draft.is_enabled());
        draft.enable().unwrap();
        assert!(draft.is_enabled());
        draft.disable().unwrap();
        assert!(!draft.is_enabled());
    }

    #[test]
    fn test_draft_mode_reads_false_after_response() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{}=1", DRAFT_MODE_COOKIE)).unwrap(),
        );
        let ctx = RequestContext::new(Method::Get, "/draft").with_headers(headers);
        let (apis, runtime) = apis(ctx);
        assert!(apis.draft_mode().is_enabled());

        apis.context().advance_phase().unwrap();

        assert!(!apis.draft_mode().is_enabled());
        assert!(apis.context().draft_mode_enabled());
        assert_eq!(runtime.entries()[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_draft_mode_writes_rejected_before_store() {
        let (apis, runtime) = apis(request());
        apis.context().advance_phase().unwrap();

        let enable = apis.draft_mode().enable().unwrap_err();
        let disable = apis.draft_mode().disable().unwrap_err();

        assert!(enable.message().contains("\"draftMode().enable()\""));
        assert!(disable.message().contains("\"draftMode().disable()\""));
        assert!(!apis.context().draft_mode_enabled());
        assert_eq!(runtime.count_matching("draftMode()."), 2);
    }

    #[test]
    fn test_application_log_routed_by_phase() {
        let (apis, runtime) = apis(request());
        apis.log("[/page] hello");
        assert!(runtime.contains("[/page] hello"));
    }
}
