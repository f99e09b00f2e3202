//! Per-request dynamic context.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use http::header::COOKIE;
use http::HeaderMap;

use crate::config::RenderPhase;
use crate::lifecycle::{ContextPhase, PhaseCell, PhaseError};

/// Cookie whose presence turns draft mode on for a request.
pub const DRAFT_MODE_COOKIE: &str = "__prerender_bypass";

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", nanos, seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// Immutable cookie snapshot parsed from the request's `Cookie` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    /// Parse every `Cookie` header in `headers`.
    ///
    /// Later duplicates win. Pairs without `=` are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        Self { cookies }
    }

    /// Get a cookie value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    /// Whether a cookie with `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Iterate cookies in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Descriptor of the client connection a request arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer address, when the transport exposes one.
    pub remote_addr: Option<SocketAddr>,
    /// Whether the connection is TLS-terminated.
    pub secure: bool,
}

impl ConnectionInfo {
    /// Create a descriptor for a peer address.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            secure: false,
        }
    }

    /// Mark the connection as secure.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Per-request dynamic state.
///
/// Exactly one exists per request or prerender. It is shared (`Arc`) between
/// the render and every deferred task so that all of them observe the real
/// phase transitions. Snapshot fields are fixed at creation; the draft mode
/// flag is the only mutable state and only accepts writes while `Live`.
///
/// The `*_snapshot` accessors are unchecked. Application code reads request
/// state through the guarded accessors in `edge-security`.
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    route: String,
    render_phase: RenderPhase,
    headers: HeaderMap,
    cookies: CookieJar,
    connection: ConnectionInfo,
    /// Phase and draft mode flag.
    phase: PhaseCell,
}

impl RequestContext {
    /// Create a live context for `route`.
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::generate(),
            method,
            route: route.into(),
            render_phase: RenderPhase::Dynamic,
            headers: HeaderMap::new(),
            cookies: CookieJar::default(),
            connection: ConnectionInfo::default(),
            phase: PhaseCell::new(),
        }
    }

    /// Capture request headers. Cookies are parsed from them, and draft
    /// mode starts enabled when the bypass cookie is present.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.cookies = CookieJar::from_headers(&headers);
        self.phase = PhaseCell::with_draft_mode(self.cookies.contains(DRAFT_MODE_COOKIE));
        self.headers = headers;
        self
    }

    /// Capture the connection descriptor.
    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }

    /// Set the render phase the request is evaluated in.
    pub fn with_render_phase(mut self, render_phase: RenderPhase) -> Self {
        self.render_phase = render_phase;
        self
    }

    /// Override the request ID.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Override the initial draft mode flag.
    pub fn with_draft_mode(mut self, enabled: bool) -> Self {
        self.phase = PhaseCell::with_draft_mode(enabled);
        self
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Route path, used for diagnostics.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn render_phase(&self) -> RenderPhase {
        self.render_phase
    }

    /// Current lifecycle phase. Side-effect free.
    pub fn phase(&self) -> ContextPhase {
        self.phase.get()
    }

    pub fn is_live(&self) -> bool {
        self.phase() == ContextPhase::Live
    }

    /// Advance to the next lifecycle phase.
    pub fn advance_phase(&self) -> Result<ContextPhase, PhaseError> {
        let phase = self.phase.advance()?;
        tracing::debug!(
            request_id = %self.request_id,
            route = %self.route,
            phase = %phase,
            "request context advanced"
        );
        Ok(phase)
    }

    /// Advance to `to`, which must directly follow the current phase.
    pub fn advance_to(&self, to: ContextPhase) -> Result<(), PhaseError> {
        self.phase.advance_to(to)?;
        tracing::debug!(
            request_id = %self.request_id,
            route = %self.route,
            phase = %to,
            "request context advanced"
        );
        Ok(())
    }

    /// Unchecked header snapshot.
    pub fn headers_snapshot(&self) -> &HeaderMap {
        &self.headers
    }

    /// Unchecked cookie snapshot.
    pub fn cookies_snapshot(&self) -> &CookieJar {
        &self.cookies
    }

    /// Unchecked connection descriptor.
    pub fn connection_snapshot(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Raw draft mode flag.
    pub fn draft_mode_enabled(&self) -> bool {
        self.phase.draft_mode()
    }

    /// Write the draft mode flag. Rejected unless the context is `Live`;
    /// the phase check and the write are one atomic step.
    pub fn set_draft_mode(&self, enabled: bool) -> Result<(), PhaseError> {
        self.phase.set_draft_mode(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with_cookie(cookie: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(cookie));
        headers
    }

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::generate();
        let id2 = RequestId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("post".parse::<Method>(), Ok(Method::Post));
        assert_eq!(Method::Get.to_string(), "GET");
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn test_cookie_jar_parsing() {
        let mut headers = headers_with_cookie("theme=dark; session = abc ;broken");
        headers.append(COOKIE, HeaderValue::from_static("lang=en"));

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.len(), 3);
        assert_eq!(jar.get("theme"), Some("dark"));
        assert_eq!(jar.get("session"), Some("abc"));
        assert_eq!(jar.get("lang"), Some("en"));
        assert!(!jar.contains("broken"));
    }

    #[test]
    fn test_context_starts_live() {
        let ctx = RequestContext::new(Method::Get, "/products");
        assert!(ctx.is_live());
        assert_eq!(ctx.route(), "/products");
        assert_eq!(ctx.render_phase(), RenderPhase::Dynamic);
        assert!(!ctx.draft_mode_enabled());
    }

    #[test]
    fn test_draft_mode_from_bypass_cookie() {
        let ctx = RequestContext::new(Method::Get, "/")
            .with_headers(headers_with_cookie("__prerender_bypass=1"));
        assert!(ctx.draft_mode_enabled());
    }

    #[test]
    fn test_draft_mode_write_only_while_live() {
        let ctx = RequestContext::new(Method::Get, "/");

        ctx.set_draft_mode(true).unwrap();
        assert!(ctx.draft_mode_enabled());

        ctx.advance_phase().unwrap();
        assert_eq!(
            ctx.set_draft_mode(false),
            Err(PhaseError::NotLive(ContextPhase::ResponseSent))
        );
        assert!(ctx.draft_mode_enabled());
    }

    #[test]
    fn test_context_out_of_order_advance() {
        let ctx = RequestContext::new(Method::Get, "/");
        assert!(ctx.advance_to(ContextPhase::TornDown).is_err());
        assert!(ctx.advance_to(ContextPhase::ResponseSent).is_ok());
        assert!(ctx.advance_to(ContextPhase::TornDown).is_ok());
        assert!(ctx.advance_phase().is_err());
    }
}
