//! Phase-based capability checks.

use std::fmt;

use edge_core::RequestContext;
use edge_observability::{ExecutionReporter, LogEntry, LogLevel};
use serde::Serialize;

use crate::capability::{Capability, DenialKind};

/// Outcome class of a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictMode {
    Normal,
    ReadonlyDegrade,
    Denied,
}

impl VerdictMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ReadonlyDegrade => "readonly-degrade",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for VerdictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CapabilityGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub mode: VerdictMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    fn normal() -> Self {
        Self {
            allowed: true,
            mode: VerdictMode::Normal,
            message: None,
        }
    }

    fn degrade(message: String) -> Self {
        Self {
            allowed: true,
            mode: VerdictMode::ReadonlyDegrade,
            message: Some(message),
        }
    }

    fn denied(message: String) -> Self {
        Self {
            allowed: false,
            mode: VerdictMode::Denied,
            message: Some(message),
        }
    }

    pub fn is_denied(&self) -> bool {
        self.mode == VerdictMode::Denied
    }
}

/// A guarded accessor was invoked in a phase that forbids it.
///
/// Already reported by the guard when raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CapabilityDeniedError {
    pub route: String,
    pub capability: Capability,
    message: String,
}

impl CapabilityDeniedError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Notice accompanying a read that fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadonlyDegradeNotice {
    pub route: String,
    pub capability: Capability,
    pub message: String,
}

/// Diagnostic text for using `capability` on `route` after the response.
pub fn denial_message(route: &str, capability: Capability) -> String {
    let label = capability.label();
    match capability.policy().denial {
        DenialKind::Unsupported => format!(
            "Route {route} used \"{label}\" inside \"unstable_after(...)\". This is not supported."
        ),
        DenialKind::ConnectionClosed | DenialKind::Degrade => {
            format!("Route {route} used \"{label}\" inside \"unstable_after(...)\".")
        }
        DenialKind::Mutation => format!(
            "Route {route} used \"{label}\" inside `unstable_after`. \
             The enabled status of draftMode can be read inside `unstable_after` \
             but you cannot enable or disable draftMode."
        ),
    }
}

/// Decides ALLOW / DENY-READONLY / DENY for capability use.
///
/// Every denial and every degrade is reported exactly once per check; two
/// calls produce two entries.
#[derive(Debug, Clone)]
pub struct CapabilityGuard {
    reporter: ExecutionReporter,
}

impl CapabilityGuard {
    /// Create a guard reporting through `reporter`.
    pub fn new(reporter: ExecutionReporter) -> Self {
        Self { reporter }
    }

    pub fn reporter(&self) -> &ExecutionReporter {
        &self.reporter
    }

    /// Check `capability` against the context's current phase.
    pub fn check(&self, ctx: &RequestContext, capability: Capability) -> Verdict {
        let policy = capability.policy();
        let phase = ctx.phase();
        if policy.permits(phase) {
            return Verdict::normal();
        }

        let message = denial_message(ctx.route(), capability);
        if policy.denial == DenialKind::Degrade {
            self.reporter.report(
                LogEntry::for_request(LogLevel::Warn, message.clone(), ctx)
                    .field("capability", capability.name())
                    .field("phase", phase.as_str()),
            );
            return Verdict::degrade(message);
        }

        self.reporter.report(
            LogEntry::for_request(LogLevel::Error, format!("Error: {}", message), ctx)
                .field("capability", capability.name())
                .field("phase", phase.as_str()),
        );
        Verdict::denied(message)
    }

    /// Check `capability`, turning a denial into an error.
    pub fn enforce(
        &self,
        ctx: &RequestContext,
        capability: Capability,
    ) -> Result<Verdict, CapabilityDeniedError> {
        let verdict = self.check(ctx, capability);
        if verdict.is_denied() {
            return Err(CapabilityDeniedError {
                route: ctx.route().to_string(),
                capability,
                message: verdict
                    .message
                    .unwrap_or_else(|| denial_message(ctx.route(), capability)),
            });
        }
        Ok(verdict)
    }

    /// Check a degradable read, returning the notice when it degraded.
    pub fn check_read(
        &self,
        ctx: &RequestContext,
        capability: Capability,
    ) -> Option<ReadonlyDegradeNotice> {
        let verdict = self.check(ctx, capability);
        match verdict.mode {
            VerdictMode::Normal => None,
            _ => Some(ReadonlyDegradeNotice {
                route: ctx.route().to_string(),
                capability,
                message: verdict
                    .message
                    .unwrap_or_else(|| denial_message(ctx.route(), capability)),
            }),
        }
    }
}
