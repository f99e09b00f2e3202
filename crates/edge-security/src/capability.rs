//! Static registry of request-scoped capabilities.

use std::fmt;
use std::str::FromStr;

use edge_core::ContextPhase;
use serde::Serialize;

/// Mutating draft mode calls. Each is diagnosed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftModeCall {
    Enable,
    Disable,
}

impl DraftModeCall {
    /// Call-site spelling used in diagnostics.
    pub fn call_site(&self) -> &'static str {
        match self {
            Self::Enable => "draftMode().enable()",
            Self::Disable => "draftMode().disable()",
        }
    }

    /// Flag value the call writes.
    pub fn target_value(&self) -> bool {
        matches!(self, Self::Enable)
    }
}

/// A named request-scoped operation subject to phase-based permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    Headers,
    Cookies,
    Connection,
    DraftModeRead,
    DraftModeWrite(DraftModeCall),
}

impl Capability {
    /// Every capability in the registry.
    pub const ALL: [Capability; 6] = [
        Capability::Headers,
        Capability::Cookies,
        Capability::Connection,
        Capability::DraftModeRead,
        Capability::DraftModeWrite(DraftModeCall::Enable),
        Capability::DraftModeWrite(DraftModeCall::Disable),
    ];

    /// Registry name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Headers => "headers",
            Self::Cookies => "cookies",
            Self::Connection => "connection",
            Self::DraftModeRead => "draftMode.read",
            Self::DraftModeWrite(_) => "draftMode.write",
        }
    }

    /// Name a diagnostic quotes: the call site for mutations, the registry
    /// name otherwise.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DraftModeWrite(call) => call.call_site(),
            Self::DraftModeRead => "draftMode().isEnabled",
            other => other.name(),
        }
    }

    /// Look up this capability's policy.
    pub fn policy(&self) -> CapabilityPolicy {
        policy_for(*self)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for an unrecognised capability name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headers" => Ok(Self::Headers),
            "cookies" => Ok(Self::Cookies),
            "connection" => Ok(Self::Connection),
            "draftMode.read" | "draftMode().isEnabled" => Ok(Self::DraftModeRead),
            "draftMode.enable" | "draftMode().enable()" => {
                Ok(Self::DraftModeWrite(DraftModeCall::Enable))
            }
            "draftMode.disable" | "draftMode().disable()" => {
                Ok(Self::DraftModeWrite(DraftModeCall::Disable))
            }
            other => Err(UnknownCapability(other.to_string())),
        }
    }
}

/// What a use outside the permitted phases does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialKind {
    /// Reads fall back to a fixed default instead of failing.
    Degrade,
    /// Hard failure; the message ends with "This is not supported."
    Unsupported,
    /// Hard failure with the short message. No socket exists once the
    /// response is sent, so there is nothing to describe.
    ConnectionClosed,
    /// Hard failure naming the mutating call in backtick form.
    Mutation,
}

/// Registry entry for one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityPolicy {
    /// Phases in which the capability is permitted.
    pub permitted: &'static [ContextPhase],
    /// Behaviour outside those phases.
    pub denial: DenialKind,
}

impl CapabilityPolicy {
    /// Whether the capability is permitted in `phase`.
    pub fn permits(&self, phase: ContextPhase) -> bool {
        self.permitted.contains(&phase)
    }
}

const LIVE_ONLY: &[ContextPhase] = &[ContextPhase::Live];

/// Registry lookup.
pub fn policy_for(capability: Capability) -> CapabilityPolicy {
    let denial = match capability {
        Capability::Headers | Capability::Cookies => DenialKind::Unsupported,
        Capability::Connection => DenialKind::ConnectionClosed,
        Capability::DraftModeRead => DenialKind::Degrade,
        Capability::DraftModeWrite(_) => DenialKind::Mutation,
    };

    CapabilityPolicy {
        permitted: LIVE_ONLY,
        denial,
    }
}
