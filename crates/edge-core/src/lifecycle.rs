//! Request context lifecycle tracking.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle phases of a request's dynamic context.
///
/// Phases only move forward, one step at a time:
/// `Live` -> `ResponseSent` -> `TornDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ContextPhase {
    /// Render in progress, request APIs are usable.
    Live = 0,
    /// Primary response handed off, deferred tasks are draining.
    ResponseSent = 1,
    /// Draining finished or the slot is being recycled. Terminal.
    TornDown = 2,
}

impl ContextPhase {
    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Live => Some(Self::ResponseSent),
            Self::ResponseSent => Some(Self::TornDown),
            Self::TornDown => None,
        }
    }

    /// The only phase this one may be entered from.
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Live => None,
            Self::ResponseSent => Some(Self::Live),
            Self::TornDown => Some(Self::ResponseSent),
        }
    }

    /// Stable upper-case name, as used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::ResponseSent => "RESPONSE_SENT",
            Self::TornDown => "TORN_DOWN",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Live,
            1 => Self::ResponseSent,
            _ => Self::TornDown,
        }
    }
}

impl fmt::Display for ContextPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for lifecycle violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("cannot advance request context from {from} to {to}")]
    OutOfOrder { from: ContextPhase, to: ContextPhase },

    #[error("request context is {0}, not LIVE")]
    NotLive(ContextPhase),
}

/// Draft mode flag, packed next to the phase so a write and a phase
/// advance can never interleave.
const DRAFT_MODE_BIT: u8 = 0b1000_0000;
const PHASE_MASK: u8 = 0b0000_0011;

/// Atomic holder for a forward-only [`ContextPhase`] and the request's draft
/// mode flag.
///
/// Shared by reference between the render and every deferred task, so all
/// of them observe the same transitions.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    /// Create a cell in the `Live` phase.
    pub fn new() -> Self {
        Self::with_draft_mode(false)
    }

    /// Create a `Live` cell with an initial draft mode flag.
    pub fn with_draft_mode(enabled: bool) -> Self {
        let draft = if enabled { DRAFT_MODE_BIT } else { 0 };
        Self(AtomicU8::new(ContextPhase::Live as u8 | draft))
    }

    /// Current phase. Side-effect free.
    pub fn get(&self) -> ContextPhase {
        ContextPhase::from_u8(self.0.load(Ordering::Acquire) & PHASE_MASK)
    }

    pub fn draft_mode(&self) -> bool {
        self.0.load(Ordering::Acquire) & DRAFT_MODE_BIT != 0
    }

    /// Write the draft mode flag in the same atomic step that confirms the
    /// phase is still `Live`.
    pub fn set_draft_mode(&self, enabled: bool) -> Result<(), PhaseError> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                if raw & PHASE_MASK != ContextPhase::Live as u8 {
                    return None;
                }
                Some(if enabled {
                    raw | DRAFT_MODE_BIT
                } else {
                    raw & !DRAFT_MODE_BIT
                })
            })
            .map(|_| ())
            .map_err(|raw| PhaseError::NotLive(ContextPhase::from_u8(raw & PHASE_MASK)))
    }

    /// Move to `to`, which must directly follow the current phase.
    pub fn advance_to(&self, to: ContextPhase) -> Result<(), PhaseError> {
        let from = to.previous().ok_or(PhaseError::OutOfOrder {
            from: self.get(),
            to,
        })?;

        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (raw & PHASE_MASK == from as u8).then_some((raw & !PHASE_MASK) | to as u8)
            })
            .map(|_| ())
            .map_err(|raw| PhaseError::OutOfOrder {
                from: ContextPhase::from_u8(raw & PHASE_MASK),
                to,
            })
    }

    /// Move one step forward and return the new phase.
    pub fn advance(&self) -> Result<ContextPhase, PhaseError> {
        let current = self.get();
        let to = current.next().ok_or(PhaseError::OutOfOrder {
            from: current,
            to: current,
        })?;
        self.advance_to(to)?;
        Ok(to)
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
