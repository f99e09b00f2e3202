//! Executor error types.

use edge_core::{PhaseError, RequestId};

/// `after()` was called on a context that has been torn down.
///
/// Propagates to the registering code: there is no queue left to accept
/// the work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Route {route} scheduled deferred work after request {request_id} was torn down")]
    ContextTornDown { request_id: RequestId, route: String },
}

/// A deferred task failed for a reason other than capability denial.
///
/// Caught per task; never reaches the response and never blocks siblings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskExecutionError {
    #[error("{message}")]
    Failed {
        route: String,
        ordinal: u64,
        message: String,
    },

    #[error("deferred task panicked: {message}")]
    Panicked {
        route: String,
        ordinal: u64,
        message: String,
    },
}

impl TaskExecutionError {
    pub fn route(&self) -> &str {
        match self {
            Self::Failed { route, .. } | Self::Panicked { route, .. } => route,
        }
    }

    pub fn ordinal(&self) -> u64 {
        match self {
            Self::Failed { ordinal, .. } | Self::Panicked { ordinal, .. } => *ordinal,
        }
    }
}

/// Errors from draining a queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    #[error("deferred tasks for request {0} were already drained")]
    AlreadyDrained(RequestId),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}
