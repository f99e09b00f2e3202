//! After-response deferred execution.
//!
//! This crate provides:
//! - `RequestScope` - The `after()` registration surface plus guarded request APIs
//! - `AfterQueue` - Per-request FIFO of deferred tasks, drained after the response
//! - `DrainScheduler` - Background drains with a shutdown grace period

mod error;
mod queue;
mod scheduler;
mod scope;
mod task;

pub use error::*;
pub use queue::*;
pub use scheduler::*;
pub use scope::*;
pub use task::*;
