//! Phase-based capability guard for request-scoped APIs.
//!
//! This crate provides:
//! - `Capability` - Static registry of guarded operations and their policies
//! - `CapabilityGuard` - Allow / degrade / deny decisions with diagnostics
//! - `RequestApis` / `DraftMode` - Guarded accessors handed to application code
//!
//! # Example
//!
//! ```ignore
//! use edge_security::{CapabilityGuard, RequestApis};
//!
//! let apis = RequestApis::new(context, Arc::new(CapabilityGuard::new(reporter)));
//!
//! // Live: returns the header snapshot.
//! let headers = apis.headers()?;
//!
//! // After the response: logged and returned as `CapabilityDeniedError`.
//! context.advance_phase()?;
//! assert!(apis.cookies().is_err());
//! assert!(!apis.draft_mode().is_enabled());
//! ```

mod apis;
mod capability;
mod guard;

pub use apis::*;
pub use capability::*;
pub use guard::*;
