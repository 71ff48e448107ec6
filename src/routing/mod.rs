//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (exact lookup, trailing-slash redirect, longest prefix)
//!     → matcher.rs (exact / prefix pattern semantics)
//!     → Return: handler, alias (re-dispatch), redirect or not-found
//!
//! Registration (at startup):
//!     diagnostics, assets, controllers, remote routes, aliases, redirects
//!     → PatternRegistry (mutable)
//!     → frozen behind Arc once the server starts
//! ```
//!
//! # Design Decisions
//! - Registry is immutable at runtime
//! - No regex in the lookup path
//! - Deterministic: the same path always resolves to the same target

pub mod matcher;
pub mod router;

use thiserror::Error;

pub use matcher::Pattern;
pub use router::{handler_fn, Handler, PatternRegistry, Resolution, RouteTarget};

/// Registration-time routing errors.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("pattern can't be empty")]
    EmptyPattern,

    #[error("pattern must start with '/': {0}")]
    InvalidPattern(String),

    #[error("alias target must be an absolute path: {0}")]
    InvalidAliasTarget(String),

    #[error("redirect status must be 3xx, got {0}")]
    InvalidRedirectStatus(u16),

    #[error("redirect location can't be empty")]
    EmptyLocation,
}
