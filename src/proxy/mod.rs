//! Reverse-proxy forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Request matched to a remote route
//!     → director.rs (scheme/host/path/query rewrite, header policy)
//!     → forwarder.rs (shared client, 502 on connection failure)
//!     → headers.rs (hop-by-hop stripped from the upstream response)
//!     → Response streamed back unchanged
//! ```

pub mod director;
pub mod forwarder;
pub mod headers;
pub mod target;

use thiserror::Error;

pub use director::{direct, merge_query, single_joining_slash};
pub use forwarder::{upstream_client, RemoteRoute, UpstreamClient};
pub use target::ProxyTarget;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("request rewrite failed: {0}")]
    Rewrite(String),
}
