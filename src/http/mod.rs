//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum / axum-server)
//!     → request.rs (assign request ID)
//!     → server.rs (timeout, tracing, fallback into the pattern registry)
//!     → [registry picks handler, controller, remote route, alias, redirect]
//!     → response.rs (JSON envelope for controllers and diagnostics)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use response::{json, json_error, Envelope};
pub use server::{ServerError, WebServer};
