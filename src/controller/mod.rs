//! Controller subsystem.
//!
//! # Data Flow
//! ```text
//! Request under /<group>/<version>/<resource>/
//!     → dispatcher.rs (split path, capitalize method, collect args)
//!     → table.rs (look the method up in the controller's table)
//!     → context.rs (per-call request handles + args)
//!     → method future → Response
//! ```
//!
//! # Design Decisions
//! - Methods are registered explicitly; no runtime reflection
//! - Request state is passed per call, never stored on the controller
//! - Malformed paths and unknown methods answer with the JSON error envelope

pub mod context;
pub mod dispatcher;
pub mod system;
pub mod table;

pub use context::{BodyError, CallContext};
pub use dispatcher::{capitalize, ControllerRoute, DispatchError, DispatchTarget};
pub use system::system_controller;
pub use table::{Controller, MethodHandler};
