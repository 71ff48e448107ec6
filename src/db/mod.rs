//! Database access subsystem.
//!
//! # Data Flow
//! ```text
//! Controller method
//!     → executor.rs (resolve session by name, run statement)
//!     → registry.rs (name → config + live session)
//!     → driver.rs / postgres.rs (wire protocol)
//!     → rows of cell.rs values
//!     → typed accessors on the caller's side (to_i64, to_time, ...)
//! ```
//!
//! # Design Decisions
//! - The registry is an owned object injected where needed, not a global
//! - Results are fully materialized; no cursors cross this boundary
//! - Every column arrives as text bytes or NULL and is parsed on demand

pub mod cell;
pub mod driver;
pub mod error;
pub mod executor;
pub mod postgres;
pub mod registry;

pub use cell::{Cell, CellError, Decoded};
pub use driver::{ConnectionConfig, Driver, Param, QueryOutcome, ResultSet, Row, Session};
pub use error::DbError;
pub use executor::QueryExecutor;
pub use postgres::PgDriver;
pub use registry::ConnectionRegistry;
