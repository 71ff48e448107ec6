//! Observability subsystem.
//!
//! ```text
//! controller dispatch ──▶ in_flight.rs (guard per call) ──▶ /stats
//!         │                        │
//!         ▼                        ▼
//! remote routes ──────────▶ metrics.rs ──▶ Prometheus scrape endpoint
//!
//! every subsystem ────────▶ logging.rs ──▶ stdout (pretty or JSON)
//! ```
//!
//! Log lines for a request carry its `request_id`. Metrics are no-ops
//! until an exporter is installed.

pub mod in_flight;
pub mod logging;
pub mod metrics;

pub use in_flight::{InFlightCounter, InFlightGuard};
pub use logging::init_logging;
