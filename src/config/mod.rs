//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → lifecycle::startup builds the server from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AssetsConfig, ControllersConfig, DatabaseConfig, DiagnosticsConfig, ListenerConfig,
    LocalRouteConfig, ObservabilityConfig, RedirectRouteConfig, RemoteRouteConfig, RoutesConfig,
    ServiceConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
