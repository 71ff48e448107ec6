//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! service. All types derive Serde traits for deserialization from
//! config files, and every section has defaults so a minimal file works.

use serde::{Deserialize, Serialize};

use crate::db::ConnectionConfig;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static asset serving.
    pub assets: AssetsConfig,

    /// Controller URL settings.
    pub controllers: ControllersConfig,

    /// Built-in diagnostic routes.
    pub diagnostics: DiagnosticsConfig,

    /// Declarative routes registered at startup.
    pub routes: RoutesConfig,

    /// Named database connections.
    pub databases: Vec<DatabaseConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Serve HTTPS when present.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Whole-request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `pretty` or `json`.
    pub log_format: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub enabled: bool,

    /// Prefix pattern, must end with `/`. Stripped before file lookup.
    pub url_prefix: String,

    /// Directory served under the prefix.
    pub directory: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_prefix: "/includes/".to_string(),
            directory: "./includes".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllersConfig {
    /// First path segment of every controller URL.
    pub group: String,
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            group: "ws".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub ping_path: String,
    pub stats_path: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            ping_path: "/ping".to_string(),
            stats_path: "/stats".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutesConfig {
    pub local: Vec<LocalRouteConfig>,
    pub remote: Vec<RemoteRouteConfig>,
    pub redirect: Vec<RedirectRouteConfig>,
}

/// Alias: requests to `pattern` are re-dispatched as `path`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalRouteConfig {
    pub pattern: String,
    pub path: String,
}

/// Requests to `pattern` are forwarded to `target`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteRouteConfig {
    pub pattern: String,
    /// Upstream URL (e.g., "http://localhost:9000/").
    pub target: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectRouteConfig {
    pub pattern: String,
    pub location: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

fn default_redirect_status() -> u16 {
    301
}

/// A named database connection.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Connect during startup instead of on first explicit open.
    #[serde(default)]
    pub open_on_start: bool,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

impl DatabaseConfig {
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            name: self.name.clone(),
            host: self.host.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            port: self.port,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("connection", &self.connection())
            .field("open_on_start", &self.open_on_start)
            .finish()
    }
}
