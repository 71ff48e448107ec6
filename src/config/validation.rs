//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, 3xx redirects)
//! - Check route patterns and upstream targets before anything binds
//! - Detect duplicate database names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::proxy::ProxyTarget;

/// One semantic problem, with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "can't be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "can't be empty"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let obs = &config.observability;
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected pretty or json, got {}", obs.log_format),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", obs.metrics_address),
        ));
    }

    if config.assets.enabled {
        let prefix = &config.assets.url_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            errors.push(ValidationError::new(
                "assets.url_prefix",
                "must start and end with '/'",
            ));
        }
    }

    let group = &config.controllers.group;
    if group.is_empty() || group.contains('/') {
        errors.push(ValidationError::new(
            "controllers.group",
            "must be a single non-empty path segment",
        ));
    }

    check_pattern(&mut errors, "diagnostics.ping_path", &config.diagnostics.ping_path);
    check_pattern(&mut errors, "diagnostics.stats_path", &config.diagnostics.stats_path);

    for (i, route) in config.routes.local.iter().enumerate() {
        check_pattern(&mut errors, &format!("routes.local[{i}].pattern"), &route.pattern);
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes.local[{i}].path"),
                "must be an absolute path",
            ));
        }
    }

    for (i, route) in config.routes.remote.iter().enumerate() {
        check_pattern(&mut errors, &format!("routes.remote[{i}].pattern"), &route.pattern);
        if let Err(e) = ProxyTarget::parse(&route.target) {
            errors.push(ValidationError::new(format!("routes.remote[{i}].target"), e.to_string()));
        }
    }

    for (i, route) in config.routes.redirect.iter().enumerate() {
        check_pattern(&mut errors, &format!("routes.redirect[{i}].pattern"), &route.pattern);
        if route.location.is_empty() {
            errors.push(ValidationError::new(
                format!("routes.redirect[{i}].location"),
                "can't be empty",
            ));
        }
        if !(300..400).contains(&route.status) {
            errors.push(ValidationError::new(
                format!("routes.redirect[{i}].status"),
                format!("must be 3xx, got {}", route.status),
            ));
        }
    }

    let mut names = HashSet::new();
    for (i, db) in config.databases.iter().enumerate() {
        if db.name.is_empty() {
            errors.push(ValidationError::new(format!("databases[{i}].name"), "can't be empty"));
        } else if !names.insert(db.name.as_str()) {
            errors.push(ValidationError::new(
                format!("databases[{i}].name"),
                format!("duplicate connection name: {}", db.name),
            ));
        }
        if db.port == 0 {
            errors.push(ValidationError::new(format!("databases[{i}].port"), "must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_pattern(errors: &mut Vec<ValidationError>, field: &str, pattern: &str) {
    if !pattern.starts_with('/') {
        errors.push(ValidationError::new(field, "pattern must start with '/'"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{DatabaseConfig, RedirectRouteConfig, RemoteRouteConfig};

    fn db(name: &str) -> DatabaseConfig {
        DatabaseConfig {
            name: name.to_string(),
            host: "localhost".to_string(),
            user: "app".to_string(),
            password: String::new(),
            database: "app".to_string(),
            port: 5432,
            open_on_start: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.observability.log_format = "xml".to_string();
        config.routes.remote.push(RemoteRouteConfig {
            pattern: "api/".to_string(),
            target: "https://secure.example.com/".to_string(),
        });
        config.routes.redirect.push(RedirectRouteConfig {
            pattern: "/old".to_string(),
            location: String::new(),
            status: 200,
        });
        config.databases = vec![db("main"), db("main")];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "observability.log_format",
                "routes.remote[0].pattern",
                "routes.remote[0].target",
                "routes.redirect[0].location",
                "routes.redirect[0].status",
                "databases[1].name",
            ]
        );
    }

    #[test]
    fn test_asset_prefix_must_be_prefix_pattern() {
        let mut config = ServiceConfig::default();
        config.assets.url_prefix = "/static".to_string();
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);

        config.assets.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
