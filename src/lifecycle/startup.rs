//! Startup orchestration.
//!
//! # Responsibilities
//! - Register and optionally open the configured database connections
//! - Build the web server and register every configured route
//! - Bind the listener (plain or TLS) and serve until shutdown
//! - Close database sessions once the server has drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Databases come first, so controllers never see a half-built registry
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, ListenerConfig, ServiceConfig};
use crate::controller::system_controller;
use crate::db::{ConnectionRegistry, DbError, Driver, QueryExecutor};
use crate::http::{ServerError, WebServer};
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, TlsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("server: {0}")]
    Server(#[from] ServerError),

    #[error("database {name}: {source}")]
    Database { name: String, source: DbError },

    #[error("tls: {0}")]
    Tls(#[from] TlsError),

    #[error("invalid bind address {0}")]
    BindAddress(String),

    #[error("can't bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

/// Everything the running process owns.
pub struct Service {
    pub server: WebServer,
    pub databases: Arc<ConnectionRegistry>,
    pub executor: QueryExecutor,
}

/// Build the service from validated configuration.
pub async fn build_service(
    config: &ServiceConfig,
    driver: Arc<dyn Driver>,
) -> Result<Service, StartupError> {
    let databases = Arc::new(ConnectionRegistry::new(driver));
    for db in &config.databases {
        databases.add(db.connection());
        if db.open_on_start {
            databases
                .open(&db.name)
                .await
                .map_err(|source| StartupError::Database {
                    name: db.name.clone(),
                    source,
                })?;
        }
    }
    let executor = QueryExecutor::new(Arc::clone(&databases));

    let mut server = WebServer::new(config)?;
    server.register_controller("system", "v1", system_controller(executor.clone()))?;

    for route in &config.routes.local {
        server.register_local_route(&route.pattern, &route.path)?;
    }
    for route in &config.routes.remote {
        server.register_remote_route(&route.pattern, &route.target)?;
    }
    for route in &config.routes.redirect {
        server.register_redirect(&route.pattern, &route.location, route.status)?;
    }

    tracing::info!(
        routes = server.patterns().len(),
        databases = databases.names().len(),
        "Service built"
    );

    Ok(Service {
        server,
        databases,
        executor,
    })
}

impl Service {
    /// Bind and serve until `shutdown` fires, then close every session.
    ///
    /// Sessions are closed on every exit, including a listener that never
    /// came up.
    pub async fn serve(self, listener: &ListenerConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
        let Service {
            server, databases, ..
        } = self;

        let result = listen(server, listener, shutdown).await;
        databases.close_all().await;
        result
    }
}

async fn listen(server: WebServer, listener: &ListenerConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    match &listener.tls {
        Some(tls) => {
            let addr: SocketAddr = listener
                .bind_address
                .parse()
                .map_err(|_| StartupError::BindAddress(listener.bind_address.clone()))?;
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
            server.run_tls(addr, rustls, shutdown.subscribe()).await?;
        }
        None => {
            let tcp = TcpListener::bind(&listener.bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    address: listener.bind_address.clone(),
                    source,
                })?;
            server.run(tcp, shutdown.subscribe()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, RemoteRouteConfig, TlsConfig};
    use crate::db::{ConnectionConfig, Param, QueryOutcome, Session};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle;

    #[async_trait]
    impl Session for Idle {
        async fn run(&self, _statement: &str, _params: &[Param]) -> Result<QueryOutcome, DbError> {
            Ok(QueryOutcome::Affected(0))
        }

        async fn close(&self) -> Result<(), DbError> {
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl Driver for Refusing {
        async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
            if config.host == "down" {
                return Err(DbError::Open {
                    name: config.name.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(Arc::new(Idle))
        }
    }

    #[derive(Default)]
    struct Recording {
        closes: Arc<AtomicUsize>,
    }

    struct Counted(Arc<AtomicUsize>);

    #[async_trait]
    impl Session for Counted {
        async fn run(&self, _statement: &str, _params: &[Param]) -> Result<QueryOutcome, DbError> {
            Ok(QueryOutcome::Affected(0))
        }

        async fn close(&self) -> Result<(), DbError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Driver for Recording {
        async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
            Ok(Arc::new(Counted(self.closes.clone())))
        }
    }

    fn db(name: &str, host: &str, open_on_start: bool) -> DatabaseConfig {
        DatabaseConfig {
            name: name.to_string(),
            host: host.to_string(),
            user: "app".to_string(),
            password: String::new(),
            database: "app".to_string(),
            port: 5432,
            open_on_start,
        }
    }

    #[tokio::test]
    async fn test_build_opens_only_requested_connections() {
        let mut config = ServiceConfig::default();
        config.databases = vec![db("main", "localhost", true), db("reports", "localhost", false)];

        let service = build_service(&config, Arc::new(Refusing)).await.unwrap();
        assert!(service.databases.is_open("main"));
        assert!(!service.databases.is_open("reports"));
        assert!(service.server.patterns().contains(&"/ws/v1/system/"));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_fatal() {
        let mut config = ServiceConfig::default();
        config.databases = vec![db("main", "down", true)];

        let err = build_service(&config, Arc::new(Refusing)).await.err().unwrap();
        assert!(matches!(err, StartupError::Database { ref name, .. } if name == "main"));
    }

    #[tokio::test]
    async fn test_bad_remote_route_is_fatal() {
        let mut config = ServiceConfig::default();
        config.routes.remote.push(RemoteRouteConfig {
            pattern: "/api/".to_string(),
            target: "ftp://files".to_string(),
        });

        let err = build_service(&config, Arc::new(Refusing)).await.err().unwrap();
        assert!(matches!(err, StartupError::Server(ServerError::Proxy(_))));
    }

    async fn serve_with(listener: ListenerConfig) -> (Result<(), StartupError>, usize) {
        let mut config = ServiceConfig::default();
        config.databases = vec![db("main", "localhost", true)];
        let driver = Recording::default();
        let closes = driver.closes.clone();

        let service = build_service(&config, Arc::new(driver)).await.unwrap();
        assert!(service.databases.is_open("main"));
        let result = service.serve(&listener, &Shutdown::new()).await;
        (result, closes.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_missing_tls_files_still_close_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let listener = ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            tls: Some(TlsConfig {
                cert_path: dir.path().join("cert.pem").display().to_string(),
                key_path: dir.path().join("key.pem").display().to_string(),
            }),
        };

        let (result, closes) = serve_with(listener).await;
        assert!(matches!(result, Err(StartupError::Tls(_))));
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_unparseable_tls_bind_address_still_closes_sessions() {
        let listener = ListenerConfig {
            bind_address: "not-an-address".to_string(),
            tls: Some(TlsConfig {
                cert_path: "cert.pem".to_string(),
                key_path: "key.pem".to_string(),
            }),
        };

        let (result, closes) = serve_with(listener).await;
        assert!(matches!(result, Err(StartupError::BindAddress(ref a)) if a == "not-an-address"));
        assert_eq!(closes, 1);
    }
}
