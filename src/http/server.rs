//! HTTP server setup and route registration.
//!
//! # Responsibilities
//! - Own the pattern registry while routes are registered
//! - Register diagnostics, static assets, controllers, remote routes,
//!   local aliases and redirects
//! - Freeze the registry and funnel every request into it
//! - Wire up middleware (request ID, timeout, tracing)
//! - Serve plain HTTP or TLS with graceful shutdown

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::controller::{Controller, ControllerRoute};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::InFlightCounter;
use crate::proxy::{upstream_client, ProxyError, ProxyTarget, RemoteRoute, UpstreamClient};
use crate::routing::router::replace_path;
use crate::routing::{handler_fn, PatternRegistry, RoutingError};

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("controller pattern and version can't be empty")]
    EmptyControllerParams,

    #[error("controller {0} has no methods")]
    EmptyController(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct Stats {
    #[serde(rename = "inProgressCounter")]
    in_progress_counter: usize,
}

/// The service's HTTP front: a pattern registry plus the shared state its
/// built-in routes need.
pub struct WebServer {
    registry: PatternRegistry,
    in_flight: InFlightCounter,
    client: UpstreamClient,
    controller_group: String,
    request_timeout: Duration,
}

impl WebServer {
    /// Create a server with the diagnostic routes and, when enabled, the
    /// static asset route already registered.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServerError> {
        let mut server = Self {
            registry: PatternRegistry::new(),
            in_flight: InFlightCounter::new(),
            client: upstream_client(Duration::from_secs(config.timeouts.connect_secs)),
            controller_group: config.controllers.group.clone(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        server.register_handler(&config.diagnostics.ping_path, |_req| async {
            "pong".into_response()
        })?;

        let counter = server.in_flight.clone();
        server.register_handler(&config.diagnostics.stats_path, move |_req| {
            let stats = Stats {
                in_progress_counter: counter.current(),
            };
            async move { axum::Json(stats).into_response() }
        })?;

        if config.assets.enabled {
            server.register_assets(&config.assets.url_prefix, &config.assets.directory)?;
        }

        Ok(server)
    }

    /// Register a plain handler. Re-registering a pattern replaces it.
    pub fn register_handler<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), ServerError>
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.registry.register(pattern, handler_fn(f))?;
        Ok(())
    }

    /// Serve files from `directory` under the prefix pattern `url_prefix`,
    /// with the prefix stripped before lookup.
    pub fn register_assets(&mut self, url_prefix: &str, directory: &str) -> Result<(), ServerError> {
        let files = ServeDir::new(directory);
        let strip = url_prefix.trim_end_matches('/').to_string();

        self.register_handler(url_prefix, move |mut request| {
            let files = files.clone();
            let strip = strip.clone();
            async move {
                let path = request.uri().path();
                let stripped = path.strip_prefix(strip.as_str()).unwrap_or(path).to_string();
                match replace_path(request.uri(), &stripped) {
                    Ok(uri) => *request.uri_mut() = uri,
                    Err(e) => {
                        tracing::warn!(path = %stripped, error = %e, "Asset path rewrite failed");
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                }
                match files.oneshot(request).await {
                    Ok(response) => response.map(Body::new),
                    Err(never) => match never {},
                }
            }
        })
    }

    /// Local route: requests to `pattern` are served as if they asked for `path`.
    pub fn register_local_route(&mut self, pattern: &str, path: &str) -> Result<(), ServerError> {
        self.registry.register_alias(pattern, path)?;
        Ok(())
    }

    /// Remote route: requests to `pattern` are forwarded to `target`.
    pub fn register_remote_route(&mut self, pattern: &str, target: &str) -> Result<(), ServerError> {
        let target = ProxyTarget::parse(target)?;
        tracing::info!(pattern = %pattern, upstream = %target.authority(), "Remote route registered");
        let route = RemoteRoute::new(pattern, target, self.client.clone());
        self.registry.register(pattern, route.into_handler())?;
        Ok(())
    }

    /// Answer `pattern` with a redirect to `location`.
    pub fn register_redirect(
        &mut self,
        pattern: &str,
        location: &str,
        status: u16,
    ) -> Result<(), ServerError> {
        let status = StatusCode::from_u16(status)
            .ok()
            .filter(StatusCode::is_redirection)
            .ok_or(RoutingError::InvalidRedirectStatus(status))?;
        if location.is_empty() {
            return Err(RoutingError::EmptyLocation.into());
        }

        let location = location.to_string();
        self.register_handler(pattern, move |_req| {
            let location = location.clone();
            async move { (status, [(header::LOCATION, location)]).into_response() }
        })
    }

    /// Mount `controller` under `/<group>/<version>/<pattern>/`.
    pub fn register_controller(
        &mut self,
        pattern: &str,
        version: &str,
        controller: Controller,
    ) -> Result<(), ServerError> {
        if pattern.is_empty() || version.is_empty() {
            return Err(ServerError::EmptyControllerParams);
        }
        if controller.is_empty() {
            return Err(ServerError::EmptyController(controller.name().to_string()));
        }

        let prefix = format!("/{}/{}/{}/", self.controller_group, version, pattern);
        tracing::info!(
            prefix = %prefix,
            controller = %controller.name(),
            methods = ?controller.method_names(),
            "Controller registered"
        );

        let route = ControllerRoute::new(controller, self.in_flight.clone());
        self.registry.register(&prefix, route.into_handler())?;
        Ok(())
    }

    pub fn in_flight(&self) -> &InFlightCounter {
        &self.in_flight
    }

    pub fn patterns(&self) -> Vec<&str> {
        self.registry.patterns()
    }

    /// Freeze the registry and build the axum application around it.
    #[allow(deprecated)]
    pub fn into_router(self) -> Router {
        let registry = Arc::new(self.registry);

        Router::new()
            .fallback(move |request: Request<Body>| {
                let registry = Arc::clone(&registry);
                async move { registry.dispatch(request).await }
            })
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.registry.len(), "HTTP server starting");

        let app = self.into_router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(address = %addr, routes = self.registry.len(), "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        let app = self.into_router().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
