//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use microserve::config::ServiceConfig;
use microserve::db::{Cell, ConnectionConfig, DbError, Driver, Param, QueryOutcome, ResultSet, Session};
use microserve::{Shutdown, WebServer};

/// Defaults with static assets off, so tests don't depend on `./includes`.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.assets.enabled = false;
    config
}

/// Serve `server` on an ephemeral port until the returned handle is triggered.
pub async fn start_server(server: WebServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

/// Upstream that answers every request with a JSON description of what it
/// received: method, path, query and all header values.
pub async fn start_echo_upstream() -> SocketAddr {
    let app = Router::new().fallback(|request: Request<Body>| async move {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in request.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_str().unwrap_or_default().to_string());
        }
        Json(json!({
            "method": request.method().as_str(),
            "path": request.uri().path(),
            "query": request.uri().query(),
            "headers": headers,
        }))
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub async fn get_json(url: &str) -> (u16, Value) {
    let res = client().get(url).send().await.unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

/// Build a result set from text columns; `None` is NULL.
pub fn result_set(columns: &[&str], rows: &[&[Option<&str>]]) -> ResultSet {
    let mut set = ResultSet::new(columns.iter().map(|c| c.to_string()).collect());
    for row in rows {
        set.rows.push(row.iter().map(|v| Cell::from(*v)).collect());
    }
    set
}

/// In-memory session answering statements from a fixed table.
#[derive(Clone, Default)]
pub struct MemorySession {
    answers: Arc<HashMap<String, QueryOutcome>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn run(&self, statement: &str, _params: &[Param]) -> Result<QueryOutcome, DbError> {
        self.answers
            .get(statement)
            .cloned()
            .ok_or_else(|| DbError::Statement(format!("unknown statement: {statement}")))
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Driver whose sessions share one answer table. Hosts named `down`
/// refuse to connect.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    answers: HashMap<String, QueryOutcome>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default().answer("SELECT 1", QueryOutcome::Rows(vec![result_set(&["?column?"], &[&[Some("1")]])]))
    }

    pub fn answer(mut self, statement: &str, outcome: QueryOutcome) -> Self {
        self.answers.insert(statement.to_string(), outcome);
        self
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
        if config.host == "down" {
            return Err(DbError::Open {
                name: config.name.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Arc::new(MemorySession {
            answers: Arc::new(self.answers.clone()),
        }))
    }
}
