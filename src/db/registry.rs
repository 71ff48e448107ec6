//! Named connection registry.
//!
//! # Responsibilities
//! - Map a logical connection name to its configuration
//! - Own the live session opened for that name
//! - Hand out sessions to the query executor
//!
//! # Concurrency
//! Entries live in a `DashMap`, so every per-name read or write is atomic.
//! `open` connects without holding a shard lock and installs the session
//! afterwards; when two opens race on the same name the last one to
//! finish wins and the session it replaces is closed.

use dashmap::DashMap;
use std::sync::Arc;

use crate::db::driver::{ConnectionConfig, Driver, Session};
use crate::db::error::DbError;

struct ConnectionEntry {
    config: ConnectionConfig,
    session: Option<Arc<dyn Session>>,
}

/// Process-wide registry of database connections, owned by the service
/// and shared through `Arc`.
pub struct ConnectionRegistry {
    driver: Arc<dyn Driver>,
    entries: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            entries: DashMap::new(),
        }
    }

    /// Register or replace a configuration. A replaced entry's session is
    /// dropped without being closed first; call [`close`](Self::close) for that.
    pub fn add(&self, config: ConnectionConfig) {
        tracing::debug!(connection = %config.name, host = %config.host, "Connection registered");
        self.entries.insert(
            config.name.clone(),
            ConnectionEntry {
                config,
                session: None,
            },
        );
    }

    /// Connect the named configuration and store the live session.
    pub async fn open(&self, name: &str) -> Result<Arc<dyn Session>, DbError> {
        let config = self
            .config(name)
            .ok_or_else(|| DbError::ConnectionNotFound(name.to_string()))?;

        let session = self.driver.connect(&config).await?;

        let replaced = self
            .entries
            .get_mut(name)
            .map(|mut entry| entry.session.replace(session.clone()));
        let Some(replaced) = replaced else {
            // Removed while connecting; nothing to attach to.
            retire(name, session, "orphaned").await;
            return Err(DbError::ConnectionNotFound(name.to_string()));
        };
        if let Some(old) = replaced {
            retire(name, old, "replaced").await;
        }

        tracing::info!(connection = %name, host = %config.host, database = %config.database, "Connection opened");
        Ok(session)
    }

    /// `add` followed by `open`.
    pub async fn add_and_open(&self, config: ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
        let name = config.name.clone();
        self.add(config);
        self.open(&name).await
    }

    /// Close and clear the live session. Unknown or unopened names are a no-op.
    pub async fn close(&self, name: &str) -> Result<(), DbError> {
        let session = self
            .entries
            .get_mut(name)
            .and_then(|mut entry| entry.session.take());
        match session {
            Some(session) => {
                session.close().await?;
                tracing::info!(connection = %name, "Connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Close every open session.
    pub async fn close_all(&self) {
        for name in self.names() {
            if let Err(e) = self.close(&name).await {
                tracing::warn!(connection = %name, error = %e, "Failed to close connection");
            }
        }
    }

    /// Live session for `name`.
    pub fn session(&self, name: &str) -> Result<Arc<dyn Session>, DbError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| DbError::ConnectionNotFound(name.to_string()))?;
        entry
            .session
            .clone()
            .ok_or_else(|| DbError::ConnectionNotOpen(name.to_string()))
    }

    pub fn config(&self, name: &str) -> Option<ConnectionConfig> {
        self.entries.get(name).map(|e| e.config.clone())
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.session.is_some())
            .unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Close a session nothing refers to any more; failures are only logged.
async fn retire(name: &str, session: Arc<dyn Session>, role: &'static str) {
    if let Err(e) = session.close().await {
        tracing::warn!(connection = %name, error = %e, session = role, "Failed to close {role} session");
    }
}
