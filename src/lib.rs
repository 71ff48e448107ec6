//! microserve: a small HTTP micro-service scaffold.
//!
//! Requests are resolved by a pattern registry to local handlers,
//! convention-dispatched controller methods, reverse-proxied upstreams,
//! aliases, redirects or static files. Controllers reach databases
//! through a named connection registry whose rows decode cell by cell.

pub mod config;
pub mod controller;
pub mod db;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::ServiceConfig;
pub use controller::{CallContext, Controller};
pub use http::WebServer;
pub use lifecycle::Shutdown;
