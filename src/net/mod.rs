//! Network layer subsystem.
//!
//! Plain TCP accept and connection handling belong to axum/hyper; TLS
//! termination goes through `axum-server` with the rustls config built
//! in `tls.rs`.

pub mod tls;

pub use tls::{load_tls_config, TlsError};
