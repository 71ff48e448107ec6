//! Per-call controller context.
//!
//! Everything a method needs about the current request travels in the
//! [`CallContext`] it receives by value. Controllers are shared between
//! concurrent requests and never hold request state themselves.

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{request::Parts, Extensions, HeaderMap, Method, Uri};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::controller::dispatcher::DispatchTarget;
use crate::http::response;

/// Failure reading the request body inside a method.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body already consumed")]
    Consumed,
    #[error("failed to read request body: {0}")]
    Read(#[from] axum::Error),
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request handles and positional arguments for one method call.
pub struct CallContext {
    parts: Parts,
    body: Option<Body>,
    target: DispatchTarget,
}

impl CallContext {
    pub fn new(parts: Parts, body: Body, target: DispatchTarget) -> Self {
        Self {
            parts,
            body: Some(body),
            target,
        }
    }

    /// Positional arguments following the method segment, in path order.
    pub fn args(&self) -> &[String] {
        &self.target.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.target.args.get(index).map(String::as_str)
    }

    /// Resolved method name, e.g. `List`.
    pub fn method_name(&self) -> &str {
        &self.target.method
    }

    pub fn target(&self) -> &DispatchTarget {
        &self.target
    }

    pub fn http_method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Buffer the request body, up to `limit` bytes. Can be taken once.
    pub async fn body_bytes(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        let body = self.body.take().ok_or(BodyError::Consumed)?;
        Ok(to_bytes(body, limit).await?)
    }

    /// Buffer and deserialize a JSON request body.
    pub async fn json_body<T: DeserializeOwned>(&mut self, limit: usize) -> Result<T, BodyError> {
        let bytes = self.body_bytes(limit).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Success envelope around `value`.
    pub fn json<T: Serialize>(&self, value: T) -> Response {
        response::json(value)
    }

    /// Error envelope with `message`.
    pub fn json_error(&self, message: impl std::fmt::Display) -> Response {
        response::json_error(message)
    }
}
