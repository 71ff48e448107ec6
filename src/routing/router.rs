//! Pattern registry and request dispatch.
//!
//! # Responsibilities
//! - Store registered patterns and their targets
//! - Resolve the most specific pattern for a request path
//! - Follow local aliases back into the registry
//! - Return an explicit not-found response when nothing matches
//!
//! # Design Decisions
//! - Built during startup, then shared immutably (no locks on lookup)
//! - Exact patterns are a HashMap hit; prefix patterns are kept sorted
//!   longest-first so the first hit is the most specific one
//! - Re-registering a pattern replaces the previous target
//! - A path without its trailing slash is redirected when only the
//!   slashed prefix pattern exists

use axum::body::Body;
use axum::http::{header, uri::PathAndQuery, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::routing::matcher::Pattern;
use crate::routing::RoutingError;

/// Alias chains longer than this are treated as a loop.
pub const MAX_ALIAS_HOPS: usize = 8;

/// A type-erased request handler.
pub type Handler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// What a pattern leads to.
#[derive(Clone)]
pub enum RouteTarget {
    Handler(Handler),
    /// Rewrite the path and resolve again.
    Alias(String),
}

impl std::fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::Handler(_) => f.write_str("Handler"),
            RouteTarget::Alias(path) => f.debug_tuple("Alias").field(path).finish(),
        }
    }
}

/// Result of resolving a path.
#[derive(Debug)]
pub enum Resolution<'a> {
    Target {
        pattern: &'a str,
        target: &'a RouteTarget,
    },
    /// Permanent redirect to the given path.
    Redirect(String),
    NotFound,
}

/// Ordered mapping from URL pattern to route target.
#[derive(Default)]
pub struct PatternRegistry {
    exact: HashMap<String, RouteTarget>,
    /// Sorted by pattern length, longest first.
    prefixes: Vec<(Pattern, RouteTarget)>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `pattern`.
    pub fn register(&mut self, pattern: &str, handler: Handler) -> Result<(), RoutingError> {
        self.insert(Pattern::parse(pattern)?, RouteTarget::Handler(handler));
        Ok(())
    }

    /// Register a local alias: requests matching `pattern` are re-dispatched
    /// with their path replaced by `path`.
    pub fn register_alias(&mut self, pattern: &str, path: &str) -> Result<(), RoutingError> {
        let pattern = Pattern::parse(pattern)?;
        if !path.starts_with('/') || path.parse::<PathAndQuery>().is_err() {
            return Err(RoutingError::InvalidAliasTarget(path.to_string()));
        }
        self.insert(pattern, RouteTarget::Alias(path.to_string()));
        Ok(())
    }

    fn insert(&mut self, pattern: Pattern, target: RouteTarget) {
        tracing::debug!(pattern = %pattern, route = ?target, "Pattern registered");
        match pattern {
            Pattern::Exact(p) => {
                if self.exact.insert(p.clone(), target).is_some() {
                    tracing::debug!(pattern = %p, "Pattern replaced");
                }
            }
            prefix @ Pattern::Prefix(_) => {
                if let Some(slot) = self.prefixes.iter_mut().find(|(p, _)| *p == prefix) {
                    tracing::debug!(pattern = %prefix, "Pattern replaced");
                    slot.1 = target;
                    return;
                }
                self.prefixes.push((prefix, target));
                self.prefixes
                    .sort_by(|(a, _), (b, _)| b.as_str().len().cmp(&a.as_str().len()));
            }
        }
    }

    /// All registered patterns, exact ones first.
    pub fn patterns(&self) -> Vec<&str> {
        let mut exact: Vec<&str> = self.exact.keys().map(String::as_str).collect();
        exact.sort_unstable();
        exact.extend(self.prefixes.iter().map(|(p, _)| p.as_str()));
        exact
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `path` to the most specific registered target.
    pub fn resolve(&self, path: &str) -> Resolution<'_> {
        if let Some((pattern, target)) = self.exact.get_key_value(path) {
            return Resolution::Target { pattern, target };
        }

        if !path.ends_with('/') {
            let slashed = format!("{path}/");
            if self.prefixes.iter().any(|(p, _)| p.as_str() == slashed) {
                return Resolution::Redirect(slashed);
            }
        }

        self.prefixes
            .iter()
            .find(|(p, _)| p.matches(path))
            .map(|(pattern, target)| Resolution::Target {
                pattern: pattern.as_str(),
                target,
            })
            .unwrap_or(Resolution::NotFound)
    }

    /// Serve a request through the registry.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Response {
        for _ in 0..=MAX_ALIAS_HOPS {
            let path = request.uri().path().to_string();
            let handler = match self.resolve(&path) {
                Resolution::Target {
                    target: RouteTarget::Handler(handler),
                    pattern,
                } => {
                    tracing::trace!(path = %path, pattern = %pattern, "Route resolved");
                    handler.clone()
                }
                Resolution::Target {
                    target: RouteTarget::Alias(alias),
                    pattern,
                } => {
                    tracing::debug!(path = %path, pattern = %pattern, alias = %alias, "Following local alias");
                    match replace_path(request.uri(), alias) {
                        Ok(uri) => *request.uri_mut() = uri,
                        Err(e) => {
                            tracing::error!(alias = %alias, error = %e, "Alias rewrite failed");
                            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                        }
                    }
                    continue;
                }
                Resolution::Redirect(location) => {
                    let location = match request.uri().query() {
                        Some(q) => format!("{location}?{q}"),
                        None => location,
                    };
                    return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
                }
                Resolution::NotFound => {
                    tracing::debug!(path = %path, "No route matched");
                    return (StatusCode::NOT_FOUND, "404 page not found\n").into_response();
                }
            };
            return handler(request).await;
        }

        tracing::warn!(path = %request.uri().path(), "Alias loop detected");
        (StatusCode::LOOP_DETECTED, "alias loop detected\n").into_response()
    }
}

/// Copy of `uri` with its path replaced and its query kept.
pub fn replace_path(uri: &Uri, path: &str) -> Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>()?);
    Ok(Uri::from_parts(parts)?)
}
