//! Convention-based controller dispatch.
//!
//! # URL shape
//! ```text
//! /<group>/<version>/<resource>/<method>[/<arg1>/<arg2>/...]
//!     → method name: <method> with its first character uppercased
//!     → args: every later segment, percent-decoded, as strings
//! ```
//!
//! A segment that does not percent-decode to valid UTF-8 rejects the
//! whole request; arguments are never lossily repaired.
//!
//! # Design Decisions
//! - The registry already matched `/<group>/<version>/<resource>/`; the
//!   dispatcher only validates the shape and reads the rest
//! - One trailing slash does not create an empty trailing argument
//! - Errors become a JSON envelope; nothing escapes to the transport
//! - Every dispatched request is counted in flight until it completes

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::controller::context::CallContext;
use crate::controller::table::Controller;
use crate::http::request::request_id;
use crate::http::response::json_error;
use crate::observability::{metrics, InFlightCounter};
use crate::routing::{handler_fn, Handler};

/// Dispatch failures, reported to the client as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("invalid number of params")]
    InvalidParamCount,
    #[error("method not found")]
    MethodNotFound,
    #[error("invalid path encoding")]
    InvalidEncoding,
}

/// A request path decomposed by the dispatch convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub group: String,
    pub version: String,
    pub resource: String,
    /// Capitalized method name.
    pub method: String,
    pub args: Vec<String>,
}

impl DispatchTarget {
    /// Split `path` into group, version, resource, method and args.
    pub fn parse(path: &str) -> Result<Self, DispatchError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let mut segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() > 4 && segments.last() == Some(&"") {
            segments.pop();
        }
        if segments.len() < 4 || segments[3].is_empty() {
            return Err(DispatchError::InvalidParamCount);
        }

        Ok(Self {
            group: decode(segments[0])?,
            version: decode(segments[1])?,
            resource: decode(segments[2])?,
            method: capitalize(&decode(segments[3])?),
            args: segments[4..].iter().map(|s| decode(s)).collect::<Result<_, _>>()?,
        })
    }
}

fn decode(segment: &str) -> Result<String, DispatchError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DispatchError::InvalidEncoding)
}

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Registry handler serving one controller.
#[derive(Clone)]
pub struct ControllerRoute {
    controller: Arc<Controller>,
    in_flight: InFlightCounter,
}

impl ControllerRoute {
    pub fn new(controller: Controller, in_flight: InFlightCounter) -> Self {
        Self {
            controller: Arc::new(controller),
            in_flight,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Decompose the path, look the method up and invoke it.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let _in_flight = self.in_flight.enter();
        let name = self.controller.name();
        let req_id = request_id(request.headers()).to_string();

        let target = match DispatchTarget::parse(request.uri().path()) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(request_id = %req_id, controller = %name, path = %request.uri().path(), error = %e, "Dispatch rejected");
                let outcome = match e {
                    DispatchError::InvalidEncoding => "invalid_encoding",
                    _ => "invalid_params",
                };
                metrics::record_dispatch(name, outcome, start);
                return json_error(e);
            }
        };

        let Some(method) = self.controller.get(&target.method).cloned() else {
            tracing::warn!(request_id = %req_id, controller = %name, method = %target.method, "Method not found");
            metrics::record_dispatch(name, "method_not_found", start);
            return json_error(DispatchError::MethodNotFound);
        };

        tracing::debug!(
            request_id = %req_id,
            controller = %name,
            method = %target.method,
            args = target.args.len(),
            "Invoking controller method"
        );

        let (parts, body) = request.into_parts();
        let response = method(CallContext::new(parts, body, target)).await;

        metrics::record_dispatch(name, "ok", start);
        response
    }

    pub fn into_handler(self) -> Handler {
        handler_fn(move |request| {
            let route = self.clone();
            async move { route.dispatch(request).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn target(path: &str) -> Result<DispatchTarget, DispatchError> {
        DispatchTarget::parse(path)
    }

    #[test]
    fn test_parse_method_and_args() {
        let t = target("/ws/v1/users/list/a/b/c").unwrap();
        assert_eq!(t.group, "ws");
        assert_eq!(t.version, "v1");
        assert_eq!(t.resource, "users");
        assert_eq!(t.method, "List");
        assert_eq!(t.args, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_without_args() {
        assert!(target("/ws/v1/users/List").unwrap().args.is_empty());
        assert!(target("/ws/v1/users/List/").unwrap().args.is_empty());
    }

    #[test]
    fn test_parse_keeps_inner_empty_args() {
        assert_eq!(target("/ws/v1/users/find/a//b").unwrap().args, vec!["a", "", "b"]);
    }

    #[test]
    fn test_parse_decodes_segments_after_splitting() {
        let t = target("/ws/v1/users/find/john%20doe/a%2Fb").unwrap();
        assert_eq!(t.args, vec!["john doe", "a/b"]);
    }

    #[test]
    fn test_invalid_utf8_segment_is_rejected() {
        assert_eq!(target("/ws/v1/users/find/%FF"), Err(DispatchError::InvalidEncoding));
        assert_eq!(target("/ws/v1/users/%C3%28"), Err(DispatchError::InvalidEncoding));
        assert_eq!(target("/ws/v1/users/find/%C3%A9").unwrap().args, vec!["é"]);
    }

    #[test]
    fn test_too_few_segments() {
        assert_eq!(target("/ws/v1/users"), Err(DispatchError::InvalidParamCount));
        assert_eq!(target("/ws/v1/users/"), Err(DispatchError::InvalidParamCount));
        assert_eq!(target("/ws/v1"), Err(DispatchError::InvalidParamCount));
        assert_eq!(target("/"), Err(DispatchError::InvalidParamCount));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("list"), "List");
        assert_eq!(capitalize("getById"), "GetById");
        assert_eq!(capitalize("List"), "List");
        assert_eq!(capitalize("élan"), "Élan");
        assert_eq!(capitalize(""), "");
    }

    async fn call(route: &ControllerRoute, path: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let res = route.dispatch(req).await;
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_invokes_method_with_args() {
        let route = ControllerRoute::new(
            Controller::new("users").method("Echo", |ctx: CallContext| async move {
                ctx.json(ctx.args().to_vec())
            }),
            InFlightCounter::new(),
        );

        let (status, body) = call(&route, "/ws/v1/users/echo/a/b/c").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"code":200,"value":["a","b","c"]}"#);
    }

    #[tokio::test]
    async fn test_dispatch_errors_are_json() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let counter = InFlightCounter::new();
        let route = ControllerRoute::new(
            Controller::new("users").method("List", move |_ctx| {
                c.fetch_add(1, Ordering::SeqCst);
                async { "ok".into_response() }
            }),
            counter.clone(),
        );

        let (status, body) = call(&route, "/ws/v1/users").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, r#"{"code":500,"value":"invalid number of params"}"#);

        let (_, body) = call(&route, "/ws/v1/users/missing").await;
        assert_eq!(body, r#"{"code":500,"value":"method not found"}"#);

        let (status, body) = call(&route, "/ws/v1/users/list/%FF").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, r#"{"code":500,"value":"invalid path encoding"}"#);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(counter.current(), 0);
    }
}
