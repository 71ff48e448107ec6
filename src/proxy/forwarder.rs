//! Forwarding of rewritten requests to the upstream.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http::request::request_id;
use crate::observability::metrics;
use crate::proxy::director::direct;
use crate::proxy::headers::strip_hop_by_hop;
use crate::proxy::target::ProxyTarget;
use crate::routing::{handler_fn, Handler};

/// Shared HTTP/1.1 client used by every remote route.
pub type UpstreamClient = Client<HttpConnector, Body>;

pub fn upstream_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// A registered remote route: one pattern, one upstream.
#[derive(Clone)]
pub struct RemoteRoute {
    pattern: Arc<str>,
    target: Arc<ProxyTarget>,
    client: UpstreamClient,
}

impl RemoteRoute {
    pub fn new(pattern: &str, target: ProxyTarget, client: UpstreamClient) -> Self {
        Self {
            pattern: Arc::from(pattern),
            target: Arc::new(target),
            client,
        }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub async fn forward(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let req_id = request_id(request.headers()).to_string();
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (mut parts, body) = request.into_parts();
        let inbound_path = parts.uri.path().to_string();

        if let Err(e) = direct(&self.target, &mut parts, client) {
            tracing::error!(request_id = %req_id, route = %self.pattern, error = %e, "Request rewrite failed");
            metrics::record_proxy(&self.pattern, StatusCode::BAD_GATEWAY.as_u16(), start);
            return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
        }

        tracing::debug!(
            request_id = %req_id,
            route = %self.pattern,
            path = %inbound_path,
            upstream = %parts.uri,
            "Forwarding request"
        );

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let status = response.status();
                metrics::record_proxy(&self.pattern, status.as_u16(), start);

                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(
                    request_id = %req_id,
                    route = %self.pattern,
                    upstream = %self.target.authority(),
                    error = %e,
                    "Upstream request failed"
                );
                metrics::record_proxy(&self.pattern, StatusCode::BAD_GATEWAY.as_u16(), start);
                (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
            }
        }
    }

    pub fn into_handler(self) -> Handler {
        handler_fn(move |request| {
            let route = self.clone();
            async move { route.forward(request).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ProxyTarget::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let route = RemoteRoute::new("/svc/", target, upstream_client(Duration::from_secs(1)));

        let req = Request::builder().uri("/svc/x").body(Body::empty()).unwrap();
        let res = route.forward(req).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
