//! Inbound-to-outbound request rewriting.
//!
//! The director is a pure function over request parts: it retargets the
//! URI at the upstream and applies the forwarding header policy. Sending
//! is the forwarder's job.

use axum::http::request::Parts;
use axum::http::uri::{self, Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderValue, Uri};
use std::net::SocketAddr;

use crate::proxy::headers::{self, X_FORWARDED_HOST, X_ORIGIN_HOST};
use crate::proxy::target::ProxyTarget;
use crate::proxy::ProxyError;

/// Join two path pieces with exactly one `/` between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Target query first, then the inbound one.
pub fn merge_query(target: &str, inbound: &str) -> String {
    if target.is_empty() || inbound.is_empty() {
        format!("{target}{inbound}")
    } else {
        format!("{target}&{inbound}")
    }
}

/// Rewrite `parts` so the request goes to `target`.
pub fn direct(
    target: &ProxyTarget,
    parts: &mut Parts,
    client: Option<SocketAddr>,
) -> Result<(), ProxyError> {
    let inbound_host = parts
        .headers
        .get(header::HOST)
        .cloned()
        .or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

    let path = single_joining_slash(target.path(), parts.uri.path());
    let query = merge_query(target.query(), parts.uri.query().unwrap_or_default());
    let path_and_query = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };

    let mut rewritten = uri::Parts::default();
    rewritten.scheme = Some(Scheme::HTTP);
    rewritten.authority = Some(Authority::try_from(target.authority()).map_err(|e| {
        ProxyError::Rewrite(format!("authority {}: {e}", target.authority()))
    })?);
    rewritten.path_and_query = Some(
        PathAndQuery::try_from(path_and_query.as_str())
            .map_err(|e| ProxyError::Rewrite(format!("path {path_and_query}: {e}")))?,
    );
    parts.uri = Uri::from_parts(rewritten).map_err(|e| ProxyError::Rewrite(e.to_string()))?;

    headers::strip_hop_by_hop(&mut parts.headers);

    if !parts.headers.contains_key(header::USER_AGENT) {
        parts
            .headers
            .insert(header::USER_AGENT, HeaderValue::from_static(""));
    }

    if let Some(host) = inbound_host {
        parts.headers.append(&X_FORWARDED_HOST, host);
    }
    if let Ok(origin) = HeaderValue::from_str(target.authority()) {
        parts.headers.append(&X_ORIGIN_HOST, origin);
    }
    if let Some(addr) = client {
        headers::append_forwarded_for(&mut parts.headers, addr.ip());
    }

    Ok(())
}
