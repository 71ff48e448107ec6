//! Upstream target parsing.

use url::Url;

use crate::proxy::ProxyError;

/// Where a remote route forwards to. Parsed once at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    scheme: String,
    authority: String,
    path: String,
    query: String,
}

impl ProxyTarget {
    /// Parse an upstream URL such as `http://localhost:9000/api?key=1`.
    ///
    /// Only `http` upstreams are accepted, and a host is required.
    pub fn parse(target: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: &str| ProxyError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http upstreams are supported"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            authority,
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `host[:port]`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query without the leading `?`; empty when absent.
    pub fn query(&self) -> &str {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_target() {
        let target = ProxyTarget::parse("http://localhost:9000/api/?key=1").unwrap();
        assert_eq!(target.scheme(), "http");
        assert_eq!(target.authority(), "localhost:9000");
        assert_eq!(target.path(), "/api/");
        assert_eq!(target.query(), "key=1");
    }

    #[test]
    fn test_default_port_and_path() {
        let target = ProxyTarget::parse("http://backend.internal").unwrap();
        assert_eq!(target.authority(), "backend.internal");
        assert_eq!(target.path(), "/");
        assert_eq!(target.query(), "");
    }

    #[test]
    fn test_malformed_targets_fail() {
        assert!(ProxyTarget::parse("not a url").is_err());
        assert!(ProxyTarget::parse("").is_err());
        assert!(ProxyTarget::parse("ftp://files.example.com/").is_err());
        assert!(ProxyTarget::parse("https://secure.example.com/").is_err());
    }
}
