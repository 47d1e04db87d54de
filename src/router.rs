//! Path-prefix routing.
//!
//! The first upstream, in registration order, whose gateway prefix is a literal prefix
//! of the request path wins. There is no longest-prefix preference. Comparison is
//! byte-exact: case-sensitive, no percent-decoding and no trailing-slash handling.
//! Register more specific prefixes before more general ones.

use tracing::debug;

use crate::{
    error::ProxyError,
    upstream::{Registry, Upstream},
};

impl Registry {
    /// Finds the upstream responsible for `path`.
    pub fn route(&self, path: &str) -> Result<&Upstream, ProxyError> {
        for (i, service) in self.services().iter().enumerate() {
            if path.starts_with(service.gateway_prefix.as_str()) {
                debug!("Service {} ({}) matched path {}", i, service.name, path);
                return Ok(service);
            }
        }

        Err(ProxyError::RouteNotFound {
            path: path.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::upstream::UpstreamService;

    use super::*;

    fn registry(entries: &[(&str, &str)]) -> Registry {
        Registry::new(entries.iter().enumerate().map(|(i, (name, prefix))| {
            UpstreamService::new(*name, *prefix, format!("http://localhost:{}", 9000 + i))
        }))
        .unwrap()
    }

    #[test]
    fn matches_registered_prefix() {
        let registry = registry(&[("service1", "/service1"), ("service2", "/service2")]);
        assert_eq!(registry.route("/service1/ping").unwrap().name, "service1");
        assert_eq!(registry.route("/service2/ping").unwrap().name, "service2");
        assert_eq!(registry.route("/service2").unwrap().name, "service2");
    }

    #[test]
    fn unmatched_path_is_not_found() {
        let registry = registry(&[("service1", "/service1"), ("service2", "/service2")]);
        let err = registry.route("/service3/ping").unwrap_err();
        assert!(matches!(err, ProxyError::RouteNotFound { ref path } if path == "/service3/ping"));
        assert!(registry.route("/").is_err());
    }

    #[test]
    fn first_registered_wins_over_longer_prefix() {
        let general_first = registry(&[("a", "/a"), ("ab", "/ab")]);
        assert_eq!(general_first.route("/ab/x").unwrap().name, "a");

        let specific_first = registry(&[("ab", "/ab"), ("a", "/a")]);
        assert_eq!(specific_first.route("/ab/x").unwrap().name, "ab");
        assert_eq!(specific_first.route("/a/x").unwrap().name, "a");
    }

    #[test]
    fn matching_is_byte_exact() {
        let registry = registry(&[("service1", "/service1")]);
        assert!(registry.route("/SERVICE1/ping").is_err());
        assert!(registry.route("/%73ervice1/ping").is_err());
        // no segment boundary check
        assert_eq!(registry.route("/service1extra").unwrap().name, "service1");
    }

    #[test]
    fn trailing_slash_prefix_is_not_normalized() {
        let registry = registry(&[("slash", "/api/")]);
        assert!(registry.route("/api").is_err());
        assert_eq!(registry.route("/api/users").unwrap().name, "slash");
    }
}
