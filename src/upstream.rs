//! Upstream service descriptors and the registry they are kept in.

use std::{collections::HashSet, sync::Arc};

use http::{
    Uri,
    uri::{Authority, Scheme},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigurationError;

/// Unvalidated description of one upstream, as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamService {
    /// Identifier used in log messages
    pub name: String,
    /// Path prefix selecting this upstream, e.g. `/service1`
    pub gateway_prefix: String,
    /// Absolute base URL of the upstream, e.g. `http://localhost:8002`
    pub target: String,
}

impl UpstreamService {
    pub fn new(
        name: impl Into<String>,
        gateway_prefix: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            gateway_prefix: gateway_prefix.into(),
            target: target.into(),
        }
    }
}

/// A registered upstream whose target URL has been parsed and validated.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub name: String,
    pub gateway_prefix: String,
    /// The target URL as configured
    pub target: Uri,
    scheme: Scheme,
    authority: Authority,
    /// Target path without trailing slashes, empty when the target has no base path
    base_path: String,
}

impl Upstream {
    /// Validates a descriptor, failing when its target is not an absolute `http` URL.
    pub fn try_from_service(service: UpstreamService) -> Result<Self, ConfigurationError> {
        let UpstreamService {
            name,
            gateway_prefix,
            target,
        } = service;

        if gateway_prefix.is_empty() {
            return Err(ConfigurationError::new(name, "gateway prefix is empty"));
        }

        let target: Uri = match target.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return Err(ConfigurationError::new(
                    name,
                    format!("invalid target URL {target:?}: {e}"),
                ));
            }
        };

        let (Some(scheme), Some(authority)) = (target.scheme(), target.authority()) else {
            return Err(ConfigurationError::new(
                name,
                format!("target URL {target} is not absolute"),
            ));
        };

        if *scheme != Scheme::HTTP && *scheme != Scheme::HTTPS {
            return Err(ConfigurationError::new(
                name,
                format!("unsupported scheme {scheme} in target URL {target}"),
            ));
        }

        Ok(Self {
            scheme: scheme.clone(),
            authority: authority.clone(),
            base_path: target.path().trim_end_matches('/').to_owned(),
            target,
            name,
            gateway_prefix,
        })
    }

    #[inline]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    #[inline]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    #[inline]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// Ordered, immutable collection of upstreams.
///
/// Registration order is match priority. Cloning is cheap and clones share the
/// same entries, so every connection task can hold its own handle.
#[derive(Debug, Clone)]
pub struct Registry {
    services: Arc<[Upstream]>,
}

impl Registry {
    /// Validates every descriptor and builds the registry.
    ///
    /// Fails on the first invalid target URL, empty prefix or repeated prefix.
    pub fn new(
        services: impl IntoIterator<Item = UpstreamService>,
    ) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut registered = Vec::new();

        for service in services {
            let upstream = Upstream::try_from_service(service)?;
            if !seen.insert(upstream.gateway_prefix.clone()) {
                return Err(ConfigurationError::new(
                    upstream.name,
                    format!(
                        "gateway prefix {} is already registered",
                        upstream.gateway_prefix
                    ),
                ));
            }
            info!(
                "Register handler for upstream {}, prefix {}",
                upstream.name, upstream.gateway_prefix
            );
            registered.push(upstream);
        }

        Ok(Self {
            services: registered.into(),
        })
    }

    pub fn services(&self) -> &[Upstream] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keeps_registration_order() {
        let registry = Registry::new([
            UpstreamService::new("service1", "/service1", "http://localhost:8002"),
            UpstreamService::new("service2", "/service2", "http://localhost:8003"),
        ])
        .unwrap();

        let names: Vec<_> = registry.services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["service1", "service2"]);
        assert_eq!(registry.services()[1].authority().as_str(), "localhost:8003");
        assert_eq!(registry.services()[1].scheme(), &Scheme::HTTP);
    }

    #[test]
    fn unparsable_target_names_service() {
        let err = Registry::new([
            UpstreamService::new("good", "/good", "http://localhost:8002"),
            UpstreamService::new("broken", "/broken", "http://exa mple.com"),
        ])
        .unwrap_err();
        assert_eq!(err.service, "broken");
    }

    #[test]
    fn relative_target_is_rejected() {
        let err = Registry::new([UpstreamService::new("rel", "/rel", "/just/a/path")])
            .unwrap_err();
        assert_eq!(err.service, "rel");
        assert!(err.reason.contains("not absolute"));

        let err = Registry::new([UpstreamService::new("bare", "/bare", "localhost:8002")])
            .unwrap_err();
        assert_eq!(err.service, "bare");
    }

    #[test]
    fn https_target_is_accepted() {
        let registry =
            Registry::new([UpstreamService::new("tls", "/tls", "https://example.com:8443/api")])
                .unwrap();
        let upstream = &registry.services()[0];
        assert_eq!(*upstream.scheme(), Scheme::HTTPS);
        assert_eq!(upstream.authority().as_str(), "example.com:8443");
        assert_eq!(upstream.base_path(), "/api");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = Registry::new([UpstreamService::new("files", "/files", "ftp://example.com")])
            .unwrap_err();
        assert_eq!(err.service, "files");
        assert!(err.reason.contains("unsupported scheme"));
    }

    #[test]
    fn empty_and_duplicate_prefixes_are_rejected() {
        let err = Registry::new([UpstreamService::new("empty", "", "http://localhost:1")])
            .unwrap_err();
        assert_eq!(err.service, "empty");

        let err = Registry::new([
            UpstreamService::new("first", "/api", "http://localhost:1"),
            UpstreamService::new("second", "/api", "http://localhost:2"),
        ])
        .unwrap_err();
        assert_eq!(err.service, "second");
    }

    #[test]
    fn base_path_drops_trailing_slashes() {
        let registry = Registry::new([
            UpstreamService::new("root", "/root", "http://localhost:8002/"),
            UpstreamService::new("nested", "/nested", "http://localhost:8003/api/v1/"),
        ])
        .unwrap();
        assert_eq!(registry.services()[0].base_path(), "");
        assert_eq!(registry.services()[1].base_path(), "/api/v1");
    }

    #[test]
    fn unreachable_target_is_still_valid() {
        let registry =
            Registry::new([UpstreamService::new("down", "/down", "http://127.0.0.1:1")]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
