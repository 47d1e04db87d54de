//! Error types for the proxy.
//!
//! Configuration errors are fatal and surface at startup. Everything that can go wrong
//! while serving a single request is a [`ProxyError`], which the service converts into a
//! response at the request boundary.

use std::time::Duration;

use http::{StatusCode, Uri};
use thiserror::Error;

/// Boxed error used for request and response bodies flowing through the proxy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An upstream service descriptor that cannot be registered.
#[derive(Debug, Error)]
#[error("invalid configuration for service {service}: {reason}")]
pub struct ConfigurationError {
    /// Name of the offending service
    pub service: String,
    /// What is wrong with it
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to obtain a response from an upstream at the transport level.
///
/// HTTP error statuses returned by a reachable upstream are not transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, protocol or I/O failure reported by the HTTP client
    #[error("upstream request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    /// The upstream did not produce a response head in time
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// A body being relayed produced no data in time
    #[error("body stalled for {0:?}")]
    Idle(Duration),
}

/// Per-request failures, each mapped onto a status code for the caller.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No registered gateway prefix matches the request path
    #[error("no upstream registered for path {path}")]
    RouteNotFound { path: String },

    /// The rewritten request could not be built
    #[error("cannot build request for upstream {service}: {source}")]
    Rewrite {
        service: String,
        #[source]
        source: http::Error,
    },

    /// The matched upstream could not be reached or failed mid-exchange
    #[error("upstream {service} ({target}) failed for path {path}: {source}")]
    UpstreamTransport {
        service: String,
        target: Uri,
        path: String,
        #[source]
        source: TransportError,
    },
}

impl ProxyError {
    /// Status code reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::Rewrite { .. } | ProxyError::UpstreamTransport { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
