//! Waypost - a prefix-routing reverse HTTP proxy
//!
//! Inbound requests are matched against an ordered registry of upstream services by
//! path prefix, rewritten for the selected upstream and forwarded to it. The upstream
//! response is streamed back to the caller unchanged.
//!
//! The main components are organized into the following modules:
//! - `upstream`: Upstream service descriptors and the immutable service registry
//! - `router`: Path-prefix matching against the registry
//! - `rewrite`: Turning an inbound request into the request sent upstream
//! - `forward`: The forwarding engine that talks to upstreams
//! - `service`: The hyper service tying routing, rewriting and forwarding together
//! - `server`: Listener, connection handling and graceful shutdown
//! - `config`: YAML configuration for the binary
//! - `error`: Error types shared by the modules above

pub mod config;
pub mod error;
pub mod forward;
pub mod rewrite;
pub mod router;
pub mod server;
pub mod service;
pub mod upstream;

pub use hyper;

/// Timeout applied uniformly to inbound header reads, HTTP/2 keep-alive pings, upstream
/// connects, upstream response heads, stalled bodies and idle pooled connections.
pub const RW_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
