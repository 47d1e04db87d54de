//! The proxy's hyper service.
//!
//! Every request is routed against the registry, rewritten for the matched upstream and
//! handed to the forwarding engine. No error escapes this boundary: unmatched paths are
//! answered with `404 Not Found`, transport failures with `502 Bad Gateway`.

use std::{convert::Infallible, net::SocketAddr, pin::Pin, sync::Arc};

use futures::future::{self, BoxFuture};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt as _, Empty};
use hyper::{
    body::{Body, Bytes, Incoming},
    service::Service as HyperService,
};
use tracing::{debug, error, info};

use crate::{
    error::{BoxError, ProxyError},
    forward::{Forward, HttpForwarder, ProxyBody},
    rewrite::rewrite,
    upstream::Registry,
};

/// Routes, rewrites and forwards requests for one connection.
///
/// The server clones one instance per accepted connection and records the peer
/// address on the clone. Clones share the registry and the forwarder.
pub struct ProxyService<F = HttpForwarder> {
    registry: Registry,
    forwarder: Arc<F>,
    /// Address of the connected client, if known
    pub from: Option<SocketAddr>,
}

impl<F> Clone for ProxyService<F> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            forwarder: self.forwarder.clone(),
            from: self.from,
        }
    }
}

impl<F: Forward> ProxyService<F> {
    pub fn new(registry: Registry, forwarder: F) -> Self {
        info!("Creating proxy service with {} upstreams", registry.len());
        Self {
            registry,
            forwarder: Arc::new(forwarder),
            from: None,
        }
    }

    /// Returns a handle for a connection from `from`.
    pub fn with_peer(&self, from: SocketAddr) -> Self {
        let mut service = self.clone();
        service.from = Some(from);
        service
    }

    /// Handles one request, always producing a response.
    pub fn handle<B>(&self, request: Request<B>) -> BoxFuture<'static, Response<ProxyBody>>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let path = request.uri().path().to_owned();
        debug!(
            "Received request: {} {} from {:?}",
            request.method(),
            request.uri(),
            self.from
        );

        let service = match self.registry.route(&path) {
            Ok(service) => service,
            Err(e) => {
                info!("{}", e);
                return Box::pin(future::ready(empty_response(e.status())));
            }
        };
        let name = service.name.clone();
        let target = service.target.clone();

        let request = request.map(|body| body.map_err(Into::<BoxError>::into).boxed());
        let outbound = match rewrite(service, request) {
            Ok(outbound) => outbound,
            Err(source) => {
                let e = ProxyError::Rewrite {
                    service: name,
                    source,
                };
                error!("{}", e);
                return Box::pin(future::ready(empty_response(e.status())));
            }
        };

        let forwarding = self.forwarder.forward(outbound);
        Box::pin(async move {
            match forwarding.await {
                Ok(response) => {
                    debug!("Relaying {} from {} for {}", response.status(), name, path);
                    response
                }
                Err(source) => {
                    let e = ProxyError::UpstreamTransport {
                        service: name,
                        target,
                        path,
                        source,
                    };
                    error!("{}", e);
                    empty_response(e.status())
                }
            }
        })
    }
}

impl<F: Forward> HyperService<Request<Incoming>> for ProxyService<F> {
    type Response = Response<ProxyBody>;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = self.handle(req);
        Box::pin(async move { Ok(response.await) })
    }
}

/// Response with the given status and no body.
pub fn empty_response(status: StatusCode) -> Response<ProxyBody> {
    let mut response = Response::new(
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}
