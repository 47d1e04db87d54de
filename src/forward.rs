//! Forwarding engine.
//!
//! Executes rewritten requests against upstreams and hands the upstream response back
//! with its body still streaming. Routing and rewriting only see the [`Forward`] trait,
//! so the client behind it can be replaced (tests use recording fakes).

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use futures::future::BoxFuture;
use http::{
    HeaderMap, HeaderName, Request, Response,
    header::{
        CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
        UPGRADE,
    },
};
use http_body_util::{BodyExt as _, combinators::BoxBody};
use hyper::body::{Body, Bytes, Frame, SizeHint};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::time::Sleep;
use tracing::debug;

use crate::{
    RW_TIMEOUT,
    error::{BoxError, TransportError},
};

/// Body type for both directions of a proxied exchange.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// Headers that only describe the connection they arrived on.
const HOP_BY_HOP_HEADERS: &[&str] = &["keep-alive", "proxy-connection"];

/// Sends a rewritten request upstream and returns the upstream response.
///
/// Implementations must relay HTTP error statuses as responses and reserve
/// [`TransportError`] for failures to obtain a response at all.
pub trait Forward: Send + Sync + 'static {
    fn forward(
        &self,
        request: Request<ProxyBody>,
    ) -> BoxFuture<'static, Result<Response<ProxyBody>, TransportError>>;
}

/// Pooled HTTP/1.1 forwarder backed by the hyper-util client.
///
/// Speaks plain HTTP or HTTPS depending on the target scheme, verifying upstream
/// certificates against the webpki roots. Pooled connections are keyed by upstream
/// authority, so a slow upstream only ties up its own connections.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>, ProxyBody>,
    /// Bound on connecting, on waiting for the response head and on body stalls
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new() -> Self {
        Self::with_timeout(RW_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(timeout));
        http.set_nodelay(true);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(timeout)
            .http1_preserve_header_case(true)
            .http1_title_case_headers(true)
            .build(connector);

        Self { client, timeout }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forward for HttpForwarder {
    fn forward(
        &self,
        mut request: Request<ProxyBody>,
    ) -> BoxFuture<'static, Result<Response<ProxyBody>, TransportError>> {
        strip_hop_by_hop(request.headers_mut());

        let client = self.client.clone();
        let timeout = self.timeout;
        let request = request.map(|body| IdleTimeout::new(body, timeout).boxed());
        Box::pin(async move {
            debug!("Sending request to upstream: {} {}", request.method(), request.uri());

            let response = match tokio::time::timeout(timeout, client.request(request)).await {
                Ok(response) => response?,
                Err(_) => return Err(TransportError::Timeout(timeout)),
            };

            let (mut parts, body) = response.into_parts();
            debug!("Received response from upstream: {}", parts.status);
            strip_hop_by_hop(&mut parts.headers);

            Ok(Response::from_parts(parts, IdleTimeout::new(body, timeout).boxed()))
        })
    }
}

/// Body that fails with [`TransportError::Idle`] once the inner body has kept the reader
/// waiting for `timeout` without producing a frame.
///
/// The clock only runs while a poll is pending and restarts after every frame.
pub struct IdleTimeout<B> {
    inner: B,
    timeout: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<B> IdleTimeout<B> {
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            sleep: None,
        }
    }
}

impl<B> Body for IdleTimeout<B>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(frame) => {
                this.sleep = None;
                Poll::Ready(frame.map(|frame| frame.map_err(Into::into)))
            }
            Poll::Pending => {
                let timeout = this.timeout;
                let sleep = this
                    .sleep
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                ready!(sleep.as_mut().poll(cx));
                Poll::Ready(Some(Err(TransportError::Idle(timeout).into())))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Removes hop-by-hop headers, including any header named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in [
        CONNECTION,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}
