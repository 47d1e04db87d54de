//! Dummy upstream for trying out the proxy by hand.
//!
//! `cargo run --example demo-backend -- 8003` listens on `localhost:8003` (default 8002),
//! answers `pong` on `/ping` and a greeting everywhere else.

use std::convert::Infallible;

use anyhow::Context as _;
use http::{Request, Response};
use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

async fn respond(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    info!(
        "New request received: host={:?}, path={}",
        req.headers().get(http::header::HOST),
        req.uri().path()
    );
    info!("headers: {:?}", req.headers());

    let body = if req.uri().path() == "/ping" {
        "pong"
    } else {
        "hello from demo backend"
    };
    Ok(Response::new(Full::new(Bytes::from(body))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let port: u16 = match std::env::args().nth(1) {
        Some(port) => port.parse().context("invalid port number")?,
        None => 8002,
    };

    let listener = TcpListener::bind(("localhost", port)).await?;
    info!("demo backend listening on port {}", port);

    loop {
        let (stream, from) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(respond))
                .await
            {
                error!("Error serving connection from {}: {}", from, e);
            }
        });
    }
}
