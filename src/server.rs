use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::{Context as _, Result};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::{conn::auto::Builder, graceful::GracefulShutdown},
};
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
    RW_TIMEOUT,
    forward::{Forward, HttpForwarder},
    service::ProxyService,
    upstream::Registry,
};

/// How long in-flight connections may keep running after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// HTTP server that accepts connections and hands them to the proxy service.
///
/// This struct owns the TCP listener and the proxy service that every accepted
/// connection is served with.
pub struct ProxyServer<F = HttpForwarder> {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    /// The service every connection is served with
    service: ProxyService<F>,
    /// How long connections may drain after shutdown is requested
    grace: Duration,
}

impl ProxyServer<HttpForwarder> {
    /// Binds `addr` and prepares to forward with a pooled HTTP client.
    ///
    /// # Arguments
    ///
    /// * `addr` - The `host:port` to listen on
    /// * `registry` - The upstreams requests are routed to
    pub async fn bind(addr: impl ToSocketAddrs, registry: Registry) -> Result<Self> {
        Self::bind_with(addr, registry, HttpForwarder::new()).await
    }
}

impl<F: Forward> ProxyServer<F> {
    /// Binds `addr` and forwards through the given engine.
    pub async fn bind_with(
        addr: impl ToSocketAddrs,
        registry: Registry,
        forwarder: F,
    ) -> Result<Self> {
        let connection = TcpListener::bind(addr)
            .await
            .context("failed to bind proxy listener")?;

        Ok(Self {
            connection,
            service: ProxyService::new(registry, forwarder),
            grace: SHUTDOWN_GRACE,
        })
    }

    /// Replaces [`SHUTDOWN_GRACE`] as the drain period after shutdown.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    /// Serves until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves connections until `shutdown` resolves, then drains them.
    ///
    /// After `shutdown` the listener is closed and live connections are told to finish
    /// their current request and close. Connection tasks still running when the grace
    /// period runs out are aborted, which closes their sockets.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("proxy server started on: {}", self.local_addr()?);

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(RW_TIMEOUT);
        builder
            .http2()
            .timer(TokioTimer::new())
            .keep_alive_interval(RW_TIMEOUT)
            .keep_alive_timeout(RW_TIMEOUT);

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.connection.accept() => {
                    let (stream, from) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted new connection from {}", from);

                    let connection = builder
                        .serve_connection(TokioIo::new(stream), self.service.with_peer(from))
                        .into_owned();
                    let connection = graceful.watch(connection);

                    connections.spawn(async move {
                        if let Err(e) = connection.await {
                            error!("Error serving connection from {}: {:?}", from, e);
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        drop(self.connection);

        tokio::select! {
            _ = graceful.shutdown() => info!("All connections closed"),
            _ = tokio::time::sleep(self.grace) => {
                warn!(
                    "Grace period elapsed, aborting {} remaining connections",
                    connections.len()
                );
            }
        }
        connections.shutdown().await;
        Ok(())
    }
}
