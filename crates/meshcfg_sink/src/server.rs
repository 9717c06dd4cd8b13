//! Sink server: admission control in front of a [`StreamProcessor`].

use crate::auth::AuthChecker;
use crate::error::{Status, StreamError};
use crate::metrics::SINK_METRICS;
use crate::rate::RateLimiter;
use crate::sink::StreamProcessor;
use crate::stream::{ResourceStream, TcpResourceStream};
use async_trait::async_trait;
use meshcfg_event::CancellationToken;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound connections for [`Server::serve`].
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

pub struct ServerOptions {
    pub auth_checker: Arc<dyn AuthChecker>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

pub struct Server {
    auth_checker: Arc<dyn AuthChecker>,
    rate_limiter: Arc<dyn RateLimiter>,
    sink: Arc<dyn StreamProcessor>,
}

impl Server {
    pub fn new(sink: Arc<dyn StreamProcessor>, options: ServerOptions) -> Self {
        Self {
            auth_checker: options.auth_checker,
            rate_limiter: options.rate_limiter,
            sink,
        }
    }

    /// Admit and run one stream.
    ///
    /// Clean end of stream and `Ok`/`Cancelled` statuses from the sink are
    /// reported as success; every other outcome is returned unchanged.
    pub async fn establish_resource_stream(
        &self,
        stream: &mut dyn ResourceStream,
    ) -> Result<(), StreamError> {
        let cancel = stream.context().cancel.clone();
        if let Err(e) = self.rate_limiter.wait(&cancel).await {
            SINK_METRICS.inc_streams_rate_limited();
            return Err(e.into());
        }

        let auth_info = match &stream.context().peer {
            Some(peer) => peer.auth_info.clone(),
            None => {
                warn!("No peer info found on the incoming stream.");
                None
            }
        };
        if let Err(e) = self.auth_checker.check(auth_info.as_ref()) {
            SINK_METRICS.inc_streams_unauthenticated();
            return Err(Status::unauthenticated(format!("Authentication failure: {}", e)).into());
        }

        SINK_METRICS.inc_streams_accepted();
        match self.sink.process_stream(stream).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => {
                debug!("Stream finished: {}", e);
                Ok(())
            }
            Err(e) => {
                SINK_METRICS.inc_streams_failed();
                Err(e)
            }
        }
    }

    /// Accept connections until `cancel` fires, one task per connection.
    ///
    /// Accept errors are logged and retried after a short pause; they never
    /// end the loop.
    pub async fn serve<L: Acceptor>(
        self: Arc<Self>,
        listener: L,
        cancel: CancellationToken,
    ) {
        info!(addr = ?listener.local_addr().ok(), "Sink server listening");
        loop {
            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (socket, addr) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    SINK_METRICS.inc_accept_errors();
                    warn!("Failed to accept connection: {}", e);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                    continue;
                }
            };
            SINK_METRICS.inc_connections_accepted();
            debug!(peer = %addr, "Accepted connection");

            let server = Arc::clone(&self);
            let stream_cancel = cancel.clone();
            tokio::spawn(async move {
                let mut stream = TcpResourceStream::new(socket, addr, stream_cancel);
                match server.establish_resource_stream(&mut stream).await {
                    Ok(()) => debug!(peer = %addr, "Stream closed"),
                    Err(e) => error!(peer = %addr, code = %e.code(), "Stream failed: {}", e),
                }
            });
        }
        info!("Sink server stopped");
    }
}
