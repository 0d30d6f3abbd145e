use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn, Instrument};

use crate::session::{run_session, SessionContext};

/// Accepts connections and runs one session task per connection.
///
/// A failed handshake or login ends that connection only.
pub struct ConnectionAcceptor {
    listener: TcpListener,
    ctx: SessionContext,
}

impl ConnectionAcceptor {
    pub async fn bind(addr: SocketAddr, ctx: SessionContext) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` completes. Sessions already running are
    /// left to finish on their own.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "accepting connections");
        }
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            warn!(%err, %peer, "could not disable nagle");
                        }
                        let ctx = self.ctx.clone();
                        let span = tracing::info_span!("session", %peer);
                        tokio::spawn(
                            async move {
                                if let Err(err) = run_session(stream, ctx).await {
                                    warn!("connection dropped: {err:#}");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(err) => warn!(%err, "accept failed"),
                },
            }
        }
        info!("stopped accepting connections");
    }
}
