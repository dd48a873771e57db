use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::session::{Session, SessionContext};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    context: SessionContext,
}

impl Server {
    pub async fn bind(addr: SocketAddr, context: SessionContext) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(target: "mmorogue::server", addr = %listener.local_addr()?, "listening for telnet clients");
        Ok(Self { listener, context })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves. Each connection runs as
    /// its own task and outlives this loop only until its client leaves.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(target: "mmorogue::server", peer = %peer, "connection accepted");
                        if let Err(err) = stream.set_nodelay(true) {
                            warn!(target: "mmorogue::server", peer = %peer, error = %err, "failed to set TCP_NODELAY");
                        }
                        let session = Session::new(peer, self.context.clone());
                        tokio::spawn(session.run(stream));
                    }
                    Err(err) => {
                        warn!(target: "mmorogue::server", error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        info!(target: "mmorogue::server", "listener closed");
    }
}
