//! Local TCP listener feeding the tunnel client

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use url::Url;

use super::dialer::TunnelClient;

/// Accepts local TCP connections and tunnels each one to a fixed URL
pub struct TcpForwarder {
    listener: TcpListener,
    client: Arc<TunnelClient>,
    target: Arc<Url>,
}

impl TcpForwarder {
    pub async fn bind(listen: &str, target: Url, client: TunnelClient) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to listen on {}", listen))?;

        Ok(Self {
            listener,
            client: Arc::new(client),
            target: Arc::new(target),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop; every connection gets its own tunnel
    pub async fn run(&self) -> Result<()> {
        info!(listen = %self.local_addr()?, url = %self.target, "tcp forwarder listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(client = %peer, "new connection");
                    let client = self.client.clone();
                    let target = self.target.clone();

                    tokio::spawn(async move {
                        client.serve_tcp(stream, peer, &target).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}
